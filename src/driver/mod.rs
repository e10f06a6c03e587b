mod adapter;
mod device;
mod sim_device;
mod time_sync;

pub use adapter::{AdapterError, InertialSenseAdapter, SensorAdapter};
pub use device::*;
pub use sim_device::SimulatedDevice;
pub use time_sync::TimeSync;
