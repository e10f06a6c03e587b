pub mod core;
pub mod driver;
pub mod harness;
pub mod messages;
pub mod nodes;
pub mod parameters;
pub mod streams;
pub mod telemetry;
pub mod utils;
