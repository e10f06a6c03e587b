mod config;
mod documents;
mod simulation;

pub use config::*;
pub use documents::*;
pub use simulation::SimulationConfig;
