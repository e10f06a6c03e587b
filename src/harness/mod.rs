pub mod deviation;
mod error;
pub mod poll;
pub mod scenario;
pub mod test_node;

pub use error::*;
