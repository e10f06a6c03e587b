mod service;
mod topic;

pub use service::*;
pub use topic::{TopicError, TopicName, validate_topic};
