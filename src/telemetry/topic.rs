use core::fmt;

use itertools::join;
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("Invalid topic name '{0}'")]
pub struct TopicError(pub String);

/// Topic names use `[A-Za-z0-9_]` tokens separated by '/'. A name without a
/// leading '/' is relative to the root namespace.
pub fn validate_topic(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
        && TopicName::split_parts(name).next().is_some()
}

/// Fully resolved topic name, always absolute ("/gps1/pos_vel")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName {
    name: String,
}

impl TopicName {
    pub fn parse(name: &str) -> Result<Self, TopicError> {
        Self::resolve("/", name)
    }

    /// Resolve `name` against `namespace`. Absolute names ignore the namespace.
    pub fn resolve(namespace: &str, name: &str) -> Result<Self, TopicError> {
        if !validate_topic(name) {
            return Err(TopicError(name.to_string()));
        }

        let name = if name.starts_with('/') {
            format!("/{}", join(Self::split_parts(name), "/"))
        } else {
            let ns = Self::split_parts(namespace);
            format!("/{}", join(ns.chain(Self::split_parts(name)), "/"))
        };

        Ok(TopicName { name })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn iter_parts(&self) -> impl Iterator<Item = &str> {
        Self::split_parts(&self.name)
    }

    fn split_parts(name: &str) -> impl Iterator<Item = &str> {
        name.split('/').filter(|p| !p.is_empty())
    }
}

impl TryFrom<&str> for TopicName {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        TopicName::parse(value)
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
