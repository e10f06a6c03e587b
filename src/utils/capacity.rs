use std::num::NonZero;

/// Depth of a subscriber queue. A depth of zero means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capacity {
    #[default]
    Unbounded,
    Bounded(NonZero<usize>),
}

impl Capacity {
    pub fn depth(&self) -> usize {
        match self {
            Capacity::Unbounded => 0,
            Capacity::Bounded(n) => n.get(),
        }
    }
}

impl<T> From<T> for Capacity
where
    T: Into<usize>,
{
    fn from(value: T) -> Self {
        match NonZero::new(value.into()) {
            Some(n) => Capacity::Bounded(n),
            None => Capacity::Unbounded,
        }
    }
}
