use ringbuffer::{AllocRingBuffer, GrowableAllocRingBuffer, RingBuffer};

use crate::utils::capacity::Capacity;

#[derive(Debug, Clone)]
enum BufType<T> {
    Bounded(AllocRingBuffer<T>),
    Unbounded(GrowableAllocRingBuffer<T>),
}

/// Receiver queue. Bounded buffers overwrite the oldest element when full.
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    buf: BufType<T>,
}

impl<T> Buffer<T> {
    pub fn new(capacity: Capacity) -> Self {
        let buf = match capacity {
            Capacity::Bounded(n) => BufType::Bounded(AllocRingBuffer::new(n.get())),
            Capacity::Unbounded => BufType::Unbounded(GrowableAllocRingBuffer::new()),
        };

        Self { buf }
    }

    pub fn push(&mut self, value: T) {
        match &mut self.buf {
            BufType::Bounded(b) => b.push(value),
            BufType::Unbounded(b) => b.push(value),
        }
    }

    pub fn dequeue(&mut self) -> Option<T> {
        match &mut self.buf {
            BufType::Bounded(b) => b.dequeue(),
            BufType::Unbounded(b) => b.dequeue(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.buf {
            BufType::Bounded(b) => b.len(),
            BufType::Unbounded(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.buf {
            BufType::Bounded(b) => b.is_empty(),
            BufType::Unbounded(b) => b.is_empty(),
        }
    }
}
