use thiserror::Error;

use std::sync::{Arc, Mutex, MutexGuard};

use super::buffer::Buffer;
use crate::utils::capacity::Capacity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("The channel was closed (no sender)")]
    Closed,

    #[error("No data available in channel")]
    Empty,
}

/// Broadcast channel: one sender, every receiver gets its own queue.
#[derive(Debug)]
pub struct Channel<T> {
    inner: Mutex<ChannelInner<T>>,
}

#[derive(Debug)]
struct ChannelInner<T> {
    receivers: Vec<(usize, Arc<Mutex<ReceiverInner<T>>>)>,
    counter: usize,
    is_closed: bool,
}

#[derive(Debug)]
struct ReceiverInner<T> {
    buf: Buffer<T>,
    closed: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Clone> Channel<T> {
    fn write(&self, data: T) {
        let inner = lock(&self.inner);

        for (_, receiver) in inner.receivers.iter() {
            lock(receiver).buf.push(data.clone());
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                receivers: vec![],
                counter: 0usize,
                is_closed: false,
            }),
        }
    }
}

impl<T> Channel<T> {
    pub fn add_receiver(capacity: Capacity, this: &Arc<Channel<T>>) -> Receiver<T> {
        let mut inner = lock(&this.inner);

        let index = inner.counter;
        inner.counter += 1;

        let shared = Arc::new(Mutex::new(ReceiverInner {
            buf: Buffer::new(capacity),
            closed: inner.is_closed,
        }));

        inner.receivers.push((index, shared.clone()));

        Receiver {
            shared,
            channel_index: index,
            capacity,
            channel: this.clone(),
        }
    }

    fn remove_receiver(&self, index: usize) {
        lock(&self.inner).receivers.retain(|(i, _)| *i != index);
    }

    fn close(&self) {
        let mut inner = lock(&self.inner);

        inner.is_closed = true;

        for (_, recv) in inner.receivers.iter() {
            lock(recv).closed = true;
        }
    }

    pub fn num_receivers(&self) -> usize {
        lock(&self.inner).receivers.len()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).is_closed
    }
}

#[derive(Debug)]
pub struct Receiver<T> {
    shared: Arc<Mutex<ReceiverInner<T>>>,
    channel_index: usize,
    capacity: Capacity,
    channel: Arc<Channel<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.clone_with_capacity(self.capacity)
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.channel.remove_receiver(self.channel_index);
    }
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Result<T, ChannelError> {
        let mut inner = lock(&self.shared);

        match inner.buf.dequeue() {
            Some(v) => Ok(v),
            None if inner.closed => Err(ChannelError::Closed),
            None => Err(ChannelError::Empty),
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.shared).buf.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shared).buf.is_empty()
    }

    pub fn clone_with_capacity(&self, capacity: Capacity) -> Self {
        Channel::<T>::add_receiver(capacity, &self.channel)
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }
}

#[derive(Debug)]
pub struct Sender<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.channel.close();
    }
}

impl<T: Clone> Sender<T> {
    pub fn send(&self, val: T) {
        self.channel.write(val);
    }
}

impl<T> Sender<T> {
    pub fn get_channel(&self) -> Arc<Channel<T>> {
        self.channel.clone()
    }
}

pub fn channel<T>(capacity: Capacity) -> (Sender<T>, Receiver<T>) {
    let channel = Arc::new(Channel::<T>::default());

    let receiver = Channel::<T>::add_receiver(capacity, &channel);
    let sender = Sender { channel };

    (sender, receiver)
}
