use std::{
    any::{Any, type_name},
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use log::debug;
use thiserror::Error;

use super::topic::{TopicError, TopicName};
use crate::{
    core::time::Timestamp,
    utils::{
        capacity::Capacity,
        ringchannel::{Channel, ChannelError, Receiver, Sender, channel},
    },
};

#[derive(PartialEq, Eq, Error, Debug)]
pub enum TelemetryError {
    #[error("Requested topic type '{requested}', but topic is a '{expected}'")]
    WrongChannelType { requested: String, expected: String },

    #[error("Trying to read from an empty topic")]
    EmptyChannel,

    #[error("Trying to read from a closed topic")]
    ClosedChannel,

    #[error("Topic '{0}' already has a publisher")]
    AlreadyHasProducer(String),

    #[error(transparent)]
    InvalidTopic(#[from] TopicError),
}

impl From<ChannelError> for TelemetryError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::Closed => TelemetryError::ClosedChannel,
            ChannelError::Empty => TelemetryError::EmptyChannel,
        }
    }
}

/// A value together with the bus time at which it was published
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Timestamped<T>(pub Timestamp, pub T);

#[derive(Debug)]
pub struct TelemetrySender<T> {
    topic: TopicName,
    sender: Sender<Timestamped<T>>,
}

impl<T: 'static + Clone> TelemetrySender<T> {
    pub fn send(&self, timestamp: Timestamp, value: T) {
        self.sender.send(Timestamped(timestamp, value));
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }
}

#[derive(Debug)]
pub struct TelemetryReceiver<T> {
    topic: TopicName,
    receiver: Receiver<Timestamped<T>>,
}

impl<T> TelemetryReceiver<T> {
    pub fn try_recv(&self) -> Result<Timestamped<T>, TelemetryError> {
        Ok(self.receiver.try_recv()?)
    }

    /// Take everything currently queued. A closed topic simply yields nothing
    /// more.
    pub fn drain(&self) -> Vec<Timestamped<T>> {
        if self.receiver.is_empty() {
            return vec![];
        }

        let mut out = Vec::with_capacity(self.receiver.pending());

        while let Ok(v) = self.receiver.try_recv() {
            out.push(v);
        }

        out
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }
}

#[derive(Debug)]
struct TelemetryChannel {
    typename: String,

    channel: Box<dyn Any + Send>, // Box<TelemetryChannelTransport<T>>
}

struct TelemetryChannelTransport<T> {
    channel: Weak<Channel<Timestamped<T>>>,
    sender: Option<Sender<Timestamped<T>>>,
}

impl<T> TelemetryChannelTransport<T> {
    fn new() -> Self {
        let (sender, _) = channel::<Timestamped<T>>(Capacity::Unbounded);

        Self {
            channel: Arc::downgrade(&sender.get_channel()),
            sender: Some(sender),
        }
    }

    /// The producer was dropped, or nothing holds the channel anymore
    fn is_closed(&self) -> bool {
        Weak::upgrade(&self.channel).is_none_or(|ch| ch.is_closed())
    }
}

impl TelemetryChannel {
    fn new<T: 'static + Send>() -> Self {
        Self {
            typename: type_name::<T>().to_string(),
            channel: Box::new(TelemetryChannelTransport::<T>::new()),
        }
    }

    fn take_producer<T: 'static>(
        &mut self,
        topic: TopicName,
    ) -> Result<TelemetrySender<T>, TelemetryError> {
        let channel = self.downcast_mut::<T>()?;

        // A topic whose publisher went away can be published again, on a
        // fresh channel. Subscribers of the old one only see it closed.
        if channel.sender.is_none() && channel.is_closed() {
            debug!("Reopening '{topic}'");
            *channel = TelemetryChannelTransport::new();
        }

        let sender = channel
            .sender
            .take()
            .ok_or_else(|| TelemetryError::AlreadyHasProducer(topic.to_string()))?;

        Ok(TelemetrySender { topic, sender })
    }

    fn add_subscriber<T: 'static>(
        &mut self,
        topic: TopicName,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError> {
        let channel = self.downcast_mut::<T>()?;

        let ch = Weak::upgrade(&channel.channel).ok_or(TelemetryError::ClosedChannel)?;

        Ok(TelemetryReceiver {
            topic,
            receiver: Channel::<Timestamped<T>>::add_receiver(capacity, &ch),
        })
    }

    fn downcast_mut<T: 'static>(
        &mut self,
    ) -> Result<&mut TelemetryChannelTransport<T>, TelemetryError> {
        self.channel
            .downcast_mut::<TelemetryChannelTransport<T>>()
            .ok_or(TelemetryError::WrongChannelType {
                requested: type_name::<T>().to_string(),
                expected: self.typename.clone(),
            })
    }
}

/// In-process typed publish/subscribe bus. Clones share the same topics.
#[derive(Debug, Default, Clone)]
pub struct TelemetryService {
    inner: Arc<Mutex<TelemetryServiceInner>>,
}

#[derive(Debug, Default)]
struct TelemetryServiceInner {
    remap: HashMap<TopicName, TopicName>,
    channels: HashMap<TopicName, TelemetryChannel>,
}

impl TelemetryService {
    pub fn new(remap: HashMap<TopicName, TopicName>) -> Self {
        TelemetryService {
            inner: Arc::new(Mutex::new(TelemetryServiceInner {
                remap,
                channels: HashMap::new(),
            })),
        }
    }

    /// Build a service from "from:=to" style remap rules
    pub fn with_remap_rules<S: AsRef<str>>(rules: &[S]) -> Result<Self, TelemetryError> {
        let mut remap = HashMap::new();

        for rule in rules {
            let rule = rule.as_ref();
            let (from, to) = rule
                .split_once(":=")
                .ok_or_else(|| TopicError(rule.to_string()))?;

            remap.insert(TopicName::parse(from)?, TopicName::parse(to)?);
        }

        Ok(Self::new(remap))
    }

    fn lock(&self) -> MutexGuard<'_, TelemetryServiceInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn topics(&self) -> Vec<TopicName> {
        let mut topics: Vec<_> = self.lock().channels.keys().cloned().collect();
        topics.sort();
        topics
    }
}

pub trait TelemetryDispatcher {
    fn publish<T: 'static + Send>(&self, topic: &str) -> Result<TelemetrySender<T>, TelemetryError>;

    fn subscribe<T: 'static + Send>(
        &self,
        topic: &str,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError>;
}

impl TelemetryDispatcher for TelemetryService {
    fn publish<T: 'static + Send>(&self, topic: &str) -> Result<TelemetrySender<T>, TelemetryError> {
        let mut inner = self.lock();
        let topic = inner.resolve(topic)?;

        debug!("Publishing '{topic}' ({})", type_name::<T>());

        inner.get_channel::<T>(&topic).take_producer(topic)
    }

    fn subscribe<T: 'static + Send>(
        &self,
        topic: &str,
        capacity: Capacity,
    ) -> Result<TelemetryReceiver<T>, TelemetryError> {
        let mut inner = self.lock();
        let topic = inner.resolve(topic)?;

        debug!("Subscribing to '{topic}' ({})", type_name::<T>());

        inner.get_channel::<T>(&topic).add_subscriber(topic, capacity)
    }
}

impl TelemetryServiceInner {
    fn resolve(&self, topic: &str) -> Result<TopicName, TelemetryError> {
        let topic = TopicName::parse(topic)?;

        Ok(self.remap.get(&topic).cloned().unwrap_or(topic))
    }

    fn get_channel<T: 'static + Send>(&mut self, topic: &TopicName) -> &mut TelemetryChannel {
        self.channels
            .entry(topic.clone())
            .or_insert_with(TelemetryChannel::new::<T>)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, Utc};

    use crate::core::time::SimulatedClock;

    use super::*;

    fn now() -> Timestamp {
        let clock = SimulatedClock::new(DateTime::<Utc>::UNIX_EPOCH, TimeDelta::seconds(1));
        Timestamp::now(&clock)
    }

    #[test]
    fn test_empty_chan() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let sub1 = telem_service.subscribe::<f64>("/test/channel/1", 1usize.into())?;

        assert_eq!(sub1.try_recv(), Err(TelemetryError::EmptyChannel));

        Ok(())
    }

    #[test]
    fn test_multiple_prod() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let _p = telem_service.publish::<f64>("/test/channel/1")?;

        assert_eq!(
            telem_service.publish::<f64>("test/channel/1").err(),
            Some(TelemetryError::AlreadyHasProducer(
                "/test/channel/1".to_string()
            ))
        );

        Ok(())
    }

    #[test]
    fn test_pub_sub() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let sub1 = telem_service.subscribe::<f64>("pimu", 1usize.into())?;
        let sub2 = telem_service.subscribe::<f64>("/pimu", Capacity::Unbounded)?;

        let prod = telem_service.publish::<f64>("pimu")?;

        let ts = now();

        prod.send(ts, 1.234);

        assert_eq!(sub1.try_recv(), Ok(Timestamped(ts, 1.234)));
        assert_eq!(sub2.try_recv(), Ok(Timestamped(ts, 1.234)));

        assert_eq!(sub1.try_recv(), Err(TelemetryError::EmptyChannel));
        assert_eq!(sub2.try_recv(), Err(TelemetryError::EmptyChannel));
        assert_eq!(telem_service.topics(), vec![TopicName::parse("pimu")?]);

        Ok(())
    }

    #[test]
    fn test_remap() -> Result<(), TelemetryError> {
        let telem_service =
            TelemetryService::with_remap_rules(&["/imu:=/sensors/imu", "gps:=/gps1/pos_vel"])?;

        let s_imu = telem_service.subscribe::<f64>("/sensors/imu", 1usize.into())?;
        let s_gps = telem_service.subscribe::<f64>("gps", 1usize.into())?;

        let p_imu = telem_service.publish::<f64>("imu")?;
        let p_gps = telem_service.publish::<f64>("/gps1/pos_vel")?;

        // imu was remapped to /sensors/imu, so publishing it again fails
        assert!(telem_service.publish::<f64>("/sensors/imu").is_err());

        let ts = now();

        p_imu.send(ts, 1.0);
        p_gps.send(ts, 2.0);
        assert_eq!(s_imu.try_recv(), Ok(Timestamped(ts, 1.0)));
        assert_eq!(s_gps.try_recv(), Ok(Timestamped(ts, 2.0)));
        assert_eq!(p_imu.topic().as_str(), "/sensors/imu");

        assert!(TelemetryService::with_remap_rules(&["imu=/other"]).is_err());

        Ok(())
    }

    #[test]
    fn test_drain_and_close() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let sub = telem_service.subscribe::<f64>("imu", Capacity::Unbounded)?;
        let prod = telem_service.publish::<f64>("imu")?;

        let ts = now();
        prod.send(ts, 1.0);
        prod.send(ts, 2.0);
        prod.send(ts, 3.0);
        drop(prod);

        let values: Vec<_> = sub.drain().into_iter().map(|Timestamped(_, v)| v).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(sub.try_recv(), Err(TelemetryError::ClosedChannel));
        assert!(sub.drain().is_empty());

        Ok(())
    }

    #[test]
    fn test_republish_after_producer_dropped() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let old_sub = telem_service.subscribe::<f64>("imu", Capacity::Unbounded)?;
        let prod = telem_service.publish::<f64>("imu")?;
        drop(prod);

        let prod = telem_service.publish::<f64>("imu")?;
        let sub = telem_service.subscribe::<f64>("imu", Capacity::Unbounded)?;

        // Still only one live publisher at a time
        assert_eq!(
            telem_service.publish::<f64>("imu").err(),
            Some(TelemetryError::AlreadyHasProducer("/imu".to_string()))
        );

        let ts = now();
        prod.send(ts, 4.0);

        assert_eq!(sub.try_recv(), Ok(Timestamped(ts, 4.0)));
        assert_eq!(old_sub.try_recv(), Err(TelemetryError::ClosedChannel));
        assert_eq!(telem_service.topics().len(), 1);

        Ok(())
    }

    #[test]
    fn test_bad_channel_type() -> Result<(), TelemetryError> {
        let telem_service = TelemetryService::default();

        let _s = telem_service.subscribe::<f64>("/test/channel/1", 1usize.into())?;

        let pub1 = telem_service.publish::<f32>("/test/channel/1");

        assert_eq!(
            pub1.err(),
            Some(TelemetryError::WrongChannelType {
                requested: std::any::type_name::<f32>().to_string(),
                expected: std::any::type_name::<f64>().to_string()
            })
        );

        Ok(())
    }

    #[test]
    fn test_invalid_topic() {
        let telem_service = TelemetryService::default();

        assert!(matches!(
            telem_service.subscribe::<f64>("bad topic", Capacity::Unbounded),
            Err(TelemetryError::InvalidTopic(_))
        ));
    }
}
