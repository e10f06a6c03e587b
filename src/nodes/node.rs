use log::trace;

use crate::{
    telemetry::{
        TelemetryDispatcher, TelemetryError, TelemetryReceiver, TelemetrySender, TelemetryService,
    },
    utils::capacity::Capacity,
};

/// Something that owns subscriptions and reacts to their messages
pub trait Node {
    fn name(&self) -> &str;

    /// Dispatch every pending message to its handler, without blocking.
    /// Returns the number of handled messages.
    fn spin_some(&mut self) -> usize;
}

pub fn spin_some(node: &mut dyn Node) -> usize {
    let handled = node.spin_some();

    if handled > 0 {
        trace!("Node '{}' handled {handled} messages", node.name());
    }

    handled
}

/// Bus access handed to a node when it is created
#[derive(Debug, Clone)]
pub struct NodeContext {
    telemetry: TelemetryService,
    queue: Capacity,
}

impl NodeContext {
    pub fn new(telemetry: TelemetryService, queue: Capacity) -> Self {
        Self { telemetry, queue }
    }

    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    /// Subscribe with the context's default queue depth
    pub fn subscribe<T: 'static + Send>(
        &self,
        topic: &str,
    ) -> Result<TelemetryReceiver<T>, TelemetryError> {
        self.telemetry.subscribe(topic, self.queue)
    }

    pub fn publish<T: 'static + Send>(
        &self,
        topic: &str,
    ) -> Result<TelemetrySender<T>, TelemetryError> {
        self.telemetry.publish(topic)
    }
}
