use std::collections::BTreeMap;

use log::info;

use crate::{
    core::time::Timestamp,
    messages::{Gps, HasHeader, Imu, JointState, Odometry, Pimu},
    nodes::{Node, NodeContext},
    streams::StreamKind,
    telemetry::{TelemetryError, TelemetryReceiver, Timestamped},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TestNodeTopics {
    pub wheel_encoder: String,
    pub pimu: String,
    pub imu: String,
    pub ins: String,
    pub gps: String,
}

impl Default for TestNodeTopics {
    fn default() -> Self {
        Self {
            wheel_encoder: "msg_wheel_encoder".to_string(),
            pimu: "pimu".to_string(),
            imu: "imu".to_string(),
            ins: "odom_ins_enu".to_string(),
            gps: "gps1/pos_vel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StreamRecord {
    received: usize,
    last_arrival: Option<Timestamp>,
    /// Stamp seconds, in arrival order
    stamps: Vec<f64>,
}

/// Listens to the adapter outputs and records their stamps
pub struct TestNode {
    name: String,
    quiet: bool,

    wheel_encoder: TelemetryReceiver<JointState>,
    pimu: TelemetryReceiver<Pimu>,
    imu: TelemetryReceiver<Imu>,
    ins: TelemetryReceiver<Odometry>,
    gps: TelemetryReceiver<Gps>,

    did_rx_pimu: bool,
    got_gps_tow: bool,
    records: BTreeMap<StreamKind, StreamRecord>,
}

impl TestNode {
    pub fn new(
        name: &str,
        ctx: &NodeContext,
        topics: &TestNodeTopics,
    ) -> Result<Self, TelemetryError> {
        Ok(Self {
            name: name.to_string(),
            quiet: false,
            wheel_encoder: ctx.subscribe(&topics.wheel_encoder)?,
            pimu: ctx.subscribe(&topics.pimu)?,
            imu: ctx.subscribe(&topics.imu)?,
            ins: ctx.subscribe(&topics.ins)?,
            gps: ctx.subscribe(&topics.gps)?,
            did_rx_pimu: false,
            got_gps_tow: false,
            records: BTreeMap::new(),
        })
    }

    /// Stop logging every received message
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn did_rx_pimu(&self) -> bool {
        self.did_rx_pimu
    }

    pub fn got_gps_tow(&self) -> bool {
        self.got_gps_tow
    }

    pub fn received(&self, stream: StreamKind) -> usize {
        self.records.get(&stream).map_or(0, |r| r.received)
    }

    /// Bus time of the last message of `stream`
    pub fn last_arrival(&self, stream: StreamKind) -> Option<Timestamp> {
        self.records.get(&stream).and_then(|r| r.last_arrival)
    }

    pub fn samples(&self, stream: StreamKind) -> &[f64] {
        self.records
            .get(&stream)
            .map(|r| r.stamps.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_samples(&self) -> BTreeMap<StreamKind, Vec<f64>> {
        self.records
            .iter()
            .filter(|(_, r)| !r.stamps.is_empty())
            .map(|(s, r)| (*s, r.stamps.clone()))
            .collect()
    }

    fn on_message<T: HasHeader>(
        &mut self,
        stream: StreamKind,
        msg: &Timestamped<T>,
        label: &str,
    ) {
        let stamp = msg.1.stamp_sec();

        if !self.quiet {
            info!("Rx {label} : {stamp:.6}");
        }

        let keep = match stream {
            StreamKind::Gps => {
                self.got_gps_tow = true;
                true
            }
            StreamKind::Pimu => {
                self.did_rx_pimu = true;
                self.got_gps_tow
            }
            StreamKind::Imu | StreamKind::Ins => self.got_gps_tow,
            StreamKind::WheelEncoder => false,
        };

        let record = self.records.entry(stream).or_default();
        record.received += 1;
        record.last_arrival = Some(msg.0);

        if keep {
            record.stamps.push(stamp);
        }
    }
}

impl Node for TestNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn spin_some(&mut self) -> usize {
        let mut handled = 0;

        for msg in self.wheel_encoder.drain() {
            self.on_message(StreamKind::WheelEncoder, &msg, "WHEEL ENCODER");
            handled += 1;
        }

        for msg in self.pimu.drain() {
            self.on_message(StreamKind::Pimu, &msg, "PIMU");
            handled += 1;
        }

        for msg in self.imu.drain() {
            self.on_message(StreamKind::Imu, &msg, "IMU");
            handled += 1;
        }

        for msg in self.ins.drain() {
            self.on_message(StreamKind::Ins, &msg, "INS");
            handled += 1;
        }

        for msg in self.gps.drain() {
            self.on_message(StreamKind::Gps, &msg, "GPS");
            handled += 1;
        }

        handled
    }
}
