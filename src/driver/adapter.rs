use std::{
    collections::BTreeMap,
    f64::consts::{FRAC_1_SQRT_2, PI},
};

use log::{debug, info, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use thiserror::Error;

use super::{
    device::{Device, DeviceError, DeviceMessage, DeviceSetup},
    time_sync::TimeSync,
};
use crate::{
    core::{
        gps_time::DEFAULT_LEAP_SECONDS,
        time::{Clock, Timestamp},
    },
    messages::{Gps, Header, Imu, JointState, Odometry, Pimu, Stamp},
    nodes::NodeContext,
    parameters::{AdapterConfig, ConfigError, StreamSetup},
    streams::{MessageKind, StreamKind},
    telemetry::{TelemetryError, TelemetrySender},
};

const BODY_FRAME: &str = "body";
const ENU_FRAME: &str = "ins_enu";
const NED_FRAME: &str = "ins_ned";
const ECEF_FRAME: &str = "ecef";
const WHEEL_NAMES: [&str; 2] = ["left", "right"];

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("No serial port configured")]
    NoPorts,

    #[error("Unable to open any of the configured ports ({0})")]
    NoPortAvailable(String),

    #[error("Adapter is not initialized")]
    NotInitialized,

    #[error("Adapter is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Bridge between a sensor unit and the telemetry bus
pub trait SensorAdapter {
    /// Open the device, configure its streams and create the publishers
    fn initialize(&mut self, clock: &dyn Clock) -> Result<(), AdapterError>;

    /// Publish everything the device produced since the last call.
    /// Returns the number of published messages.
    fn update(&mut self, clock: &dyn Clock) -> Result<usize, AdapterError>;

    /// Close every topic and the device. Safe to call more than once.
    fn terminate(&mut self);
}

enum Publisher {
    Imu(TelemetrySender<Imu>),
    Pimu(TelemetrySender<Pimu>),
    Odometry(TelemetrySender<Odometry>),
    Gps(TelemetrySender<Gps>),
    WheelEncoder(TelemetrySender<JointState>),
}

impl Publisher {
    fn new(ctx: &NodeContext, setup: &StreamSetup) -> Result<Self, TelemetryError> {
        let topic = setup.topic.as_str();

        Ok(match setup.kind {
            MessageKind::Imu => Publisher::Imu(ctx.publish(topic)?),
            MessageKind::Pimu => Publisher::Pimu(ctx.publish(topic)?),
            MessageKind::OdomInsEnu | MessageKind::OdomInsNed => {
                Publisher::Odometry(ctx.publish(topic)?)
            }
            MessageKind::PosVel => Publisher::Gps(ctx.publish(topic)?),
            MessageKind::WheelEncoder => Publisher::WheelEncoder(ctx.publish(topic)?),
        })
    }
}

/// One enabled output topic
struct Output {
    kind: MessageKind,
    /// Publish one out of every `decimation` samples of the stream
    decimation: u32,
    seen: u32,
    publisher: Publisher,
}

impl Output {
    /// Counts the sample and tells whether this one goes out
    fn take_sample(&mut self) -> bool {
        let publish = self.seen % self.decimation == 0;
        self.seen = self.seen.wrapping_add(1);
        publish
    }
}

pub struct InertialSenseAdapter<D> {
    config: AdapterConfig,
    ctx: NodeContext,
    device: D,
    sync: TimeSync,
    outputs: Option<Vec<Output>>,
}

impl<D: Device> InertialSenseAdapter<D> {
    pub fn new(config: AdapterConfig, ctx: NodeContext, device: D) -> Self {
        Self {
            config,
            ctx,
            device,
            sync: TimeSync::default(),
            outputs: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.topic
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn is_initialized(&self) -> bool {
        self.outputs.is_some()
    }

    pub fn has_gps_time(&self) -> bool {
        self.sync.has_gps_time()
    }

    fn open_first_port(&mut self, clock: &dyn Clock) -> Result<String, AdapterError> {
        if self.config.port.is_empty() {
            return Err(AdapterError::NoPorts);
        }

        for port in &self.config.port {
            match self.device.open(port, self.config.baudrate, clock) {
                Ok(()) => return Ok(port.clone()),
                Err(e) => debug!("Cannot open '{port}': {e}"),
            }
        }

        Err(AdapterError::NoPortAvailable(self.config.port.join(", ")))
    }

    fn create_outputs(
        &self,
        streams: &[StreamSetup],
        periods: &BTreeMap<StreamKind, u32>,
    ) -> Result<Vec<Output>, AdapterError> {
        let mut outputs = Vec::with_capacity(streams.len());

        for setup in streams {
            let stream_period = periods.get(&setup.kind.stream()).copied().unwrap_or(1);
            let decimation = (setup.period / stream_period).max(1);

            if setup.period % stream_period != 0 {
                warn!(
                    "'{}' period {} is not a multiple of {}, publishing every {decimation} samples",
                    setup.topic, setup.period, stream_period
                );
            }

            outputs.push(Output {
                kind: setup.kind,
                decimation,
                seen: 0,
                publisher: Publisher::new(&self.ctx, setup)?,
            });
        }

        Ok(outputs)
    }

    fn setup_streams(&mut self) -> Result<Vec<Output>, AdapterError> {
        let streams = self.config.enabled_streams()?;

        let mut periods: BTreeMap<StreamKind, u32> = BTreeMap::new();
        for setup in &streams {
            periods
                .entry(setup.kind.stream())
                .and_modify(|p| *p = (*p).min(setup.period))
                .or_insert(setup.period);
        }

        self.device.configure(&DeviceSetup {
            navigation_dt_ms: self.config.ins.navigation_dt_ms,
            periods: periods.clone(),
            gps_time_user_delay: self.config.gps_time_user_delay(),
        })?;

        self.create_outputs(&streams, &periods)
    }

    fn publish(&mut self, msg: DeviceMessage, host_unix: f64, now: Timestamp) -> usize {
        let stream = msg.stream();

        let stamp = match &msg {
            DeviceMessage::Gps { week: 0, .. } | DeviceMessage::Gps { fix: false, .. } => return 0,
            DeviceMessage::Gps {
                week,
                tow_ms,
                tow_offset,
                leap_s,
                ..
            } => {
                self.sync.on_gps_fix(*week, *tow_offset, *leap_s);
                TimeSync::from_week_tow(*week, *tow_ms as f64 / 1000.0, *leap_s)
            }
            DeviceMessage::Ins { week, tow, .. } if *week > 0 => {
                let leap_s = self.sync.leap_seconds().unwrap_or(DEFAULT_LEAP_SECONDS);
                TimeSync::from_week_tow(*week, *tow, leap_s)
            }
            DeviceMessage::Ins { tow: time, .. }
            | DeviceMessage::Imu { time, .. }
            | DeviceMessage::Pimu { time, .. }
            | DeviceMessage::WheelEncoder { time, .. } => {
                self.sync.from_device_time(*time, host_unix)
            }
        };

        let stamp = Stamp::from_sec_f64(stamp);

        let Some(outputs) = self.outputs.as_mut() else {
            return 0;
        };

        let mut published = 0;

        for output in outputs.iter_mut().filter(|o| o.kind.stream() == stream) {
            if !output.take_sample() {
                continue;
            }

            if send(output, &msg, stamp, now) {
                published += 1;
            }
        }

        published
    }
}

impl<D: Device> SensorAdapter for InertialSenseAdapter<D> {
    fn initialize(&mut self, clock: &dyn Clock) -> Result<(), AdapterError> {
        if self.outputs.is_some() {
            return Err(AdapterError::AlreadyInitialized);
        }

        let port = self.open_first_port(clock)?;

        match self.setup_streams() {
            Ok(outputs) => {
                info!(
                    "Adapter '{}' streaming {} topics from '{port}'",
                    self.name(),
                    outputs.len()
                );

                self.sync = TimeSync::default();
                self.outputs = Some(outputs);

                Ok(())
            }
            Err(e) => {
                self.device.close();
                Err(e)
            }
        }
    }

    fn update(&mut self, clock: &dyn Clock) -> Result<usize, AdapterError> {
        if self.outputs.is_none() {
            return Err(AdapterError::NotInitialized);
        }

        let messages = self.device.read(clock)?;
        let host_unix = clock.utc().unix_seconds_f64();
        let now = Timestamp::now(clock);

        Ok(messages
            .into_iter()
            .map(|msg| self.publish(msg, host_unix, now))
            .sum())
    }

    fn terminate(&mut self) {
        if self.outputs.take().is_some() {
            info!("Adapter '{}' terminated", self.name());
        }

        if self.device.is_open() {
            self.device.close();
        }
    }
}

fn send(output: &Output, msg: &DeviceMessage, stamp: Stamp, now: Timestamp) -> bool {
    match (&output.publisher, msg) {
        (Publisher::Imu(tx), DeviceMessage::Imu { gyro, acc, .. }) => tx.send(
            now,
            Imu {
                header: Header::new(stamp, BODY_FRAME),
                angular_velocity: *gyro,
                linear_acceleration: *acc,
            },
        ),
        (
            Publisher::Pimu(tx),
            DeviceMessage::Pimu {
                dt, dtheta, dvel, ..
            },
        ) => tx.send(
            now,
            Pimu {
                header: Header::new(stamp, BODY_FRAME),
                dt: *dt,
                dtheta: *dtheta,
                dvel: *dvel,
            },
        ),
        (
            Publisher::Odometry(tx),
            DeviceMessage::Ins {
                pos_ned,
                vel_ned,
                att_ned,
                ..
            },
        ) => {
            let odom = match output.kind {
                MessageKind::OdomInsEnu => Odometry {
                    header: Header::new(stamp, ENU_FRAME),
                    child_frame_id: BODY_FRAME.to_string(),
                    position: ned_to_enu(pos_ned),
                    orientation: attitude_enu(att_ned),
                    linear_velocity: ned_to_enu(vel_ned),
                    angular_velocity: Vector3::zeros(),
                },
                _ => Odometry {
                    header: Header::new(stamp, NED_FRAME),
                    child_frame_id: BODY_FRAME.to_string(),
                    position: *pos_ned,
                    orientation: *att_ned,
                    linear_velocity: *vel_ned,
                    angular_velocity: Vector3::zeros(),
                },
            };

            tx.send(now, odom)
        }
        (
            Publisher::Gps(tx),
            DeviceMessage::Gps {
                week,
                tow_ms,
                tow_offset,
                leap_s,
                num_sat,
                fix,
                pos_ecef,
                vel_ecef,
            },
        ) => tx.send(
            now,
            Gps {
                header: Header::new(stamp, ECEF_FRAME),
                week: *week,
                tow_ms: *tow_ms,
                tow_offset: *tow_offset,
                leap_s: *leap_s,
                num_sat: *num_sat,
                fix: *fix,
                pos_ecef: *pos_ecef,
                vel_ecef: *vel_ecef,
            },
        ),
        (Publisher::WheelEncoder(tx), DeviceMessage::WheelEncoder { theta, omega, .. }) => tx
            .send(
                now,
                JointState {
                    header: Header::new(stamp, BODY_FRAME),
                    name: WHEEL_NAMES.iter().map(|n| n.to_string()).collect(),
                    position: theta.to_vec(),
                    velocity: omega.to_vec(),
                },
            ),
        _ => return false,
    }

    true
}

fn ned_to_enu(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.y, v.x, -v.z)
}

/// Body (FRD) to NED attitude, expressed as body (FLU) to ENU
fn attitude_enu(att_ned: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let ned_to_enu =
        UnitQuaternion::from_quaternion(Quaternion::new(0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0));
    let flu_to_frd = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI);

    ned_to_enu * att_ned * flu_to_frd
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{
        core::time::SimulatedClock,
        driver::SimulatedDevice,
        parameters::{BASIC_CONFIG, SimulationConfig, TIME_SYNC_CONFIG},
        telemetry::TelemetryService,
        utils::capacity::Capacity,
    };

    fn clock() -> SimulatedClock {
        SimulatedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            TimeDelta::zero(),
        )
    }

    fn make_adapter(
        yaml: &str,
        sim: SimulationConfig,
    ) -> (InertialSenseAdapter<SimulatedDevice>, NodeContext) {
        let ctx = NodeContext::new(TelemetryService::default(), Capacity::Unbounded);
        let config = AdapterConfig::from_yaml(yaml).unwrap();

        (
            InertialSenseAdapter::new(config, ctx.clone(), SimulatedDevice::new(sim)),
            ctx,
        )
    }

    fn sim() -> SimulationConfig {
        SimulationConfig {
            seed: Some(3),
            fix_delay_s: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_update_before_initialize() {
        let clock = clock();
        let (mut adapter, _) = make_adapter(BASIC_CONFIG, sim());

        assert!(matches!(
            adapter.update(&clock),
            Err(AdapterError::NotInitialized)
        ));
    }

    #[test]
    fn test_port_fallback() {
        let clock = clock();
        let (mut adapter, _) = make_adapter(
            BASIC_CONFIG,
            SimulationConfig {
                port: Some("/dev/ttyACM2".to_string()),
                ..sim()
            },
        );

        adapter.initialize(&clock).unwrap();
        assert_eq!(adapter.device().port(), Some("/dev/ttyACM2"));

        assert!(matches!(
            adapter.initialize(&clock),
            Err(AdapterError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_no_port() {
        let clock = clock();

        let (mut adapter, _) = make_adapter(
            BASIC_CONFIG,
            SimulationConfig {
                port: Some("/dev/ttyUSB7".to_string()),
                ..sim()
            },
        );
        assert!(matches!(
            adapter.initialize(&clock),
            Err(AdapterError::NoPortAvailable(_))
        ));

        let (mut adapter, _) = make_adapter("topic: ins", sim());
        assert!(matches!(
            adapter.initialize(&clock),
            Err(AdapterError::NoPorts)
        ));
    }

    #[test]
    fn test_publishes_pimu() {
        let clock = clock();
        let (mut adapter, ctx) = make_adapter(BASIC_CONFIG, sim());
        adapter.initialize(&clock).unwrap();

        let rx = ctx.subscribe::<Pimu>("pimu").unwrap();

        clock.sleep(TimeDelta::milliseconds(100));
        let published = adapter.update(&clock).unwrap();

        let pimu = rx.drain();
        assert!(published > 0);
        assert_eq!(pimu.len(), published);

        // No GPS: stamps follow the host clock
        let host = clock.utc().unix_seconds_f64();
        for msg in &pimu {
            let stamp = msg.1.header.stamp.as_sec_f64();
            assert!((host - stamp).abs() < 0.2, "{stamp} vs {host}");
        }
    }

    #[test]
    fn test_gps_time_stamping() {
        let clock = clock();
        let (mut adapter, ctx) = make_adapter(TIME_SYNC_CONFIG, sim());
        adapter.initialize(&clock).unwrap();

        let gps = ctx.subscribe::<Gps>("gps1/pos_vel").unwrap();
        let imu = ctx.subscribe::<Imu>("imu").unwrap();
        let ins = ctx.subscribe::<Odometry>("odom_ins_enu").unwrap();

        // Before the fix nothing arrives on the GPS topic
        clock.sleep(TimeDelta::milliseconds(500));
        adapter.update(&clock).unwrap();
        assert!(gps.drain().is_empty());
        assert!(!adapter.has_gps_time());
        imu.drain();
        ins.drain();

        clock.sleep(TimeDelta::seconds(1));
        adapter.update(&clock).unwrap();
        assert!(adapter.has_gps_time());
        assert!(!gps.drain().is_empty());
        imu.drain();
        ins.drain();

        clock.sleep(TimeDelta::milliseconds(500));
        adapter.update(&clock).unwrap();

        let imu: Vec<f64> = imu.drain().iter().map(|m| m.1.header.stamp.as_sec_f64()).collect();
        let ins: Vec<f64> = ins.drain().iter().map(|m| m.1.header.stamp.as_sec_f64()).collect();

        assert!(!imu.is_empty());
        assert_eq!(imu.len(), ins.len());
        for (a, b) in imu.iter().zip(&ins) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_decimation() {
        let yaml = "
port: /dev/ttyACM0
ins:
  navigation_dt_ms: 10
  messages:
    odom_ins_enu:
      enable: true
    odom_ins_ned:
      enable: true
      period: 2
sensors:
  messages:
    pimu:
      topic: pimu_slow
      enable: true
      period: 2
";
        let clock = clock();
        let (mut adapter, ctx) = make_adapter(yaml, sim());
        adapter.initialize(&clock).unwrap();

        // Sample at open, counted but nobody listens yet
        adapter.update(&clock).unwrap();

        let enu = ctx.subscribe::<Odometry>("odom_ins_enu").unwrap();
        let ned = ctx.subscribe::<Odometry>("odom_ins_ned").unwrap();
        let pimu = ctx.subscribe::<Pimu>("pimu_slow").unwrap();

        clock.sleep(TimeDelta::milliseconds(995));
        adapter.update(&clock).unwrap();

        // One INS sample fans out to both odometry topics
        assert_eq!(enu.drain().len(), 99);
        assert_eq!(ned.drain().len(), 49);
        // The device itself streams PIMU at the slower rate
        assert_eq!(pimu.drain().len(), 49);
    }

    #[test]
    fn test_terminate_closes_topics() {
        let clock = clock();
        let (mut adapter, ctx) = make_adapter(BASIC_CONFIG, sim());
        adapter.initialize(&clock).unwrap();

        let rx = ctx.subscribe::<Pimu>("pimu").unwrap();

        adapter.terminate();
        adapter.terminate();

        assert!(!adapter.device().is_open());
        assert!(matches!(rx.try_recv(), Err(TelemetryError::ClosedChannel)));
        assert!(matches!(
            adapter.update(&clock),
            Err(AdapterError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_after_terminate() {
        let clock = clock();
        let (mut adapter, ctx) = make_adapter(BASIC_CONFIG, sim());
        adapter.initialize(&clock).unwrap();

        let old_rx = ctx.subscribe::<Pimu>("pimu").unwrap();
        adapter.terminate();

        adapter.initialize(&clock).unwrap();
        assert!(adapter.device().is_open());

        let rx = ctx.subscribe::<Pimu>("pimu").unwrap();

        clock.sleep(TimeDelta::milliseconds(100));
        let published = adapter.update(&clock).unwrap();

        assert!(published > 0);
        assert_eq!(rx.drain().len(), published);
        assert!(matches!(old_rx.try_recv(), Err(TelemetryError::ClosedChannel)));

        assert!(matches!(
            adapter.initialize(&clock),
            Err(AdapterError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_enu_attitude() {
        let q = attitude_enu(&UnitQuaternion::identity());

        // Facing north, upright
        assert_abs_diff_eq!(q * Vector3::x(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(q * Vector3::z(), Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);

        assert_eq!(
            ned_to_enu(&Vector3::new(1.0, 2.0, 3.0)),
            Vector3::new(2.0, 1.0, -3.0)
        );
    }
}
