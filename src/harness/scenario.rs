//! End-to-end checks of a sensor adapter running against the telemetry bus.

use std::{collections::BTreeMap, fmt, path::Path};

use chrono::TimeDelta;
use log::{info, warn};
use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use super::{
    HarnessError, PairFailure,
    deviation::DeviationStats,
    poll::{PollLoop, PollOutcome, Step},
    test_node::{TestNode, TestNodeTopics},
};
use crate::{
    core::time::{Clock, TD},
    driver::{Device, InertialSenseAdapter, SensorAdapter, SimulatedDevice},
    nodes::{NodeContext, spin_some},
    parameters::{AdapterConfig, BASIC_CONFIG, SimulationConfig, TIME_SYNC_CONFIG},
    streams::StreamKind,
    telemetry::TelemetryService,
    utils::capacity::Capacity,
};

/// Deviation pairs checked by the time sync scenario: (samples, reference, tolerance in seconds)
pub const SYNC_PAIRS: [(StreamKind, StreamKind, f64); 4] = [
    (StreamKind::Gps, StreamKind::Pimu, 0.05),
    (StreamKind::Gps, StreamKind::Imu, 0.05),
    (StreamKind::Gps, StreamKind::Ins, 0.05),
    (StreamKind::Ins, StreamKind::Imu, 0.005),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    /// A PIMU message arrives within 5 s
    Basic,
    /// GPS, IMU, PIMU and INS stamps agree
    TimeSync,
}

impl Scenario {
    pub fn default_config(&self) -> &'static str {
        match self {
            Scenario::Basic => BASIC_CONFIG,
            Scenario::TimeSync => TIME_SYNC_CONFIG,
        }
    }
}

/// Everything a scenario run can be tuned with
#[derive(Debug, Clone, Default)]
pub struct ScenarioSetup {
    /// Replaces the scenario's built-in adapter configuration
    pub config: Option<AdapterConfig>,
    pub simulation: SimulationConfig,
    /// "from:=to" topic remap rules
    pub remap: Vec<String>,
    pub topics: TestNodeTopics,
    pub queue: Capacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitReport {
    pub stream: StreamKind,
    pub elapsed_s: f64,
    pub received: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairReport {
    pub samples: StreamKind,
    pub reference: StreamKind,
    pub stats: DeviationStats,
    pub tolerance: f64,
}

impl PairReport {
    pub fn name(&self) -> String {
        format!("{} <> {}", label(self.samples), label(self.reference))
    }

    pub fn passed(&self) -> bool {
        self.stats.avg <= self.tolerance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSyncReport {
    pub fix_wait_s: f64,
    pub pairs: Vec<PairReport>,
    pub samples: BTreeMap<StreamKind, Vec<f64>>,
}

impl TimeSyncReport {
    pub fn failures(&self) -> Vec<PairFailure> {
        self.pairs
            .iter()
            .filter(|p| !p.passed())
            .map(|p| PairFailure {
                pair: p.name(),
                avg: p.stats.avg,
                tolerance: p.tolerance,
            })
            .collect()
    }
}

impl fmt::Display for TimeSyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pair in &self.pairs {
            writeln!(
                f,
                "Timestamp Deviation ({:<12}) {} {} {}",
                pair.name(),
                pair.stats,
                if pair.passed() { "<=" } else { ">" },
                pair.tolerance
            )?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioReport {
    Basic(WaitReport),
    TimeSync(TimeSyncReport),
}

impl ScenarioReport {
    pub fn samples(&self) -> Option<&BTreeMap<StreamKind, Vec<f64>>> {
        match self {
            ScenarioReport::Basic(_) => None,
            ScenarioReport::TimeSync(report) => Some(&report.samples),
        }
    }
}

fn label(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::WheelEncoder => "WHEEL",
        StreamKind::Pimu => "pIMU",
        StreamKind::Imu => "IMU",
        StreamKind::Ins => "INS",
        StreamKind::Gps => "GPS",
    }
}

fn received(node: &TestNode, stream: StreamKind) -> bool {
    match stream {
        StreamKind::Pimu => node.did_rx_pimu(),
        StreamKind::Gps => node.got_gps_tow(),
        _ => node.received(stream) > 0,
    }
}

/// Poll until `stream` shows up on the node, for at most 5 s
pub fn wait_for_message<A: SensorAdapter>(
    adapter: &mut A,
    node: &mut TestNode,
    stream: StreamKind,
    clock: &dyn Clock,
) -> Result<WaitReport, HarnessError> {
    let outcome = PollLoop::new(TimeDelta::seconds(5), TimeDelta::milliseconds(200))
        .report_every(TimeDelta::seconds(1))
        .run(
            clock,
            || -> Result<Step, HarnessError> {
                adapter.update(clock)?;
                spin_some(node);

                Ok(if received(node, stream) {
                    Step::Done
                } else {
                    Step::Continue
                })
            },
            |elapsed| info!("Waiting for {stream}...  (time: {:.1})", TD(elapsed).seconds()),
        )?;

    match outcome {
        PollOutcome::Completed { .. } => {
            info!("Received {stream} after {:.3} s", outcome.elapsed_s());

            Ok(WaitReport {
                stream,
                elapsed_s: outcome.elapsed_s(),
                received: node.received(stream),
            })
        }
        PollOutcome::TimedOut { .. } => Err(HarnessError::Timeout {
            waiting_for: format!("{stream} message"),
            elapsed_s: outcome.elapsed_s(),
        }),
    }
}

/// Both time sync phases poll for 10 s and report every 2.5 s
fn time_sync_loop() -> PollLoop {
    PollLoop::new(TimeDelta::seconds(10), TimeDelta::milliseconds(100))
        .report_every(TimeDelta::milliseconds(2500))
}

/// Wait for GPS time of week, collect for 10 s, then compare stamps across
/// streams
pub fn gps_ins_time_sync<A: SensorAdapter>(
    adapter: &mut A,
    node: &mut TestNode,
    clock: &dyn Clock,
) -> Result<TimeSyncReport, HarnessError> {
    node.set_quiet(true);

    let fix = time_sync_loop().run(
        clock,
        || -> Result<Step, HarnessError> {
            adapter.update(clock)?;
            spin_some(node);

            Ok(if node.got_gps_tow() {
                Step::Done
            } else {
                Step::Continue
            })
        },
        |elapsed| {
            info!(
                "Waiting for GPS Fix/TimeOfWeek Update...  (time: {:.1})",
                TD(elapsed).seconds()
            )
        },
    )?;

    if !fix.is_completed() {
        return Err(HarnessError::Timeout {
            waiting_for: "TimeOfWeek (poor GPS signal?)".to_string(),
            elapsed_s: fix.elapsed_s(),
        });
    }

    info!("GPS time of week after {:.3} s, collecting data", fix.elapsed_s());

    let window = TimeDelta::seconds(10);
    time_sync_loop().run(
        clock,
        || -> Result<Step, HarnessError> {
            adapter.update(clock)?;
            spin_some(node);
            Ok(Step::Continue)
        },
        |elapsed| {
            info!(
                "Collecting data...  ({:.1} sec remaining)",
                TD(window - elapsed).seconds()
            )
        },
    )?;

    let mut pairs = Vec::with_capacity(SYNC_PAIRS.len());

    for (samples, reference, tolerance) in SYNC_PAIRS {
        for stream in [samples, reference] {
            if node.samples(stream).is_empty() {
                return Err(HarnessError::NoSamples(stream));
            }
        }

        pairs.push(PairReport {
            samples,
            reference,
            stats: DeviationStats::compute(node.samples(samples), node.samples(reference))?,
            tolerance,
        });
    }

    let report = TimeSyncReport {
        fix_wait_s: fix.elapsed_s(),
        pairs,
        samples: node.all_samples(),
    };

    for line in report.to_string().lines() {
        info!("{line}");
    }

    let failures = report.failures();
    if !failures.is_empty() {
        return Err(HarnessError::ToleranceExceeded(failures));
    }

    Ok(report)
}

/// Run a scenario against the simulated sensor unit
pub fn run_scenario(
    scenario: Scenario,
    setup: &ScenarioSetup,
    clock: &dyn Clock,
) -> Result<ScenarioReport, HarnessError> {
    let device = SimulatedDevice::new(setup.simulation.clone());
    run_scenario_with(scenario, setup, device, clock)
}

/// Build the bus, the adapter and the test node, then run `scenario`.
/// The adapter is terminated whatever the outcome.
pub fn run_scenario_with<D: Device>(
    scenario: Scenario,
    setup: &ScenarioSetup,
    device: D,
    clock: &dyn Clock,
) -> Result<ScenarioReport, HarnessError> {
    info!("Running scenario '{scenario}'");

    let config = match &setup.config {
        Some(config) => config.clone(),
        None => AdapterConfig::from_yaml(scenario.default_config())?,
    };

    let telemetry = TelemetryService::with_remap_rules(&setup.remap)?;
    let ctx = NodeContext::new(telemetry, setup.queue);

    let mut adapter = InertialSenseAdapter::new(config, ctx.clone(), device);
    let res = run_with_adapter(scenario, setup, &ctx, &mut adapter, clock);
    adapter.terminate();

    match &res {
        Ok(_) => info!("Scenario '{scenario}' passed"),
        Err(e) => warn!("Scenario '{scenario}' failed: {e}"),
    }

    res
}

fn run_with_adapter<A: SensorAdapter>(
    scenario: Scenario,
    setup: &ScenarioSetup,
    ctx: &NodeContext,
    adapter: &mut A,
    clock: &dyn Clock,
) -> Result<ScenarioReport, HarnessError> {
    adapter.initialize(clock)?;

    let mut node = TestNode::new("test_node", ctx, &setup.topics)?;

    Ok(match scenario {
        Scenario::Basic => ScenarioReport::Basic(wait_for_message(
            adapter,
            &mut node,
            StreamKind::Pimu,
            clock,
        )?),
        Scenario::TimeSync => {
            ScenarioReport::TimeSync(gps_ins_time_sync(adapter, &mut node, clock)?)
        }
    })
}

#[derive(Debug, Serialize)]
struct SampleRecord<'a> {
    stream: &'a str,
    stamp: f64,
}

/// Dump collected stamps as `stream,stamp` rows
pub fn write_samples_csv(
    path: &Path,
    samples: &BTreeMap<StreamKind, Vec<f64>>,
) -> Result<(), HarnessError> {
    let mut writer = csv::Writer::from_path(path)?;

    for (stream, stamps) in samples {
        for stamp in stamps {
            writer.serialize(SampleRecord {
                stream: stream.as_ref(),
                stamp: *stamp,
            })?;
        }
    }

    writer.flush().map_err(csv::Error::from)?;

    info!("Samples written to '{}'", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc, str::FromStr};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        core::time::SimulatedClock,
        driver::{DeviceError, DeviceMessage, DeviceSetup},
    };

    fn clock() -> SimulatedClock {
        SimulatedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            TimeDelta::zero(),
        )
    }

    fn setup(fix_delay_s: f64) -> ScenarioSetup {
        ScenarioSetup {
            simulation: SimulationConfig {
                seed: Some(1),
                fix_delay_s,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Simulated device that counts how often it gets closed
    struct CountingDevice {
        inner: SimulatedDevice,
        closes: Rc<Cell<usize>>,
    }

    impl CountingDevice {
        fn new(setup: &ScenarioSetup) -> (Self, Rc<Cell<usize>>) {
            let closes = Rc::new(Cell::new(0));
            let device = Self {
                inner: SimulatedDevice::new(setup.simulation.clone()),
                closes: closes.clone(),
            };

            (device, closes)
        }
    }

    impl Device for CountingDevice {
        fn open(&mut self, port: &str, baudrate: u32, clock: &dyn Clock) -> Result<(), DeviceError> {
            self.inner.open(port, baudrate, clock)
        }

        fn configure(&mut self, setup: &DeviceSetup) -> Result<(), DeviceError> {
            self.inner.configure(setup)
        }

        fn read(&mut self, clock: &dyn Clock) -> Result<Vec<DeviceMessage>, DeviceError> {
            self.inner.read(clock)
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
            self.inner.close();
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
    }

    #[test]
    fn test_scenario_names() {
        assert_eq!(Scenario::from_str("time-sync"), Ok(Scenario::TimeSync));
        assert_eq!(Scenario::Basic.to_string(), "basic");
    }

    #[test]
    fn test_pair_report() {
        let report = PairReport {
            samples: StreamKind::Gps,
            reference: StreamKind::Pimu,
            stats: DeviationStats::compute(&[1.0, 2.0], &[1.05, 2.2]).unwrap(),
            tolerance: 0.05,
        };

        assert_eq!(report.name(), "GPS <> pIMU");
        assert!(!report.passed());
    }

    #[test]
    fn test_time_sync_progress_reports() {
        let clock = clock();
        let mut reports = vec![];

        let outcome = time_sync_loop()
            .run::<()>(&clock, || Ok(Step::Continue), |e| reports.push(e))
            .unwrap();

        assert_eq!(outcome.elapsed(), TimeDelta::seconds(10));
        assert_eq!(
            reports,
            [2500, 5000, 7500].map(TimeDelta::milliseconds).to_vec()
        );
    }

    #[test]
    fn test_basic_wait_report() {
        let clock = clock();

        let report = run_scenario(Scenario::Basic, &setup(2.0), &clock).unwrap();

        let ScenarioReport::Basic(wait) = report else {
            panic!("unexpected report {report:?}");
        };
        assert_eq!(wait.stream, StreamKind::Pimu);
        assert!(wait.received > 0);
        assert!(wait.elapsed_s < 1.0);
    }

    #[test]
    fn test_device_closed_after_pass() {
        let clock = clock();
        let setup = setup(2.0);
        let (device, closes) = CountingDevice::new(&setup);

        assert!(run_scenario_with(Scenario::Basic, &setup, device, &clock).is_ok());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_device_closed_after_timeout() {
        let clock = clock();
        let setup = setup(-1.0);
        let (device, closes) = CountingDevice::new(&setup);

        assert!(matches!(
            run_scenario_with(Scenario::TimeSync, &setup, device, &clock),
            Err(HarnessError::Timeout { .. })
        ));
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_csv_export() {
        let path = std::env::temp_dir().join(format!("ins_harness_{}.csv", std::process::id()));
        let samples = BTreeMap::from([
            (StreamKind::Gps, vec![1.0, 1.2]),
            (StreamKind::Imu, vec![1.016]),
        ]);

        write_samples_csv(&path, &samples).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(text, "stream,stamp\nimu,1.016\ngps,1.0\ngps,1.2\n");
    }
}
