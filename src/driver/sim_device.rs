//! Simulated inertial sensor unit.
//!
//! Stands still on a bench, streams IMU / PIMU / INS / wheel encoder data on
//! the navigation period grid of its own clock and GPS position on the 5 Hz
//! grid of GPS time. GPS time is taken from the host clock's UTC when the
//! port is opened, so a perfectly synchronised adapter reproduces host time.

use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256StarStar;

use super::device::{Device, DeviceError, DeviceMessage, DeviceSetup};
use crate::{
    core::{
        gps_time::{SECONDS_PER_WEEK, gps_seconds_from_unix, week_tow},
        time::{Clock, Instant, TD},
    },
    parameters::SimulationConfig,
    streams::StreamKind,
};

const GPS_BASE_PERIOD_S: f64 = 0.2;
const GRAVITY: f64 = 9.80665;
const WHEEL_NAMES: [&str; 2] = ["left", "right"];

/// Bench position, ECEF meters
const BENCH_ECEF: [f64; 3] = [-1_288_398.0, -4_721_697.0, 4_078_625.0];

#[derive(Debug, Clone)]
struct Schedule {
    stream: StreamKind,
    period: f64,
    index: u64,
}

impl Schedule {
    /// First grid point at or after `t`
    fn starting_at(stream: StreamKind, period: f64, t: f64) -> Self {
        Self {
            stream,
            period,
            index: (t / period).ceil().max(0.0) as u64,
        }
    }

    fn due(&self) -> f64 {
        self.index as f64 * self.period
    }
}

#[derive(Debug)]
struct Session {
    port: String,
    opened_at: Instant,
    /// GPS seconds since the GPS epoch at device time 0
    gps_at_boot: f64,
    schedules: Vec<Schedule>,
    /// Grid in GPS seconds rather than device time
    gps_schedule: Option<Schedule>,
}

#[derive(Debug)]
pub struct SimulatedDevice {
    config: SimulationConfig,
    rng: Xoshiro256StarStar,
    setup: DeviceSetup,
    session: Option<Session>,
}

impl SimulatedDevice {
    pub fn new(config: SimulationConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);

        Self {
            config,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            setup: DeviceSetup::default(),
            session: None,
        }
    }

    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.port.as_str())
    }

    fn device_time(&self, session: &Session, clock: &dyn Clock) -> f64 {
        self.config.boot_offset_s + TD(clock.monotonic().duration_since(&session.opened_at)).seconds()
    }

    fn has_fix(&self, t: f64) -> bool {
        self.config.fix_delay_s >= 0.0 && t >= self.config.boot_offset_s + self.config.fix_delay_s
    }

    fn gps_offset(&self, session: &Session) -> f64 {
        session.gps_at_boot + self.setup.gps_time_user_delay
    }

    fn base_period(&self, stream: StreamKind) -> f64 {
        match stream {
            StreamKind::Gps => GPS_BASE_PERIOD_S,
            _ => self.setup.navigation_dt_ms as f64 / 1000.0,
        }
    }

    fn period(&self, stream: StreamKind) -> f64 {
        let multiple = self.setup.periods.get(&stream).copied().unwrap_or(1).max(1);
        self.base_period(stream) * multiple as f64
    }

    fn schedule(&self, session: &mut Session, now: f64) {
        session.schedules = self
            .setup
            .periods
            .keys()
            .filter(|s| **s != StreamKind::Gps)
            .map(|s| Schedule::starting_at(*s, self.period(*s), now))
            .collect();

        let gps_now = now + self.gps_offset(session);
        session.gps_schedule = self
            .setup
            .periods
            .contains_key(&StreamKind::Gps)
            .then(|| Schedule::starting_at(StreamKind::Gps, self.period(StreamKind::Gps), gps_now));
    }

    fn noise(&mut self, std: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        z * std
    }

    fn noise_vec(&mut self, std: f64) -> Vector3<f64> {
        Vector3::new(self.noise(std), self.noise(std), self.noise(std))
    }

    fn jittered(&mut self, t: f64) -> f64 {
        let jitter = self.config.jitter_s.abs();
        t + self.noise(jitter)
    }

    fn acc(&mut self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -GRAVITY) + self.noise_vec(self.config.acc_noise)
    }

    fn gyro(&mut self) -> Vector3<f64> {
        self.noise_vec(self.config.gyro_noise)
    }

    fn sample(&mut self, t: f64, stream: StreamKind, gps_offset: f64) -> DeviceMessage {
        match stream {
            StreamKind::Imu => DeviceMessage::Imu {
                time: self.jittered(t),
                gyro: self.gyro(),
                acc: self.acc(),
            },
            StreamKind::Pimu => {
                let dt = self.period(StreamKind::Pimu);
                DeviceMessage::Pimu {
                    time: self.jittered(t),
                    dt,
                    dtheta: self.gyro() * dt,
                    dvel: self.acc() * dt,
                }
            }
            StreamKind::Ins => {
                let (week, tow) = if self.has_fix(t) {
                    week_tow(gps_offset + t)
                } else {
                    (0, t)
                };

                DeviceMessage::Ins {
                    week,
                    tow: self.jittered(tow),
                    pos_ned: Vector3::zeros(),
                    vel_ned: Vector3::zeros(),
                    att_ned: UnitQuaternion::identity(),
                }
            }
            StreamKind::Gps => self.gps_sample(t, gps_offset),
            StreamKind::WheelEncoder => DeviceMessage::WheelEncoder {
                time: self.jittered(t),
                theta: [0.0; WHEEL_NAMES.len()],
                omega: [0.0; WHEEL_NAMES.len()],
            },
        }
    }

    fn gps_sample(&mut self, t: f64, gps_offset: f64) -> DeviceMessage {
        if !self.has_fix(t) {
            return DeviceMessage::Gps {
                week: 0,
                tow_ms: 0,
                tow_offset: 0.0,
                leap_s: self.config.leap_seconds,
                num_sat: 0,
                fix: false,
                pos_ecef: Vector3::zeros(),
                vel_ecef: Vector3::zeros(),
            };
        }

        let (mut week, tow) = week_tow(gps_offset + t);
        let mut tow_ms = (tow * 1000.0).round() as u32;

        if tow_ms as f64 >= SECONDS_PER_WEEK * 1000.0 {
            week += 1;
            tow_ms -= (SECONDS_PER_WEEK * 1000.0) as u32;
        }

        DeviceMessage::Gps {
            week,
            tow_ms,
            tow_offset: gps_offset - week as f64 * SECONDS_PER_WEEK,
            leap_s: self.config.leap_seconds,
            num_sat: self.config.num_sat,
            fix: true,
            pos_ecef: Vector3::from(BENCH_ECEF),
            vel_ecef: Vector3::zeros(),
        }
    }
}

impl Device for SimulatedDevice {
    fn open(&mut self, port: &str, baudrate: u32, clock: &dyn Clock) -> Result<(), DeviceError> {
        if let Some(expected) = &self.config.port {
            if expected != port {
                return Err(DeviceError::PortNotFound(port.to_string()));
            }
        }

        let utc = clock.utc().unix_seconds_f64();
        let gps_at_boot =
            gps_seconds_from_unix(utc, self.config.leap_seconds) - self.config.boot_offset_s;

        info!("Simulated device on '{port}' ({baudrate} baud)");

        let mut session = Session {
            port: port.to_string(),
            opened_at: clock.monotonic(),
            gps_at_boot,
            schedules: vec![],
            gps_schedule: None,
        };

        self.schedule(&mut session, self.config.boot_offset_s);
        self.session = Some(session);

        Ok(())
    }

    fn configure(&mut self, setup: &DeviceSetup) -> Result<(), DeviceError> {
        self.setup = setup.clone();

        let mut session = self.session.take().ok_or(DeviceError::NotOpen)?;
        let now = session
            .schedules
            .iter()
            .map(|s| s.due())
            .fold(self.config.boot_offset_s, f64::max);

        self.schedule(&mut session, now);
        debug!("Simulated device streams: {:?}", self.setup.periods);

        self.session = Some(session);

        Ok(())
    }

    fn read(&mut self, clock: &dyn Clock) -> Result<Vec<DeviceMessage>, DeviceError> {
        let session = self.session.as_ref().ok_or(DeviceError::NotOpen)?;
        let now = self.device_time(session, clock);
        let gps_offset = self.gps_offset(session);

        let mut due = vec![];

        if let Some(session) = self.session.as_mut() {
            for schedule in session.schedules.iter_mut() {
                while schedule.due() <= now {
                    due.push((schedule.due(), schedule.stream));
                    schedule.index += 1;
                }
            }

            if let Some(gps) = session.gps_schedule.as_mut() {
                while gps.due() - gps_offset <= now {
                    due.push((gps.due() - gps_offset, StreamKind::Gps));
                    gps.index += 1;
                }
            }
        }

        due.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(due
            .into_iter()
            .map(|(t, stream)| self.sample(t, stream, gps_offset))
            .collect())
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Simulated device on '{}' closed", session.port);
        }
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }
}
