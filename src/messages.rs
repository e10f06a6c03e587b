//! Message types carried on the telemetry bus.
//!
//! Layout follows the usual robotics message set: every message starts with a
//! [`Header`] whose [`Stamp`] is the sensor time of the sample, not the time
//! the message was published.

use nalgebra::{UnitQuaternion, Vector3};

const NSEC_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub sec: i32,
    pub nanosec: u32,
}

impl Stamp {
    pub fn from_sec_f64(seconds: f64) -> Self {
        let mut sec = seconds.floor();
        let mut nanosec = ((seconds - sec) * NSEC_PER_SEC).round();

        if nanosec >= NSEC_PER_SEC {
            sec += 1.0;
            nanosec -= NSEC_PER_SEC;
        }

        Stamp {
            sec: sec as i32,
            nanosec: nanosec as u32,
        }
    }

    pub fn as_sec_f64(&self) -> f64 {
        self.sec as f64 + self.nanosec as f64 / NSEC_PER_SEC
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub stamp: Stamp,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Stamp, frame_id: &str) -> Self {
        Header {
            stamp,
            frame_id: frame_id.to_string(),
        }
    }
}

pub trait HasHeader {
    fn header(&self) -> &Header;

    fn stamp_sec(&self) -> f64 {
        self.header().stamp.as_sec_f64()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Imu {
    pub header: Header,
    pub angular_velocity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
}

/// Preintegrated IMU: delta theta / delta velocity accumulated over `dt`
#[derive(Debug, Clone, PartialEq)]
pub struct Pimu {
    pub header: Header,
    pub dt: f64,
    pub dtheta: Vector3<f64>,
    pub dvel: Vector3<f64>,
}

/// Fused INS solution
#[derive(Debug, Clone, PartialEq)]
pub struct Odometry {
    pub header: Header,
    pub child_frame_id: String,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gps {
    pub header: Header,
    pub week: u32,
    /// Time of week, milliseconds
    pub tow_ms: u32,
    /// GPS time of week minus device time since boot, seconds
    pub tow_offset: f64,
    pub leap_s: i32,
    pub num_sat: u8,
    pub fix: bool,
    pub pos_ecef: Vector3<f64>,
    pub vel_ecef: Vector3<f64>,
}

/// Wheel encoder readings, one entry per wheel
#[derive(Debug, Clone, PartialEq)]
pub struct JointState {
    pub header: Header,
    pub name: Vec<String>,
    pub position: Vec<f64>,
    pub velocity: Vec<f64>,
}

macro_rules! impl_has_header {
    ($($t:ty),*) => {
        $(
            impl HasHeader for $t {
                fn header(&self) -> &Header {
                    &self.header
                }
            }
        )*
    };
}

impl_has_header!(Imu, Pimu, Odometry, Gps, JointState);
