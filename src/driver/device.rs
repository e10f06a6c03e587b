use std::collections::BTreeMap;

use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

use crate::{core::time::Clock, streams::StreamKind};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Port '{0}' not found")]
    PortNotFound(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Samples as the device reports them, in device time.
///
/// `time` fields are seconds since the device booted. INS reports GPS week
/// and time of week once the receiver has a fix; before that `week` is 0 and
/// `tow` is the time since boot.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    Imu {
        time: f64,
        gyro: Vector3<f64>,
        acc: Vector3<f64>,
    },
    Pimu {
        time: f64,
        dt: f64,
        dtheta: Vector3<f64>,
        dvel: Vector3<f64>,
    },
    Ins {
        week: u32,
        tow: f64,
        pos_ned: Vector3<f64>,
        vel_ned: Vector3<f64>,
        /// Body (FRD) to NED
        att_ned: UnitQuaternion<f64>,
    },
    Gps {
        week: u32,
        tow_ms: u32,
        /// GPS time of week minus device time since boot, seconds
        tow_offset: f64,
        leap_s: i32,
        num_sat: u8,
        fix: bool,
        pos_ecef: Vector3<f64>,
        vel_ecef: Vector3<f64>,
    },
    WheelEncoder {
        time: f64,
        theta: [f64; 2],
        omega: [f64; 2],
    },
}

impl DeviceMessage {
    pub fn stream(&self) -> StreamKind {
        match self {
            DeviceMessage::Imu { .. } => StreamKind::Imu,
            DeviceMessage::Pimu { .. } => StreamKind::Pimu,
            DeviceMessage::Ins { .. } => StreamKind::Ins,
            DeviceMessage::Gps { .. } => StreamKind::Gps,
            DeviceMessage::WheelEncoder { .. } => StreamKind::WheelEncoder,
        }
    }
}

/// What the adapter asks the device to stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSetup {
    pub navigation_dt_ms: u32,
    /// Output period of each data stream, in multiples of the stream's base period
    pub periods: BTreeMap<StreamKind, u32>,
    /// Seconds
    pub gps_time_user_delay: f64,
}

pub trait Device {
    fn open(&mut self, port: &str, baudrate: u32, clock: &dyn Clock) -> Result<(), DeviceError>;

    fn configure(&mut self, setup: &DeviceSetup) -> Result<(), DeviceError>;

    /// Everything the device produced since the last read, oldest first
    fn read(&mut self, clock: &dyn Clock) -> Result<Vec<DeviceMessage>, DeviceError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}
