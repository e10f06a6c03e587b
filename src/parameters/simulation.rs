use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::gps_time::DEFAULT_LEAP_SECONDS;

/// Behaviour of the simulated sensor unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Device uptime when the port is opened, seconds
    pub boot_offset_s: f64,
    /// Time from open until the GPS receiver reports a fix, seconds.
    /// A negative value means the receiver never gets a fix.
    pub fix_delay_s: f64,
    /// Standard deviation of the noise added to sample times, seconds
    pub jitter_s: f64,
    /// RNG seed, random when not set
    pub seed: Option<u64>,
    pub leap_seconds: i32,
    pub num_sat: u8,
    /// Only this port can be opened. Any port works when not set.
    pub port: Option<String>,
    pub acc_noise: f64,
    pub gyro_noise: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            boot_offset_s: 30.0,
            fix_delay_s: 2.0,
            jitter_s: 0.0,
            seed: None,
            leap_seconds: DEFAULT_LEAP_SECONDS,
            num_sat: 14,
            port: None,
            acc_noise: 0.02,
            gyro_noise: 0.001,
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml(&yaml)
    }
}
