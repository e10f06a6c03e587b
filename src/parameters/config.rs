use std::{collections::BTreeMap, fs, path::Path, str::FromStr};

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{
    streams::MessageKind,
    telemetry::{TopicError, TopicName},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to parse YAML configuration. Is the file valid?")]
    Parse(#[from] serde_yaml::Error),

    #[error("Cannot read configuration file '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Message '{0}' is enabled with a period of 0")]
    ZeroPeriod(String),

    #[error("navigation_dt_ms must be greater than 0")]
    ZeroNavigationPeriod,

    #[error(transparent)]
    Topic(#[from] TopicError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageConfig {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_period")]
    pub period: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsConfig {
    /// EKF update period
    #[serde(default = "default_navigation_dt_ms")]
    pub navigation_dt_ms: u32,
    #[serde(default)]
    pub messages: BTreeMap<String, MessageConfig>,
}

impl Default for InsConfig {
    fn default() -> Self {
        Self {
            navigation_dt_ms: default_navigation_dt_ms(),
            messages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorsConfig {
    #[serde(default)]
    pub messages: BTreeMap<String, MessageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsConfig {
    #[serde(rename = "type", default = "default_gps_type")]
    pub receiver: String,
    /// Seconds
    #[serde(rename = "gpsTimeUserDelay", default)]
    pub time_user_delay: f64,
    #[serde(default)]
    pub messages: BTreeMap<String, MessageConfig>,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            receiver: default_gps_type(),
            time_user_delay: 0.0,
            messages: BTreeMap::new(),
        }
    }
}

/// Adapter configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub port: Vec<String>,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default)]
    pub ins: InsConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub gps1: Option<GpsConfig>,
    #[serde(default)]
    pub wheel_encoder: Option<MessageConfig>,
}

/// An enabled output message, ready for the adapter
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSetup {
    pub kind: MessageKind,
    pub topic: TopicName,
    /// Output period in multiples of the message's base period
    pub period: u32,
}

impl AdapterConfig {
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

    pub fn gps_time_user_delay(&self) -> f64 {
        self.gps1.as_ref().map_or(0.0, |g| g.time_user_delay)
    }

    /// Every enabled message this adapter knows how to produce, in a stable
    /// order. Unknown message names are skipped with a warning.
    pub fn enabled_streams(&self) -> Result<Vec<StreamSetup>, ConfigError> {
        if self.ins.navigation_dt_ms == 0 {
            return Err(ConfigError::ZeroNavigationPeriod);
        }

        let sections = [
            ("ins", &self.ins.messages, INS_MESSAGES),
            ("sensors", &self.sensors.messages, SENSOR_MESSAGES),
        ];

        let mut streams = vec![];

        for (section, messages, known) in sections {
            collect_streams(section, messages, known, &mut streams)?;
        }

        if let Some(gps1) = &self.gps1 {
            collect_streams("gps1", &gps1.messages, GPS_MESSAGES, &mut streams)?;
        }

        if let Some(wheel) = &self.wheel_encoder {
            push_stream(MessageKind::WheelEncoder, "wheel_encoder", wheel, &mut streams)?;
        }

        Ok(streams)
    }
}

const INS_MESSAGES: &[MessageKind] = &[MessageKind::OdomInsEnu, MessageKind::OdomInsNed];
const SENSOR_MESSAGES: &[MessageKind] = &[MessageKind::Imu, MessageKind::Pimu];
const GPS_MESSAGES: &[MessageKind] = &[MessageKind::PosVel];

fn collect_streams(
    section: &str,
    messages: &BTreeMap<String, MessageConfig>,
    known: &[MessageKind],
    out: &mut Vec<StreamSetup>,
) -> Result<(), ConfigError> {
    for (name, msg) in messages {
        match MessageKind::from_str(name) {
            Ok(kind) if known.contains(&kind) => push_stream(kind, name, msg, out)?,
            _ => warn!("Ignoring unsupported message '{section}.messages.{name}'"),
        }
    }

    Ok(())
}

fn push_stream(
    kind: MessageKind,
    name: &str,
    msg: &MessageConfig,
    out: &mut Vec<StreamSetup>,
) -> Result<(), ConfigError> {
    if !msg.enable {
        return Ok(());
    }

    if msg.period == 0 {
        return Err(ConfigError::ZeroPeriod(name.to_string()));
    }

    let topic = TopicName::parse(msg.topic.as_deref().unwrap_or(name))?;

    out.push(StreamSetup {
        kind,
        topic,
        period: msg.period,
    });

    Ok(())
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(port) => vec![port],
        OneOrMany::Many(ports) => ports,
    })
}

fn default_topic() -> String {
    "inertialsense".to_string()
}

fn default_baudrate() -> u32 {
    921600
}

fn default_navigation_dt_ms() -> u32 {
    4
}

fn default_period() -> u32 {
    1
}

fn default_gps_type() -> String {
    "F9P".to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parameters::{BASIC_CONFIG, TIME_SYNC_CONFIG};

    #[test]
    fn test_basic_document() {
        let config = AdapterConfig::from_yaml(BASIC_CONFIG).unwrap();

        assert_eq!(config.topic, "inertialsense");
        assert_eq!(
            config.port,
            vec!["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyACM2"]
        );
        assert_eq!(config.baudrate, 921600);
        assert_eq!(config.ins.navigation_dt_ms, 16);
        assert_eq!(config.gps1, None);

        assert_eq!(
            config.enabled_streams().unwrap(),
            vec![StreamSetup {
                kind: MessageKind::Pimu,
                topic: TopicName::parse("pimu").unwrap(),
                period: 1,
            }]
        );
    }

    #[test]
    fn test_time_sync_document() {
        let config = AdapterConfig::from_yaml(TIME_SYNC_CONFIG).unwrap();

        let kinds: Vec<_> = config
            .enabled_streams()
            .unwrap()
            .into_iter()
            .map(|s| (s.kind, s.topic.to_string()))
            .collect();

        assert_eq!(
            kinds,
            vec![
                (MessageKind::OdomInsEnu, "/odom_ins_enu".to_string()),
                (MessageKind::Imu, "/imu".to_string()),
                (MessageKind::Pimu, "/pimu".to_string()),
                (MessageKind::PosVel, "/gps1/pos_vel".to_string()),
            ]
        );

        let gps1 = config.gps1.as_ref().unwrap();
        assert_eq!(gps1.receiver, "F9P");
        assert_eq!(config.gps_time_user_delay(), 0.0);
    }

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::from_yaml("port: /dev/ttyUSB0").unwrap();

        assert_eq!(config.port, vec!["/dev/ttyUSB0"]);
        assert_eq!(config.topic, "inertialsense");
        assert_eq!(config.baudrate, 921600);
        assert_eq!(config.ins.navigation_dt_ms, 4);
        assert!(config.enabled_streams().unwrap().is_empty());
    }

    #[test]
    fn test_message_defaults() {
        let yaml = "
sensors:
  messages:
    imu:
      enable: true
    pimu: {}
    magnetometer:
      enable: true
wheel_encoder:
  topic: msg_wheel_encoder
  enable: true
";
        let streams = AdapterConfig::from_yaml(yaml)
            .unwrap()
            .enabled_streams()
            .unwrap();

        assert_eq!(
            streams,
            vec![
                StreamSetup {
                    kind: MessageKind::Imu,
                    topic: TopicName::parse("/imu").unwrap(),
                    period: 1,
                },
                StreamSetup {
                    kind: MessageKind::WheelEncoder,
                    topic: TopicName::parse("/msg_wheel_encoder").unwrap(),
                    period: 1,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            AdapterConfig::from_yaml("port: [a, b"),
            Err(ConfigError::Parse(_))
        ));

        let zero_period = "sensors: { messages: { imu: { enable: true, period: 0 } } }";
        assert!(matches!(
            AdapterConfig::from_yaml(zero_period).unwrap().enabled_streams(),
            Err(ConfigError::ZeroPeriod(name)) if name == "imu"
        ));

        let zero_dt = "ins: { navigation_dt_ms: 0 }";
        assert!(matches!(
            AdapterConfig::from_yaml(zero_dt).unwrap().enabled_streams(),
            Err(ConfigError::ZeroNavigationPeriod)
        ));

        let bad_topic = "sensors: { messages: { imu: { enable: true, topic: 'i m u' } } }";
        assert!(matches!(
            AdapterConfig::from_yaml(bad_topic).unwrap().enabled_streams(),
            Err(ConfigError::Topic(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = AdapterConfig::from_file(Path::new("/nonexistent/params.yaml")).unwrap_err();

        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
