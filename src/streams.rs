use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The sample streams the harness tells apart
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum StreamKind {
    WheelEncoder,
    Pimu,
    Imu,
    Ins,
    Gps,
}

/// Output messages the adapter can be configured to publish
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Imu,
    Pimu,
    OdomInsEnu,
    OdomInsNed,
    PosVel,
    WheelEncoder,
}

impl MessageKind {
    pub fn stream(&self) -> StreamKind {
        match self {
            MessageKind::Imu => StreamKind::Imu,
            MessageKind::Pimu => StreamKind::Pimu,
            MessageKind::OdomInsEnu | MessageKind::OdomInsNed => StreamKind::Ins,
            MessageKind::PosVel => StreamKind::Gps,
            MessageKind::WheelEncoder => StreamKind::WheelEncoder,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(StreamKind::from_str("wheel_encoder"), Ok(StreamKind::WheelEncoder));
        assert_eq!(MessageKind::from_str("odom_ins_enu"), Ok(MessageKind::OdomInsEnu));
        assert_eq!(MessageKind::PosVel.to_string(), "pos_vel");
        assert!(StreamKind::from_str("baro").is_err());
    }

    #[test]
    fn test_every_stream_has_a_message() {
        for stream in StreamKind::iter() {
            assert!(MessageKind::iter().any(|m| m.stream() == stream));
        }
    }
}
