//! Built-in adapter configurations used by the scenarios.

/// Only the preintegrated IMU stream is enabled
pub const BASIC_CONFIG: &str = r#"topic: "inertialsense"
port: [/dev/ttyACM0, /dev/ttyACM1, /dev/ttyACM2]
baudrate: 921600

ins:
  navigation_dt_ms: 16                          # EKF update period.  uINS-3: 4  default, 1 max.

sensors:
  messages:
    pimu:             # Publish preintegrated IMU delta theta and delta velocity
      topic: "pimu"
      enable: true
      period: 1
"#;

/// INS odometry, IMU, PIMU and GPS position/velocity enabled
pub const TIME_SYNC_CONFIG: &str = r#"topic: "inertialsense"
port: [/dev/ttyACM0, /dev/ttyACM1, /dev/ttyACM2]
baudrate: 921600

ins:
  navigation_dt_ms: 16
  messages:
    odom_ins_enu:
      topic: "odom_ins_enu"
      enable: true

sensors:
  messages:
    imu:
      topic: "imu"
      enable: true
      period: 1
    pimu:
      topic: "pimu"
      enable: true
      period: 1

gps1:
  type: 'F9P'
  gpsTimeUserDelay: 0.0
  messages:
    pos_vel:
      topic: "gps1/pos_vel"
      enable: true
      period: 1
"#;
