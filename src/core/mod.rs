pub mod gps_time;
pub mod time;
