use log::{debug, info};

use crate::core::gps_time::unix_from_week_tow;

/// Weight of a new host-offset measurement before a GPS fix
const LOCAL_OFFSET_GAIN: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq)]
struct GpsTimeRef {
    week: u32,
    tow_offset: f64,
    leap_s: i32,
}

/// Turns device time into bus time.
///
/// Once the GPS receiver has reported a fix, device time maps onto GPS time
/// through the receiver's tow offset. Before that the device boot time is
/// estimated from the host clock and low-pass filtered to ride out
/// transport latency.
#[derive(Debug, Default, Clone)]
pub struct TimeSync {
    gps: Option<GpsTimeRef>,
    local_offset: Option<f64>,
}

impl TimeSync {
    pub fn on_gps_fix(&mut self, week: u32, tow_offset: f64, leap_s: i32) {
        let time_ref = GpsTimeRef {
            week,
            tow_offset,
            leap_s,
        };

        match self.gps {
            None => info!("GPS time acquired (week {week}, tow offset {tow_offset:.6} s)"),
            Some(prev) if prev.week != week => debug!("GPS week rollover to {week}"),
            _ => {}
        }

        self.gps = Some(time_ref);
    }

    pub fn has_gps_time(&self) -> bool {
        self.gps.is_some()
    }

    pub fn leap_seconds(&self) -> Option<i32> {
        self.gps.map(|g| g.leap_s)
    }

    /// Bus time (unix seconds) of a sample taken `time` seconds after boot
    pub fn from_device_time(&mut self, time: f64, host_unix: f64) -> f64 {
        if let Some(gps) = self.gps {
            return unix_from_week_tow(gps.week, time + gps.tow_offset, gps.leap_s);
        }

        let measured = host_unix - time;
        let offset = match self.local_offset {
            None => measured,
            Some(prev) => LOCAL_OFFSET_GAIN * measured + (1.0 - LOCAL_OFFSET_GAIN) * prev,
        };

        self.local_offset = Some(offset);

        offset + time
    }

    pub fn from_week_tow(week: u32, tow: f64, leap_s: i32) -> f64 {
        unix_from_week_tow(week, tow, leap_s)
    }
}
