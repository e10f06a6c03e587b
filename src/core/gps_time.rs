/// Seconds between the unix epoch and the GPS epoch (1980-01-06)
pub const GPS_TO_UNIX_OFFSET_S: f64 = 315_964_800.0;
pub const SECONDS_PER_WEEK: f64 = 604_800.0;
pub const DEFAULT_LEAP_SECONDS: i32 = 18;

/// Unix time (seconds) of a GPS week / time of week.
///
/// `tow` is allowed to exceed one week (or be negative), the result is
/// linear in it.
pub fn unix_from_week_tow(week: u32, tow: f64, leap_s: i32) -> f64 {
    GPS_TO_UNIX_OFFSET_S + week as f64 * SECONDS_PER_WEEK + tow - leap_s as f64
}

/// GPS seconds since the GPS epoch
pub fn gps_seconds_from_unix(unix: f64, leap_s: i32) -> f64 {
    unix - GPS_TO_UNIX_OFFSET_S + leap_s as f64
}

/// Split GPS seconds since the epoch into (week, time of week)
pub fn week_tow(gps_seconds: f64) -> (u32, f64) {
    let week = (gps_seconds / SECONDS_PER_WEEK).floor();
    let tow = gps_seconds - week * SECONDS_PER_WEEK;

    (week.max(0.0) as u32, tow)
}

pub fn gps_from_unix(unix: f64, leap_s: i32) -> (u32, f64) {
    week_tow(gps_seconds_from_unix(unix, leap_s))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_gps_epoch() {
        assert_eq!(unix_from_week_tow(0, 0.0, 0), GPS_TO_UNIX_OFFSET_S);
        assert_eq!(gps_from_unix(GPS_TO_UNIX_OFFSET_S, 0), (0, 0.0));
    }

    #[test]
    fn test_known_date() {
        // 2024-06-01T12:00:00Z, GPS week 2316, saturday noon
        let unix = 1_717_243_200.0;
        let (week, tow) = gps_from_unix(unix, 18);

        assert_eq!(week, 2316);
        assert_abs_diff_eq!(tow, 6.0 * 86400.0 + 12.0 * 3600.0 + 18.0, epsilon = 1e-6);
        assert_abs_diff_eq!(unix_from_week_tow(week, tow, 18), unix, epsilon = 1e-6);
    }

    #[test]
    fn test_tow_past_week_end() {
        let a = unix_from_week_tow(2000, SECONDS_PER_WEEK + 1.0, 18);
        let b = unix_from_week_tow(2001, 1.0, 18);

        assert_eq!(a, b);
    }
}
