//! MJD to Unix time conversion
//!
//! Instrument reference times are Modified Julian Day numbers; the index
//! stores Unix seconds. MJD day 0 is 1858-11-17T00:00:00Z and MJD 40587 is
//! the Unix epoch.

/// MJD day number of 1970-01-01T00:00:00Z.
pub const UNIX_EPOCH_MJD: i64 = 40587;

/// Seconds in one day; MJD has no leap seconds.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Convert a fractional MJD to Unix seconds.
pub fn mjd_to_unix(mjd: f64) -> f64 {
    (mjd - UNIX_EPOCH_MJD as f64) * SECONDS_PER_DAY
}

/// Convert a whole MJD day number to Unix seconds.
pub fn mjd_day_to_unix(imjd: i64) -> f64 {
    ((imjd - UNIX_EPOCH_MJD) as f64) * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjd_zero_is_1858_epoch() {
        // 1858-11-17T00:00:00Z expressed in Unix seconds
        assert_eq!(mjd_to_unix(0.0), -3_506_716_800.0);
        assert_eq!(mjd_day_to_unix(0), -3_506_716_800.0);
    }

    #[test]
    fn test_known_reference_pair() {
        // MJD 58849.0 == 2020-01-01T00:00:00Z
        assert_eq!(mjd_to_unix(58849.0), 1_577_836_800.0);
        let dt = chrono::DateTime::from_timestamp(1_577_836_800, 0).unwrap();
        assert_eq!(dt.to_rfc3339(), "2020-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_unix_epoch_day() {
        assert_eq!(mjd_day_to_unix(UNIX_EPOCH_MJD), 0.0);
    }

    #[test]
    fn test_fractional_days() {
        assert_eq!(mjd_to_unix(40587.5), 43_200.0);
    }
}
