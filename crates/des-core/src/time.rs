//! Virtual time: base-unit conversion and epoch-millis datetime arithmetic.
//!
//! Simulated time is tracked internally in minutes (`spec.md` §4.2); external
//! durations and the termination formula are expressed in the config's
//! `base_time_unit`. Wall-clock timestamps attached to persisted rows are
//! computed as `simulation_start + minutes(sim_time)` using pure integer
//! epoch-millisecond arithmetic rather than OS date APIs, so a run whose
//! `start_date` predates the platform epoch never panics (`spec.md` §4.8,
//! §7).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Re-exported from `des-domain` so config-layer code and engine code share
/// one definition; `des-core` depends on `des-domain`, never the reverse.
pub use des_domain::BaseTimeUnit;

/// A point in simulated wall-clock time, stored as milliseconds since the
/// Unix epoch. Arithmetic never touches `SystemTime`/OS calendar APIs, so
/// pre-1970 `start_date`s (common in historical-replay configs) are safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimDateTime {
    pub epoch_millis: i64,
}

impl SimDateTime {
    pub fn from_naive(dt: NaiveDateTime) -> Self {
        SimDateTime {
            epoch_millis: dt.and_utc().timestamp_millis(),
        }
    }

    /// `start + minutes(sim_time)`, per `spec.md` §4.8.
    pub fn plus_minutes(self, minutes: f64) -> Self {
        let delta_millis = (minutes * 60_000.0).round() as i64;
        SimDateTime {
            epoch_millis: self.epoch_millis + delta_millis,
        }
    }

    /// ISO-8601 text. Falls back to a pure proleptic-Gregorian calculation
    /// when `chrono` can't represent the instant as a calendar datetime,
    /// which is the only failure mode the spec anticipates (§7: "Platform
    /// date anomalies... never fatal").
    pub fn to_iso8601(self) -> String {
        match chrono::DateTime::from_timestamp_millis(self.epoch_millis) {
            Some(dt) => dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            None => format_epoch_millis_manually(self.epoch_millis),
        }
    }
}

/// Proleptic-Gregorian civil-from-days conversion (Howard Hinnant's
/// algorithm), used only when `chrono`'s own range is exceeded. Pure integer
/// arithmetic, no OS calendar calls.
fn format_epoch_millis_manually(epoch_millis: i64) -> String {
    let millis_per_day = 86_400_000i64;
    let mut days = epoch_millis.div_euclid(millis_per_day);
    let mut rem_millis = epoch_millis.rem_euclid(millis_per_day);
    let millis = rem_millis % 1000;
    rem_millis /= 1000;
    let secs = rem_millis % 60;
    rem_millis /= 60;
    let mins = rem_millis % 60;
    rem_millis /= 60;
    let hours = rem_millis;

    days += 719_468; // shift epoch from 1970-01-01 to 0000-03-01
    let era = if days >= 0 { days } else { days - 146_096 } / 146_097;
    let doe = (days - era * 146_097) as i64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365; // [0, 399]
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 }; // [1, 12]
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
        y, m, d, hours, mins, secs, millis
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_unit_round_trips_through_minutes() {
        assert_eq!(BaseTimeUnit::Hours.to_minutes(2.0), 120.0);
        assert_eq!(BaseTimeUnit::Days.to_minutes(1.0), 1440.0);
        assert_eq!(BaseTimeUnit::Seconds.to_minutes(60.0), 1.0);
    }

    #[test]
    fn plus_minutes_advances_wall_clock() {
        let start = SimDateTime::from_naive(
            chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let later = start.plus_minutes(90.0);
        assert_eq!(later.to_iso8601(), "2026-01-01T01:30:00.000");
    }

    #[test]
    fn pre_epoch_datetime_does_not_panic() {
        let start = SimDateTime::from_naive(
            chrono::NaiveDate::from_ymd_opt(1950, 6, 15)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        let iso = start.to_iso8601();
        assert!(iso.starts_with("1950-06-15"));
    }

    #[test]
    fn manual_fallback_matches_chrono_for_a_known_date() {
        let epoch_millis = 1_700_000_000_000i64;
        let manual = format_epoch_millis_manually(epoch_millis);
        let viachrono = chrono::DateTime::from_timestamp_millis(epoch_millis)
            .unwrap()
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S%.3f")
            .to_string();
        assert_eq!(manual, viachrono);
    }
}
