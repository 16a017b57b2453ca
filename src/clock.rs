//! Time source abstraction so that dialogue timeouts, streak evaluation and
//! the reminder tick can all be tested with an injected clock.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use log::warn;

/// Supplies the current UTC instant. The scheduler, timeout monitor and
/// streak evaluator never call `Utc::now()` directly.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolve an IANA zone name, falling back to UTC for anything unknown.
/// The fallback is never surfaced to the user; a bad stored zone simply
/// behaves as UTC until corrected.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Unknown timezone {name:?}, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Convert a UTC instant to the user's local wall-clock date
pub fn local_date(now_utc: DateTime<Utc>, zone_name: &str) -> NaiveDate {
    now_utc.with_timezone(&resolve_timezone(zone_name)).date_naive()
}

/// Convert a UTC instant to the user's local wall-clock time, truncated to
/// the minute for comparison against stored reminder times
pub fn local_hhmm(now_utc: DateTime<Utc>, zone_name: &str) -> NaiveTime {
    let local = now_utc.with_timezone(&resolve_timezone(zone_name)).time();
    NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).unwrap_or(local)
}

/// Build a UTC instant from date/time parts, for tests
pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(resolve_timezone(""), Tz::UTC);
    }

    #[test]
    fn test_known_zone_resolves() {
        assert_eq!(resolve_timezone("Europe/Moscow"), chrono_tz::Europe::Moscow);
    }

    #[test]
    fn test_local_hhmm_conversion() {
        // 06:00 UTC is 09:00 in Moscow (UTC+3, no DST)
        let now = utc(2024, 1, 15, 6, 0);
        assert_eq!(
            local_hhmm(now, "Europe/Moscow"),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 22:00 UTC on the 15th is already the 16th in Tokyo
        let now = utc(2024, 1, 15, 22, 0);
        assert_eq!(
            local_date(now, "Asia/Tokyo"),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_invalid_zone_behaves_as_utc() {
        let now = utc(2024, 1, 15, 6, 0);
        assert_eq!(
            local_hhmm(now, "not-a-zone"),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap()
        );
    }
}
