//! Inactivity enforcement for dialogue sessions. Runs before any event
//! reaches the state machine; expired sessions are cleared and the
//! triggering event is dropped, not retried.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::DialogueConfig;
use crate::session::DialogSession;

/// Result of a staleness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAge {
    /// Within the window (or brand new); the event proceeds
    Fresh,
    /// Past the window; the session must be cleared and the user told once
    Expired,
}

/// Enforces the configured inactivity window (default 10 minutes)
#[derive(Debug, Clone)]
pub struct TimeoutMonitor {
    window: Duration,
}

impl TimeoutMonitor {
    pub fn new(config: &DialogueConfig) -> Self {
        Self {
            window: config.timeout,
        }
    }

    pub fn with_window(window: Duration) -> Self {
        Self { window }
    }

    /// Classify the session. A session that has never recorded activity is
    /// never considered expired. The caller refreshes `last_activity` on
    /// `Fresh` and clears the session on `Expired`.
    pub fn check(&self, session: &DialogSession, now: DateTime<Utc>) -> SessionAge {
        let Some(last_activity) = session.last_activity else {
            return SessionAge::Fresh;
        };
        let idle = now.signed_duration_since(last_activity);
        match idle.to_std() {
            Ok(idle) if idle > self.window => SessionAge::Expired,
            // Negative idle means a clock skew; treat as fresh
            _ => SessionAge::Fresh,
        }
    }

    pub fn window_minutes(&self) -> u64 {
        self.window.as_secs() / 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monitor() -> TimeoutMonitor {
        TimeoutMonitor::with_window(Duration::from_secs(600))
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_brand_new_session_never_expires() {
        let session = DialogSession::new(1, at(0));
        assert_eq!(monitor().check(&session, at(59)), SessionAge::Fresh);
    }

    #[test]
    fn test_within_window_is_fresh() {
        let mut session = DialogSession::new(1, at(0));
        session.touch(at(0));
        assert_eq!(monitor().check(&session, at(9)), SessionAge::Fresh);
    }

    #[test]
    fn test_past_window_is_expired() {
        let mut session = DialogSession::new(1, at(0));
        session.touch(at(0));
        assert_eq!(monitor().check(&session, at(11)), SessionAge::Expired);
    }

    #[test]
    fn test_exact_boundary_is_fresh() {
        // Idle for exactly the window does not expire; only strictly past it
        let mut session = DialogSession::new(1, at(0));
        session.touch(at(0));
        assert_eq!(monitor().check(&session, at(10)), SessionAge::Fresh);
    }
}
