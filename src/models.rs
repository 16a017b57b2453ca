//! # Domain Models
//!
//! Core data types for habits, completion logs and users. These mirror the
//! rows in the store one-to-one; all derived behavior that the scheduler and
//! streak logic need (frequency matching, completion checks) lives here so it
//! can be tested without a database.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Default emoji assigned when the user skips the emoji step
pub const DEFAULT_EMOJI: &str = "✅";

/// How often a habit is expected to be performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekdays,
    Weekends,
    Weekly,
    /// Weekday bitmask stored in `Habit::custom_days`, bit 0 = Monday
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekdays => "weekdays",
            Frequency::Weekends => "weekends",
            Frequency::Weekly => "weekly",
            Frequency::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Frequency> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekdays" => Some(Frequency::Weekdays),
            "weekends" => Some(Frequency::Weekends),
            "weekly" => Some(Frequency::Weekly),
            "custom" => Some(Frequency::Custom),
            _ => None,
        }
    }
}

/// Status of a single day's log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStatus {
    Completed,
    Skipped,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Completed => "completed",
            LogStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<LogStatus> {
        match s {
            "completed" => Some(LogStatus::Completed),
            "skipped" => Some(LogStatus::Skipped),
            _ => None,
        }
    }
}

/// A habit being tracked for one user
#[derive(Debug, Clone, PartialEq)]
pub struct Habit {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub emoji: String,
    pub frequency: Frequency,
    /// Weekday bitmask for `Frequency::Custom`, bit 0 = Monday
    pub custom_days: Option<u8>,
    /// Local wall-clock time at which to remind, `None` = no reminder
    pub reminder_time: Option<NaiveTime>,
    /// Target completion count for forming the habit
    pub target_days: i32,
    pub current_streak: i32,
    pub best_streak: i32,
    pub total_completions: i32,
    pub is_active: bool,
    pub is_paused: bool,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    /// Whether the frequency rules call for action on the given local date.
    ///
    /// `weekly` habits fire on the weekday the habit was created, so a habit
    /// added on a Wednesday reminds every Wednesday.
    pub fn should_remind_on(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekdays => weekday.num_days_from_monday() < 5,
            Frequency::Weekends => weekday.num_days_from_monday() >= 5,
            Frequency::Weekly => weekday == self.created_at.date_naive().weekday(),
            Frequency::Custom => match self.custom_days {
                Some(mask) => mask & (1 << weekday.num_days_from_monday()) != 0,
                None => true,
            },
        }
    }

    /// Percentage of the target completion count reached, capped at 100
    pub fn progress_percentage(&self) -> f64 {
        if self.target_days == 0 {
            return 0.0;
        }
        (f64::from(self.total_completions) / f64::from(self.target_days) * 100.0).min(100.0)
    }
}

/// One day's outcome for a habit. At most one log exists per
/// `(habit_id, date)`; re-logging a date overwrites the previous status.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitLog {
    pub id: i64,
    pub habit_id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub status: LogStatus,
    pub logged_at: DateTime<Utc>,
}

/// A Telegram user with their scheduling preferences
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    /// IANA zone name; invalid values fall back to UTC at resolution time
    pub timezone: String,
    pub notifications_enabled: bool,
    pub ai_enabled: bool,
    /// Days of silence before a streak is reset; 0 disables auto-breaking
    pub streak_break_days: i32,
    pub last_streak_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A logical intent to notify, produced by the scheduler tick.
/// Never persisted; the exact-minute tick guarantees a `(habit_id, fire_date)`
/// pair is produced at most once per day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderJob {
    pub habit_id: i64,
    pub user_id: i64,
    pub fire_date: NaiveDate,
}

/// Convenience for tests and the weekly rule
pub fn weekday_bit(weekday: Weekday) -> u8 {
    1 << weekday.num_days_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn habit_with(frequency: Frequency, custom_days: Option<u8>, created: NaiveDate) -> Habit {
        Habit {
            id: 1,
            user_id: 10,
            name: "Morning run".to_string(),
            description: None,
            emoji: DEFAULT_EMOJI.to_string(),
            frequency,
            custom_days,
            reminder_time: None,
            target_days: 21,
            current_streak: 0,
            best_streak: 0,
            total_completions: 0,
            is_active: true,
            is_paused: false,
            created_at: Utc
                .from_utc_datetime(&created.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_daily_reminds_every_day() {
        let habit = habit_with(Frequency::Daily, None, date(2024, 1, 1));
        for offset in 0..7 {
            assert!(habit.should_remind_on(date(2024, 1, 1) + chrono::Days::new(offset)));
        }
    }

    #[test]
    fn test_weekdays_skip_weekend() {
        let habit = habit_with(Frequency::Weekdays, None, date(2024, 1, 1));
        assert!(habit.should_remind_on(date(2024, 1, 5))); // Friday
        assert!(!habit.should_remind_on(date(2024, 1, 6))); // Saturday
        assert!(!habit.should_remind_on(date(2024, 1, 7))); // Sunday
        assert!(habit.should_remind_on(date(2024, 1, 8))); // Monday
    }

    #[test]
    fn test_weekends_only() {
        let habit = habit_with(Frequency::Weekends, None, date(2024, 1, 1));
        assert!(!habit.should_remind_on(date(2024, 1, 5)));
        assert!(habit.should_remind_on(date(2024, 1, 6)));
        assert!(habit.should_remind_on(date(2024, 1, 7)));
    }

    #[test]
    fn test_weekly_fires_on_creation_weekday() {
        // Created on a Wednesday
        let habit = habit_with(Frequency::Weekly, None, date(2024, 1, 3));
        assert!(habit.should_remind_on(date(2024, 1, 10))); // next Wednesday
        assert!(!habit.should_remind_on(date(2024, 1, 8))); // Monday
        assert!(!habit.should_remind_on(date(2024, 1, 11))); // Thursday
    }

    #[test]
    fn test_custom_bitmask() {
        // Monday + Thursday
        let mask = weekday_bit(Weekday::Mon) | weekday_bit(Weekday::Thu);
        let habit = habit_with(Frequency::Custom, Some(mask), date(2024, 1, 1));
        assert!(habit.should_remind_on(date(2024, 1, 8))); // Monday
        assert!(habit.should_remind_on(date(2024, 1, 11))); // Thursday
        assert!(!habit.should_remind_on(date(2024, 1, 9))); // Tuesday
    }

    #[test]
    fn test_frequency_round_trip() {
        for freq in [
            Frequency::Daily,
            Frequency::Weekdays,
            Frequency::Weekends,
            Frequency::Weekly,
            Frequency::Custom,
        ] {
            assert_eq!(Frequency::parse(freq.as_str()), Some(freq));
        }
        assert_eq!(Frequency::parse("fortnightly"), None);
    }

    #[test]
    fn test_progress_percentage_caps_at_hundred() {
        let mut habit = habit_with(Frequency::Daily, None, date(2024, 1, 1));
        habit.total_completions = 30;
        habit.target_days = 21;
        assert_eq!(habit.progress_percentage(), 100.0);
        habit.total_completions = 7;
        assert!((habit.progress_percentage() - 33.33).abs() < 0.01);
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}
