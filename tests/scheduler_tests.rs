use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use habitmax::clock::utc;
use habitmax::models::{weekday_bit, Frequency, Habit, ReminderJob, User, DEFAULT_EMOJI};
use habitmax::scheduler::{due_reminders, match_reminder};

fn habit(id: i64, reminder: &str, frequency: Frequency) -> Habit {
    Habit {
        id,
        user_id: 10,
        name: "Journal".to_string(),
        description: None,
        emoji: DEFAULT_EMOJI.to_string(),
        frequency,
        custom_days: None,
        reminder_time: NaiveTime::parse_from_str(reminder, "%H:%M").ok(),
        target_days: 21,
        current_streak: 1,
        best_streak: 1,
        total_completions: 1,
        is_active: true,
        is_paused: false,
        // 2024-01-01 is a Monday
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
    }
}

fn user(timezone: &str) -> User {
    User {
        id: 10,
        username: None,
        first_name: "Sam".to_string(),
        timezone: timezone.to_string(),
        notifications_enabled: true,
        ai_enabled: false,
        streak_break_days: 2,
        last_streak_check: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// A daily habit at 09:00 in UTC+3 fires only when UTC reads 06:00 exactly
#[test]
fn test_reminder_exactness_across_timezones() {
    let habit = habit(1, "09:00", Frequency::Daily);
    let owner = user("Europe/Moscow");

    assert_eq!(
        match_reminder(&habit, &owner, utc(2024, 1, 15, 6, 0)),
        Some(ReminderJob {
            habit_id: 1,
            user_id: 10,
            fire_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        })
    );
    assert_eq!(match_reminder(&habit, &owner, utc(2024, 1, 15, 5, 59)), None);
    assert_eq!(match_reminder(&habit, &owner, utc(2024, 1, 15, 6, 1)), None);
}

/// No ReminderJob is emitted for a habit already completed on the local
/// current date, even when the minute matches
#[test]
fn test_skip_when_already_completed() {
    let candidates = vec![(habit(1, "09:00", Frequency::Daily), user("UTC"))];
    let now = utc(2024, 1, 15, 9, 0);

    let no_completions = HashSet::new();
    assert_eq!(due_reminders(&candidates, &no_completions, now).len(), 1);

    let mut completed = HashSet::new();
    completed.insert((1, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    assert!(due_reminders(&candidates, &completed, now).is_empty());
}

/// Frequency rules select the day: weekdays skip Saturday, weekends skip
/// Monday, weekly fires on the creation weekday only
#[test]
fn test_frequency_day_selection() {
    let owner = user("UTC");
    // 2024-01-13 Saturday, 2024-01-15 Monday
    let saturday = utc(2024, 1, 13, 9, 0);
    let monday = utc(2024, 1, 15, 9, 0);

    let weekday_habit = habit(1, "09:00", Frequency::Weekdays);
    assert!(match_reminder(&weekday_habit, &owner, saturday).is_none());
    assert!(match_reminder(&weekday_habit, &owner, monday).is_some());

    let weekend_habit = habit(2, "09:00", Frequency::Weekends);
    assert!(match_reminder(&weekend_habit, &owner, saturday).is_some());
    assert!(match_reminder(&weekend_habit, &owner, monday).is_none());

    // Created on a Monday, so weekly fires Mondays
    let weekly_habit = habit(3, "09:00", Frequency::Weekly);
    assert!(match_reminder(&weekly_habit, &owner, monday).is_some());
    assert!(match_reminder(&weekly_habit, &owner, saturday).is_none());
}

/// Custom frequency follows the stored weekday bitmask
#[test]
fn test_custom_bitmask_selection() {
    let owner = user("UTC");
    let mut custom = habit(4, "09:00", Frequency::Custom);
    custom.custom_days = Some(weekday_bit(Weekday::Sat));

    assert!(match_reminder(&custom, &owner, utc(2024, 1, 13, 9, 0)).is_some());
    assert!(match_reminder(&custom, &owner, utc(2024, 1, 15, 9, 0)).is_none());
}

/// Paused habits and muted users drop out of selection entirely
#[test]
fn test_paused_and_muted_are_excluded() {
    let now = utc(2024, 1, 15, 9, 0);

    let mut paused = habit(1, "09:00", Frequency::Daily);
    paused.is_paused = true;
    assert!(match_reminder(&paused, &user("UTC"), now).is_none());

    let mut muted = user("UTC");
    muted.notifications_enabled = false;
    assert!(match_reminder(&habit(2, "09:00", Frequency::Daily), &muted, now).is_none());
}

/// An unknown stored timezone behaves as UTC instead of failing
#[test]
fn test_unknown_timezone_falls_back_to_utc() {
    let habit = habit(1, "09:00", Frequency::Daily);
    let owner = user("Not/AZone");
    assert!(match_reminder(&habit, &owner, utc(2024, 1, 15, 9, 0)).is_some());
}

/// The emitted job carries the user's local calendar date, which can differ
/// from the UTC date around midnight
#[test]
fn test_fire_date_uses_local_calendar() {
    // 00:30 in Tokyo (UTC+9) corresponds to 15:30 UTC the day before
    let habit = habit(1, "00:30", Frequency::Daily);
    let owner = user("Asia/Tokyo");
    let job = match_reminder(&habit, &owner, utc(2024, 1, 15, 15, 30)).unwrap();
    assert_eq!(job.fire_date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
}

/// One tick emits at most one job per habit
#[test]
fn test_at_most_one_job_per_habit() {
    let candidates = vec![
        (habit(1, "09:00", Frequency::Daily), user("UTC")),
        (habit(2, "09:00", Frequency::Daily), user("UTC")),
        (habit(3, "10:00", Frequency::Daily), user("UTC")),
    ];
    let jobs = due_reminders(&candidates, &HashSet::new(), utc(2024, 1, 15, 9, 0));
    assert_eq!(jobs.len(), 2);
    let ids: Vec<i64> = jobs.iter().map(|job| job.habit_id).collect();
    assert_eq!(ids, vec![1, 2]);
}
