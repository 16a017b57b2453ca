//! # Reminder Scheduler Module
//!
//! A per-minute tick that selects habits whose reminder time, converted to
//! the owner's local zone, matches the current minute exactly. The selection
//! is pure; the driver loop loads candidates from the store, renders the
//! message (AI text with a template fallback) and hands delivery to the bot.
//!
//! A missed tick means that day's reminder is skipped, not redelivered:
//! only an exact `HH:MM` match fires, so there is no catch-up after
//! downtime and no duplicate delivery within a day.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use teloxide::prelude::*;
use tracing::{debug, error, info};

use crate::ai::{reminder_fallback, AiClient};
use crate::bot::ui_builder::reminder_keyboard;
use crate::clock::{local_date, local_hhmm, Clock};
use crate::config::REMINDER_TICK_SECS;
use crate::db;
use crate::models::{Habit, ReminderJob, User};

/// Decide whether this habit is due at this instant, ignoring completion
/// state: the habit must be active and unpaused, the owner reachable, the
/// local wall-clock minute must equal the reminder time exactly, and the
/// frequency rules must select the local date.
pub fn match_reminder(habit: &Habit, user: &User, now_utc: DateTime<Utc>) -> Option<ReminderJob> {
    if !habit.is_active || habit.is_paused || !user.notifications_enabled {
        return None;
    }
    let reminder_time = habit.reminder_time?;
    let fire_date = local_date(now_utc, &user.timezone);
    if local_hhmm(now_utc, &user.timezone) != reminder_time {
        return None;
    }
    if !habit.should_remind_on(fire_date) {
        return None;
    }
    Some(ReminderJob {
        habit_id: habit.id,
        user_id: user.id,
        fire_date,
    })
}

/// Full selection for one tick: everything `match_reminder` checks, plus
/// the skip for habits already completed on their local current date.
/// Emits at most one job per habit.
pub fn due_reminders(
    candidates: &[(Habit, User)],
    completed: &HashSet<(i64, NaiveDate)>,
    now_utc: DateTime<Utc>,
) -> Vec<ReminderJob> {
    candidates
        .iter()
        .filter_map(|(habit, user)| match_reminder(habit, user, now_utc))
        .filter(|job| !completed.contains(&(job.habit_id, job.fire_date)))
        .collect()
}

/// One scheduler pass. Failures on a single habit are logged and do not
/// abort the remaining deliveries.
pub async fn tick(bot: &Bot, pool: &PgPool, ai: &AiClient, now_utc: DateTime<Utc>) {
    let candidates = match db::reminder_candidates(pool).await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "Failed to load reminder candidates");
            return;
        }
    };

    for (habit, user) in &candidates {
        let Some(job) = match_reminder(habit, user, now_utc) else {
            continue;
        };
        match db::is_completed_on(pool, job.habit_id, job.fire_date).await {
            Ok(true) => {
                debug!(habit_id = habit.id, "Already completed today, skipping reminder");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!(habit_id = habit.id, error = %e, "Completion lookup failed, skipping");
                continue;
            }
        }

        let text = render_reminder(ai, user, habit).await;
        match bot
            .send_message(ChatId(job.user_id), text)
            .reply_markup(reminder_keyboard(habit.id))
            .await
        {
            Ok(_) => {
                debug!(user_id = user.id, habit_id = habit.id, "Reminder sent");
            }
            Err(e) => {
                error!(user_id = user.id, habit_id = habit.id, error = %e, "Failed to send reminder");
            }
        }
    }
}

/// Personalised text when the user has AI enabled, deterministic template
/// otherwise or on any AI failure
async fn render_reminder(ai: &AiClient, user: &User, habit: &Habit) -> String {
    if user.ai_enabled {
        if let Some(text) = ai.personalized_reminder(user, habit).await {
            return text;
        }
    }
    reminder_fallback(habit)
}

/// Minute-tick driver; runs for the lifetime of the process
pub async fn run(bot: Bot, pool: PgPool, ai: Arc<AiClient>, clock: Arc<dyn Clock>) {
    info!("Reminder scheduler started");
    let mut interval = tokio::time::interval(Duration::from_secs(REMINDER_TICK_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        tick(&bot, &pool, &ai, clock.now_utc()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::utc;
    use crate::models::{Frequency, DEFAULT_EMOJI};
    use chrono::NaiveTime;

    fn habit(reminder: &str) -> Habit {
        Habit {
            id: 1,
            user_id: 10,
            name: "Stretch".to_string(),
            description: None,
            emoji: DEFAULT_EMOJI.to_string(),
            frequency: Frequency::Daily,
            custom_days: None,
            reminder_time: NaiveTime::parse_from_str(reminder, "%H:%M").ok(),
            target_days: 21,
            current_streak: 2,
            best_streak: 4,
            total_completions: 6,
            is_active: true,
            is_paused: false,
            created_at: utc(2024, 1, 1, 8, 0),
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
            created_at: utc(2024, 1, 1, 0, 0),
        }
    }

    #[test]
    fn test_fires_only_on_exact_utc_minute() {
        // 09:00 local in Moscow (UTC+3) is 06:00 UTC
        let habit = habit("09:00");
        let user = user("Europe/Moscow");
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 6, 0)).is_some());
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 5, 59)).is_none());
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 6, 1)).is_none());
    }

    #[test]
    fn test_invalid_zone_falls_back_to_utc() {
        let habit = habit("09:00");
        let user = user("Atlantis/Lost");
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 9, 0)).is_some());
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 6, 0)).is_none());
    }

    #[test]
    fn test_respects_frequency_rules() {
        let mut habit = habit("09:00");
        habit.frequency = Frequency::Weekdays;
        let user = user("UTC");
        // 2024-01-13 is a Saturday
        assert!(match_reminder(&habit, &user, utc(2024, 1, 13, 9, 0)).is_none());
        assert!(match_reminder(&habit, &user, utc(2024, 1, 15, 9, 0)).is_some());
    }

    #[test]
    fn test_inactive_paused_or_muted_never_fire() {
        let user_ok = user("UTC");
        let now = utc(2024, 1, 15, 9, 0);

        let mut inactive = habit("09:00");
        inactive.is_active = false;
        assert!(match_reminder(&inactive, &user_ok, now).is_none());

        let mut paused = habit("09:00");
        paused.is_paused = true;
        assert!(match_reminder(&paused, &user_ok, now).is_none());

        let mut muted = user("UTC");
        muted.notifications_enabled = false;
        assert!(match_reminder(&habit("09:00"), &muted, now).is_none());
    }

    #[test]
    fn test_no_reminder_time_never_fires() {
        let mut habit = habit("09:00");
        habit.reminder_time = None;
        assert!(match_reminder(&habit, &user("UTC"), utc(2024, 1, 15, 9, 0)).is_none());
    }

    #[test]
    fn test_completed_today_is_skipped() {
        let habit = habit("09:00");
        let user = user("UTC");
        let now = utc(2024, 1, 15, 9, 0);
        let fire_date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let candidates = vec![(habit, user)];
        let mut completed = HashSet::new();
        assert_eq!(due_reminders(&candidates, &completed, now).len(), 1);

        completed.insert((1, fire_date));
        assert!(due_reminders(&candidates, &completed, now).is_empty());
    }

    #[test]
    fn test_fire_date_is_local_date() {
        // 00:30 in Tokyo (UTC+9) is 15:30 UTC of the previous calendar day
        let habit = habit("00:30");
        let user = user("Asia/Tokyo");
        let job = match_reminder(&habit, &user, utc(2024, 1, 15, 15, 30)).unwrap();
        assert_eq!(job.fire_date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }
}
