//! # Streak Evaluation Module
//!
//! Decides whether a habit's completion streak has been broken by
//! inactivity. The decision itself is pure and fully testable; the driver
//! fetches logs from the store, applies resets and stamps the user's
//! last-check time.
//!
//! Evaluation is lazy: it runs opportunistically when a user interacts and
//! their last check is stale, so work scales with active users rather than
//! total habit count.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use tracing::info;

use crate::clock::{local_date, Clock};
use crate::db;
use crate::models::{Habit, HabitLog, LogStatus, User};

/// Outcome of evaluating one habit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakVerdict {
    NotBroken,
    /// The streak must be reset; `prior_streak` is reported to the user
    Broken { prior_streak: i32 },
}

/// Decide whether the habit's streak is broken, given its recent logs
/// (any order; only `completed` entries matter) and the owner's break
/// policy. `best_streak` is never touched by a break.
pub fn evaluate(
    habit: &Habit,
    logs: &[HabitLog],
    break_days: i32,
    today: NaiveDate,
) -> StreakVerdict {
    // Nothing to break
    if habit.current_streak == 0 {
        return StreakVerdict::NotBroken;
    }
    // Auto-breaking disabled for this user
    if break_days == 0 {
        return StreakVerdict::NotBroken;
    }

    let last_completed = logs
        .iter()
        .filter(|log| log.status == LogStatus::Completed)
        .map(|log| log.date)
        .max();

    match last_completed {
        None => StreakVerdict::Broken {
            prior_streak: habit.current_streak,
        },
        Some(date) => {
            let days_since = today.signed_duration_since(date).num_days();
            if days_since >= i64::from(break_days) {
                StreakVerdict::Broken {
                    prior_streak: habit.current_streak,
                }
            } else {
                StreakVerdict::NotBroken
            }
        }
    }
}

/// Whether the user's streaks are due for a lazy re-evaluation
pub fn needs_check(user: &User, now: DateTime<Utc>, cadence_secs: i64) -> bool {
    match user.last_streak_check {
        None => true,
        Some(checked) => now.signed_duration_since(checked).num_seconds() >= cadence_secs,
    }
}

/// Evaluate all of the user's active habits, resetting broken streaks in the
/// store. Returns `(habit, prior_streak)` pairs for notification. The window
/// fetched covers the last `break_days + 1` calendar days.
pub async fn run_user_check(
    pool: &PgPool,
    clock: &dyn Clock,
    user: &User,
) -> Result<Vec<(Habit, i32)>> {
    let now = clock.now_utc();

    if user.streak_break_days == 0 {
        db::touch_streak_check(pool, user.id, now).await?;
        return Ok(Vec::new());
    }

    let today = local_date(now, &user.timezone);
    let window_start = today
        .checked_sub_days(Days::new(user.streak_break_days as u64))
        .unwrap_or(today);

    let habits = db::get_user_habits(pool, user.id, true).await?;
    let mut broken = Vec::new();

    for habit in habits {
        let logs = db::get_logs_since(pool, habit.id, window_start).await?;
        if let StreakVerdict::Broken { prior_streak } =
            evaluate(&habit, &logs, user.streak_break_days, today)
        {
            db::reset_streak(pool, habit.id).await?;
            info!(
                user_id = user.id,
                habit_id = habit.id,
                prior_streak,
                "Streak broken, reset to 0"
            );
            broken.push((habit, prior_streak));
        }
    }

    db::touch_streak_check(pool, user.id, now).await?;
    Ok(broken)
}
