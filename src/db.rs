//! # Habit Store Module
//!
//! Persistence collaborator over Postgres. All functions operate on a
//! shared `PgPool` and are atomic at the single-row level; the one
//! exception is [`log_habit`], which wraps the log upsert and the streak
//! counter update in a transaction so the counters stay consistent with
//! the authoritative per-date log row.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::models::{Frequency, Habit, HabitLog, LogStatus, User};
use crate::session::NewHabit;

/// Aggregated progress numbers for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
    pub total_habits: i64,
    pub active_habits: i64,
    pub total_completions: i64,
    pub best_streak: i32,
}

/// Initialize the database schema
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGINT PRIMARY KEY,
            username VARCHAR(32),
            first_name VARCHAR(64) NOT NULL,
            timezone VARCHAR(50) NOT NULL DEFAULT 'UTC',
            notifications_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            ai_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            streak_break_days INTEGER NOT NULL DEFAULT 2,
            last_streak_check TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS habits (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name VARCHAR(100) NOT NULL,
            description TEXT,
            emoji VARCHAR(10) NOT NULL DEFAULT '✅',
            frequency VARCHAR(20) NOT NULL DEFAULT 'daily',
            custom_days SMALLINT,
            reminder_time TIME,
            target_days INTEGER NOT NULL DEFAULT 21,
            current_streak INTEGER NOT NULL DEFAULT 0,
            best_streak INTEGER NOT NULL DEFAULT 0,
            total_completions INTEGER NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            is_paused BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create habits table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id)")
        .execute(pool)
        .await
        .context("Failed to create habits index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS habit_logs (
            id BIGSERIAL PRIMARY KEY,
            habit_id BIGINT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            completed_date DATE NOT NULL,
            status VARCHAR(20) NOT NULL DEFAULT 'completed',
            logged_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (habit_id, completed_date)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create habit_logs table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_habit_logs_habit_date
         ON habit_logs(habit_id, completed_date DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create habit_logs index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        timezone: row.try_get("timezone")?,
        notifications_enabled: row.try_get("notifications_enabled")?,
        ai_enabled: row.try_get("ai_enabled")?,
        streak_break_days: row.try_get("streak_break_days")?,
        last_streak_check: row.try_get("last_streak_check")?,
        created_at: row.try_get("created_at")?,
    })
}

fn habit_from_row(row: &PgRow) -> Result<Habit> {
    let frequency: String = row.try_get("frequency")?;
    let custom_days: Option<i16> = row.try_get("custom_days")?;
    Ok(Habit {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        emoji: row.try_get("emoji")?,
        frequency: Frequency::parse(&frequency)
            .ok_or_else(|| anyhow!("Unknown frequency value: {frequency}"))?,
        custom_days: custom_days.map(|v| v as u8),
        reminder_time: row.try_get("reminder_time")?,
        target_days: row.try_get("target_days")?,
        current_streak: row.try_get("current_streak")?,
        best_streak: row.try_get("best_streak")?,
        total_completions: row.try_get("total_completions")?,
        is_active: row.try_get("is_active")?,
        is_paused: row.try_get("is_paused")?,
        created_at: row.try_get("created_at")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<HabitLog> {
    let status: String = row.try_get("status")?;
    Ok(HabitLog {
        id: row.try_get("id")?,
        habit_id: row.try_get("habit_id")?,
        user_id: row.try_get("user_id")?,
        date: row.try_get("completed_date")?,
        status: LogStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown log status: {status}"))?,
        logged_at: row.try_get("logged_at")?,
    })
}

// ==================== User repository ====================

/// Fetch the user, creating the row on first contact. The profile fields
/// are refreshed on every call so Telegram renames propagate.
pub async fn get_or_create_user(
    pool: &PgPool,
    user_id: i64,
    username: Option<&str>,
    first_name: &str,
    default_break_days: i32,
) -> Result<User> {
    let row = sqlx::query(
        "INSERT INTO users (id, username, first_name, streak_break_days)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET username = $2, first_name = $3
         RETURNING *",
    )
    .bind(user_id)
    .bind(username)
    .bind(first_name)
    .bind(default_break_days)
    .fetch_one(pool)
    .await
    .context("Failed to upsert user")?;
    user_from_row(&row)
}

pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read user")?;
    row.as_ref().map(user_from_row).transpose()
}

pub async fn set_ai_enabled(pool: &PgPool, user_id: i64, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE users SET ai_enabled = $2 WHERE id = $1")
        .bind(user_id)
        .bind(enabled)
        .execute(pool)
        .await
        .context("Failed to update AI flag")?;
    Ok(())
}

pub async fn set_notifications_enabled(pool: &PgPool, user_id: i64, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE users SET notifications_enabled = $2 WHERE id = $1")
        .bind(user_id)
        .bind(enabled)
        .execute(pool)
        .await
        .context("Failed to update notifications flag")?;
    Ok(())
}

/// Store a new IANA zone name. Callers validate the name; an invalid value
/// would silently behave as UTC at resolution time.
pub async fn set_timezone(pool: &PgPool, user_id: i64, timezone: &str) -> Result<()> {
    info!("Setting timezone for user {user_id} to {timezone}");
    sqlx::query("UPDATE users SET timezone = $2 WHERE id = $1")
        .bind(user_id)
        .bind(timezone)
        .execute(pool)
        .await
        .context("Failed to update timezone")?;
    Ok(())
}

/// Stamp the user's last lazy streak evaluation
pub async fn touch_streak_check(pool: &PgPool, user_id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_streak_check = $2 WHERE id = $1")
        .bind(user_id)
        .bind(at)
        .execute(pool)
        .await
        .context("Failed to stamp streak check")?;
    Ok(())
}

// ==================== Habit repository ====================

/// Persist a committed dialogue draft as a new habit
pub async fn create_habit(pool: &PgPool, user_id: i64, habit: &NewHabit) -> Result<Habit> {
    info!("Creating habit for user {user_id}");
    let row = sqlx::query(
        "INSERT INTO habits (user_id, name, description, emoji, frequency, reminder_time)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(user_id)
    .bind(&habit.name)
    .bind(&habit.description)
    .bind(&habit.emoji)
    .bind(habit.frequency.as_str())
    .bind(habit.reminder_time)
    .fetch_one(pool)
    .await
    .context("Failed to insert habit")?;
    habit_from_row(&row)
}

pub async fn get_habit(pool: &PgPool, habit_id: i64, user_id: i64) -> Result<Option<Habit>> {
    let row = sqlx::query("SELECT * FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read habit")?;
    row.as_ref().map(habit_from_row).transpose()
}

pub async fn get_user_habits(
    pool: &PgPool,
    user_id: i64,
    active_only: bool,
) -> Result<Vec<Habit>> {
    let rows = sqlx::query(
        "SELECT * FROM habits
         WHERE user_id = $1 AND ($2 = FALSE OR is_active)
         ORDER BY created_at",
    )
    .bind(user_id)
    .bind(active_only)
    .fetch_all(pool)
    .await
    .context("Failed to list habits")?;
    rows.iter().map(habit_from_row).collect()
}

pub async fn set_habit_paused(
    pool: &PgPool,
    habit_id: i64,
    user_id: i64,
    paused: bool,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE habits SET is_paused = $3 WHERE id = $1 AND user_id = $2 AND is_active",
    )
    .bind(habit_id)
    .bind(user_id)
    .bind(paused)
    .execute(pool)
    .await
    .context("Failed to update pause flag")?;
    Ok(result.rows_affected() > 0)
}

/// Soft delete; logs are kept for history
pub async fn deactivate_habit(pool: &PgPool, habit_id: i64, user_id: i64) -> Result<bool> {
    info!("Deactivating habit {habit_id} for user {user_id}");
    let result = sqlx::query(
        "UPDATE habits SET is_active = FALSE WHERE id = $1 AND user_id = $2",
    )
    .bind(habit_id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("Failed to deactivate habit")?;
    Ok(result.rows_affected() > 0)
}

/// Reset a broken streak to zero. `best_streak` is deliberately untouched.
pub async fn reset_streak(pool: &PgPool, habit_id: i64) -> Result<()> {
    sqlx::query("UPDATE habits SET current_streak = 0 WHERE id = $1")
        .bind(habit_id)
        .execute(pool)
        .await
        .context("Failed to reset streak")?;
    Ok(())
}

// ==================== Log repository ====================

/// Record the day's outcome for a habit. A date has one authoritative
/// status: re-logging overwrites. Counters move only when the status
/// actually changes, so repeating the same tap is harmless:
/// newly `completed` bumps the streak (and the best-streak high-water
/// mark); `skipped` zeroes the current streak.
pub async fn log_habit(
    pool: &PgPool,
    habit_id: i64,
    user_id: i64,
    date: NaiveDate,
    status: LogStatus,
) -> Result<Habit> {
    let mut tx = pool.begin().await.context("Failed to begin log transaction")?;

    let prior: Option<String> = sqlx::query_scalar(
        "SELECT status FROM habit_logs WHERE habit_id = $1 AND completed_date = $2",
    )
    .bind(habit_id)
    .bind(date)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to read prior log")?;
    let prior = prior.as_deref().and_then(LogStatus::parse);

    sqlx::query(
        "INSERT INTO habit_logs (habit_id, user_id, completed_date, status)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (habit_id, completed_date)
         DO UPDATE SET status = EXCLUDED.status, logged_at = NOW()",
    )
    .bind(habit_id)
    .bind(user_id)
    .bind(date)
    .bind(status.as_str())
    .execute(&mut *tx)
    .await
    .context("Failed to upsert log")?;

    let row = match (prior, status) {
        // Same status repeated: counters unchanged
        (Some(prior), status) if prior == status => {
            sqlx::query("SELECT * FROM habits WHERE id = $1")
                .bind(habit_id)
                .fetch_one(&mut *tx)
                .await
        }
        (_, LogStatus::Completed) => {
            sqlx::query(
                "UPDATE habits
                 SET current_streak = current_streak + 1,
                     total_completions = total_completions + 1,
                     best_streak = GREATEST(best_streak, current_streak + 1)
                 WHERE id = $1
                 RETURNING *",
            )
            .bind(habit_id)
            .fetch_one(&mut *tx)
            .await
        }
        (_, LogStatus::Skipped) => {
            sqlx::query(
                "UPDATE habits SET current_streak = 0 WHERE id = $1 RETURNING *",
            )
            .bind(habit_id)
            .fetch_one(&mut *tx)
            .await
        }
    }
    .context("Failed to update habit counters")?;

    let habit = habit_from_row(&row)?;
    tx.commit().await.context("Failed to commit log transaction")?;
    info!(
        "Logged {} for habit {habit_id} on {date} (streak {})",
        status.as_str(),
        habit.current_streak
    );
    Ok(habit)
}

/// Logs for one habit from `since` onward, newest first
pub async fn get_logs_since(
    pool: &PgPool,
    habit_id: i64,
    since: NaiveDate,
) -> Result<Vec<HabitLog>> {
    let rows = sqlx::query(
        "SELECT * FROM habit_logs
         WHERE habit_id = $1 AND completed_date >= $2
         ORDER BY completed_date DESC",
    )
    .bind(habit_id)
    .bind(since)
    .fetch_all(pool)
    .await
    .context("Failed to read logs")?;
    rows.iter().map(log_from_row).collect()
}

pub async fn is_completed_on(pool: &PgPool, habit_id: i64, date: NaiveDate) -> Result<bool> {
    let completed: bool = sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM habit_logs
             WHERE habit_id = $1 AND completed_date = $2 AND status = 'completed'
         )",
    )
    .bind(habit_id)
    .bind(date)
    .fetch_one(pool)
    .await
    .context("Failed to check completion")?;
    Ok(completed)
}

// ==================== Scheduler queries ====================

/// All `(habit, owner)` pairs the scheduler tick has to consider: active,
/// unpaused habits with a reminder time, owned by users with notifications
/// on. Time matching happens in the scheduler, not here.
pub async fn reminder_candidates(pool: &PgPool) -> Result<Vec<(Habit, User)>> {
    let rows = sqlx::query(
        "SELECT h.*,
                u.id AS owner_id,
                u.username AS owner_username,
                u.first_name AS owner_first_name,
                u.timezone AS owner_timezone,
                u.notifications_enabled AS owner_notifications_enabled,
                u.ai_enabled AS owner_ai_enabled,
                u.streak_break_days AS owner_streak_break_days,
                u.last_streak_check AS owner_last_streak_check,
                u.created_at AS owner_created_at
         FROM habits h
         JOIN users u ON u.id = h.user_id
         WHERE h.is_active AND NOT h.is_paused
           AND h.reminder_time IS NOT NULL
           AND u.notifications_enabled",
    )
    .fetch_all(pool)
    .await
    .context("Failed to load reminder candidates")?;

    rows.iter()
        .map(|row| {
            let habit = habit_from_row(row)?;
            let user = User {
                id: row.try_get("owner_id")?,
                username: row.try_get("owner_username")?,
                first_name: row.try_get("owner_first_name")?,
                timezone: row.try_get("owner_timezone")?,
                notifications_enabled: row.try_get("owner_notifications_enabled")?,
                ai_enabled: row.try_get("owner_ai_enabled")?,
                streak_break_days: row.try_get("owner_streak_break_days")?,
                last_streak_check: row.try_get("owner_last_streak_check")?,
                created_at: row.try_get("owner_created_at")?,
            };
            Ok((habit, user))
        })
        .collect()
}

// ==================== Stats ====================

pub async fn get_user_stats(pool: &PgPool, user_id: i64) -> Result<UserStats> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total_habits,
                COUNT(*) FILTER (WHERE is_active) AS active_habits,
                COALESCE(SUM(total_completions), 0) AS total_completions,
                COALESCE(MAX(best_streak), 0) AS best_streak
         FROM habits
         WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("Failed to read user stats")?;

    Ok(UserStats {
        total_habits: row.try_get("total_habits")?,
        active_habits: row.try_get("active_habits")?,
        total_completions: row.try_get::<i64, _>("total_completions")?,
        best_streak: row.try_get("best_streak")?,
    })
}
