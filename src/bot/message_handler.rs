//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, error, info, warn};

use crate::clock::local_date;
use crate::db;
use crate::dialogue::DialogEvent;
use crate::models::User;
use crate::streak;
use crate::timeout::SessionAge;

use super::dialogue_manager::{begin_dialogue, drive_dialogue};
use super::ui_builder::{
    broken_streaks_message, empty_list_keyboard, habit_list_keyboard, habit_list_message,
    help_message, progress_keyboard, progress_message, session_expired_message, settings_keyboard,
    settings_message, welcome_message,
};
use super::AppState;

/// Entry point for every inbound message
pub async fn message_handler(bot: Bot, msg: Message, state: std::sync::Arc<AppState>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(tg_user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = tg_user.id.0 as i64;
    let chat_id = msg.chat.id;

    // One event at a time per user, even on a multi-threaded runtime
    let _gate = state.gate.acquire(user_id).await;

    debug!(user_id, "Received text message");

    let user = match db::get_or_create_user(
        &state.pool,
        user_id,
        tg_user.username.as_deref(),
        &tg_user.first_name,
        state.config.streak.default_break_days,
    )
    .await
    {
        Ok(user) => user,
        Err(e) => {
            error!(user_id, error = %e, "User lookup failed");
            bot.send_message(chat_id, "⚠️ Something went wrong. Please try again later.")
                .await?;
            return Ok(());
        }
    };

    // Opportunistic streak evaluation, at most once an hour per user
    maybe_check_streaks(&bot, &state, &user).await;

    match text.trim() {
        "/start" => {
            info!(user_id, "User started the bot");
            bot.send_message(chat_id, welcome_message(&user.first_name))
                .await?;
        }
        "/help" => {
            bot.send_message(chat_id, help_message()).await?;
        }
        "/add_habit" => {
            begin_dialogue(&bot, &state, chat_id, user_id).await?;
        }
        "/my_habits" => {
            send_habit_list(&bot, &state, chat_id, &user).await?;
        }
        "/my_progress" => {
            send_progress(&bot, &state, chat_id, user_id).await?;
        }
        "/settings" => {
            bot.send_message(chat_id, settings_message(&user))
                .reply_markup(settings_keyboard(&user))
                .await?;
        }
        "/cancel" => {
            if state.sessions.clear(user_id) {
                bot.send_message(chat_id, "❌ Habit creation cancelled.")
                    .await?;
            } else {
                bot.send_message(chat_id, "Nothing to cancel.").await?;
            }
        }
        _ => {
            handle_free_text(&bot, &state, chat_id, user_id, text).await?;
        }
    }

    Ok(())
}

/// Free text either feeds the active dialogue or gets a gentle hint
async fn handle_free_text(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    text: &str,
) -> Result<()> {
    let Some(mut session) = state.sessions.get(user_id) else {
        bot.send_message(
            chat_id,
            "I track habits. Add one with /add_habit or see /help.",
        )
        .await?;
        return Ok(());
    };

    let now = state.clock.now_utc();
    match state.timeout.check(&session, now) {
        SessionAge::Expired => {
            // The triggering event is dropped, not retried
            state.sessions.clear(user_id);
            info!(user_id, "Dialogue session expired");
            bot.send_message(
                chat_id,
                session_expired_message(state.timeout.window_minutes()),
            )
            .await?;
        }
        SessionAge::Fresh => {
            session.touch(now);
            drive_dialogue(
                bot,
                state,
                chat_id,
                user_id,
                session,
                DialogEvent::Input(text.to_string()),
            )
            .await?;
        }
    }
    Ok(())
}

/// Run the lazy streak evaluation when due; failures are logged and never
/// interrupt the user's request
pub async fn maybe_check_streaks(bot: &Bot, state: &AppState, user: &User) {
    let now = state.clock.now_utc();
    if !streak::needs_check(user, now, state.config.streak.check_cadence_secs) {
        return;
    }
    match streak::run_user_check(&state.pool, state.clock.as_ref(), user).await {
        Ok(broken) if !broken.is_empty() => {
            if let Err(e) = bot
                .send_message(ChatId(user.id), broken_streaks_message(&broken))
                .await
            {
                warn!(user_id = user.id, error = %e, "Failed to send streak notification");
            }
        }
        Ok(_) => {}
        Err(e) => {
            error!(user_id = user.id, error = %e, "Streak check failed");
        }
    }
}

pub async fn send_habit_list(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user: &User,
) -> Result<()> {
    let habits = match db::get_user_habits(&state.pool, user.id, true).await {
        Ok(habits) => habits,
        Err(e) => {
            error!(user_id = user.id, error = %e, "Habit list lookup failed");
            bot.send_message(chat_id, "⚠️ Something went wrong. Please try again later.")
                .await?;
            return Ok(());
        }
    };

    if habits.is_empty() {
        bot.send_message(
            chat_id,
            "📝 You have no active habits yet.\n\nAdd the first one and get going! 💪",
        )
        .reply_markup(empty_list_keyboard())
        .await?;
        return Ok(());
    }

    let today = local_date(state.clock.now_utc(), &user.timezone);
    let mut with_status = Vec::with_capacity(habits.len());
    for habit in &habits {
        let completed = completed_on(state, user.id, habit.id, today).await;
        with_status.push((habit.clone(), completed));
    }

    bot.send_message(chat_id, habit_list_message(&with_status))
        .reply_markup(habit_list_keyboard(&habits))
        .await?;
    Ok(())
}

/// Completion status for one habit on one date, served from the cache when
/// possible
pub async fn completed_on(state: &AppState, user_id: i64, habit_id: i64, date: chrono::NaiveDate) -> bool {
    if let Some(cached) = state.completions.get(user_id, habit_id, date) {
        return cached;
    }
    let completed = db::is_completed_on(&state.pool, habit_id, date)
        .await
        .unwrap_or(false);
    state.completions.put(user_id, habit_id, date, completed);
    completed
}

pub async fn send_progress(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
) -> Result<()> {
    match db::get_user_stats(&state.pool, user_id).await {
        Ok(stats) => {
            bot.send_message(chat_id, progress_message(&stats))
                .reply_markup(progress_keyboard())
                .await?;
        }
        Err(e) => {
            error!(user_id, error = %e, "Stats lookup failed");
            bot.send_message(chat_id, "⚠️ Something went wrong. Please try again later.")
                .await?;
        }
    }
    Ok(())
}
