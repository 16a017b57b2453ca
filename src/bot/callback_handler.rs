//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, error, info};

use crate::clock::local_date;
use crate::db;
use crate::dialogue::DialogEvent;
use crate::models::LogStatus;
use crate::timeout::SessionAge;

use super::dialogue_manager::{begin_dialogue, drive_dialogue};
use super::message_handler::{completed_on, maybe_check_streaks, send_habit_list};
use super::ui_builder::{
    habit_detail_keyboard, habit_detail_message, progress_keyboard, progress_message,
    session_expired_message, settings_keyboard, settings_message, timezone_keyboard,
    CB_ADD_HABIT, CB_BACK_STEP, CB_CANCEL_DIALOG, CB_CHANGE_TIMEZONE, CB_COMPLETE_PREFIX,
    CB_DELETE_PREFIX, CB_EMOJI_PREFIX, CB_FREQ_PREFIX, CB_HABIT_PREFIX, CB_LIST_HABITS,
    CB_PAUSE_PREFIX, CB_RESUME_PREFIX, CB_SETTINGS, CB_SHOW_PROGRESS, CB_SKIP_DESCRIPTION,
    CB_SKIP_EMOJI, CB_SKIP_PREFIX, CB_SNOOZE_PREFIX, CB_TIME_PREFIX, CB_TOGGLE_AI,
    CB_TOGGLE_NOTIFICATIONS, CB_TZ_PREFIX,
};
use super::AppState;

/// Map a callback payload to a dialogue event, if it is one
fn dialogue_event(data: &str) -> Option<DialogEvent> {
    if data == CB_SKIP_DESCRIPTION {
        return Some(DialogEvent::SkipDescription);
    }
    if data == CB_SKIP_EMOJI {
        return Some(DialogEvent::SkipEmoji);
    }
    if data == CB_BACK_STEP {
        return Some(DialogEvent::Back);
    }
    if data == CB_CANCEL_DIALOG {
        return Some(DialogEvent::Cancel);
    }
    if let Some(emoji) = data.strip_prefix(CB_EMOJI_PREFIX) {
        return Some(DialogEvent::PickEmoji(emoji.to_string()));
    }
    if let Some(freq) = data.strip_prefix(CB_FREQ_PREFIX) {
        return Some(DialogEvent::PickFrequency(freq.to_string()));
    }
    if let Some(time) = data.strip_prefix(CB_TIME_PREFIX) {
        return Some(DialogEvent::PickTime(time.to_string()));
    }
    None
}

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: std::sync::Arc<AppState>,
) -> Result<()> {
    let user_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|msg| msg.chat().id)
        .unwrap_or(ChatId(user_id));
    let data = q.data.as_deref().unwrap_or("").to_string();

    let _gate = state.gate.acquire(user_id).await;
    debug!(user_id, data = %data, "Received callback query");

    // Button taps count as interaction for the lazy streak evaluation
    if let Ok(Some(user)) = db::get_user(&state.pool, user_id).await {
        maybe_check_streaks(&bot, &state, &user).await;
    }

    let mut answer_text: Option<String> = None;

    if let Some(event) = dialogue_event(&data) {
        handle_dialogue_callback(&bot, &state, chat_id, user_id, event).await?;
    } else if data == CB_ADD_HABIT {
        begin_dialogue(&bot, &state, chat_id, user_id).await?;
    } else if data == CB_LIST_HABITS {
        if let Ok(Some(user)) = db::get_user(&state.pool, user_id).await {
            send_habit_list(&bot, &state, chat_id, &user).await?;
        }
    } else if data == CB_SHOW_PROGRESS {
        show_progress(&bot, &state, &q, chat_id, user_id).await?;
    } else if let Some(habit_id) = parse_id(&data, CB_COMPLETE_PREFIX) {
        answer_text = Some(complete_habit(&bot, &state, &q, user_id, habit_id).await);
    } else if let Some(habit_id) = parse_id(&data, CB_SKIP_PREFIX) {
        answer_text = Some(skip_habit(&state, user_id, habit_id).await);
    } else if parse_id(&data, CB_SNOOZE_PREFIX).is_some() {
        answer_text = Some("⏰ I'll remind you again in an hour!".to_string());
    } else if let Some(habit_id) = parse_id(&data, CB_HABIT_PREFIX) {
        show_habit_detail(&bot, &state, &q, user_id, habit_id).await?;
    } else if let Some(habit_id) = parse_id(&data, CB_PAUSE_PREFIX) {
        answer_text = set_paused(&bot, &state, &q, user_id, habit_id, true).await?;
    } else if let Some(habit_id) = parse_id(&data, CB_RESUME_PREFIX) {
        answer_text = set_paused(&bot, &state, &q, user_id, habit_id, false).await?;
    } else if let Some(habit_id) = parse_id(&data, CB_DELETE_PREFIX) {
        answer_text = Some(delete_habit(&bot, &state, &q, user_id, habit_id).await);
    } else if data == CB_SETTINGS {
        show_settings(&bot, &state, &q, user_id).await?;
    } else if data == CB_TOGGLE_AI {
        answer_text = toggle_setting(&bot, &state, &q, user_id, Setting::Ai).await?;
    } else if data == CB_TOGGLE_NOTIFICATIONS {
        answer_text = toggle_setting(&bot, &state, &q, user_id, Setting::Notifications).await?;
    } else if data == CB_CHANGE_TIMEZONE {
        if let Some(msg) = &q.message {
            bot.edit_message_text(msg.chat().id, msg.id(), "🌍 Pick your timezone:")
                .reply_markup(timezone_keyboard())
                .await?;
        }
    } else if let Some(zone) = data.strip_prefix(CB_TZ_PREFIX) {
        answer_text = change_timezone(&bot, &state, &q, user_id, zone).await?;
    }

    // Always answer to clear the client-side loading state
    let mut answer = bot.answer_callback_query(q.id);
    if let Some(text) = answer_text {
        answer = answer.text(text);
    }
    answer.await?;

    Ok(())
}

fn parse_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}

/// Dialogue callbacks pass through the same timeout gate as text input
async fn handle_dialogue_callback(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    event: DialogEvent,
) -> Result<()> {
    let Some(mut session) = state.sessions.get(user_id) else {
        // Stale button from a finished dialogue
        return Ok(());
    };

    let now = state.clock.now_utc();
    match state.timeout.check(&session, now) {
        SessionAge::Expired => {
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
            drive_dialogue(bot, state, chat_id, user_id, session, event).await?;
        }
    }
    Ok(())
}

/// Mark the habit completed for the user's local current date and report
/// the new streak. The returned string goes into the callback answer.
async fn complete_habit(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    habit_id: i64,
) -> String {
    let timezone = match db::get_user(&state.pool, user_id).await {
        Ok(Some(user)) => user.timezone,
        _ => "UTC".to_string(),
    };
    let today = local_date(state.clock.now_utc(), &timezone);

    match db::log_habit(&state.pool, habit_id, user_id, today, LogStatus::Completed).await {
        Ok(habit) => {
            state.completions.put(user_id, habit_id, today, true);
            // Swap the buttons out so a second tap is a no-op visually
            if let Some(msg) = &q.message {
                let done = InlineKeyboardMarkup::new(vec![vec![
                    InlineKeyboardButton::callback(
                        "✅ Already done".to_string(),
                        format!("{CB_HABIT_PREFIX}{habit_id}"),
                    ),
                ]]);
                if let Err(e) = bot
                    .edit_message_reply_markup(msg.chat().id, msg.id())
                    .reply_markup(done)
                    .await
                {
                    debug!(user_id, error = %e, "Could not update reminder buttons");
                }
            }
            format!("✅ Great! Streak: {} days 🔥", habit.current_streak)
        }
        Err(e) => {
            error!(user_id, habit_id, error = %e, "Completion failed");
            "⚠️ Could not record that. Try again.".to_string()
        }
    }
}

async fn skip_habit(state: &AppState, user_id: i64, habit_id: i64) -> String {
    let timezone = match db::get_user(&state.pool, user_id).await {
        Ok(Some(user)) => user.timezone,
        _ => "UTC".to_string(),
    };
    let today = local_date(state.clock.now_utc(), &timezone);

    match db::log_habit(&state.pool, habit_id, user_id, today, LogStatus::Skipped).await {
        Ok(_) => {
            state.completions.put(user_id, habit_id, today, false);
            "📊 Recorded. Don't give up!".to_string()
        }
        Err(e) => {
            error!(user_id, habit_id, error = %e, "Skip failed");
            "⚠️ Could not record that. Try again.".to_string()
        }
    }
}

async fn show_habit_detail(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    habit_id: i64,
) -> Result<()> {
    let habit = match db::get_habit(&state.pool, habit_id, user_id).await {
        Ok(Some(habit)) => habit,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!(user_id, habit_id, error = %e, "Habit lookup failed");
            return Ok(());
        }
    };

    let timezone = match db::get_user(&state.pool, user_id).await {
        Ok(Some(user)) => user.timezone,
        _ => "UTC".to_string(),
    };
    let today = local_date(state.clock.now_utc(), &timezone);
    let completed = completed_on(state, user_id, habit_id, today).await;

    let text = habit_detail_message(&habit, completed);
    let keyboard = habit_detail_keyboard(&habit);
    if let Some(msg) = &q.message {
        bot.edit_message_text(msg.chat().id, msg.id(), text)
            .reply_markup(keyboard)
            .await?;
    } else {
        bot.send_message(ChatId(user_id), text)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

async fn set_paused(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    habit_id: i64,
    paused: bool,
) -> Result<Option<String>> {
    match db::set_habit_paused(&state.pool, habit_id, user_id, paused).await {
        Ok(true) => {
            show_habit_detail(bot, state, q, user_id, habit_id).await?;
            Ok(Some(
                if paused {
                    "⏸ Paused. Reminders are off for this habit."
                } else {
                    "▶️ Resumed!"
                }
                .to_string(),
            ))
        }
        Ok(false) => Ok(Some("Habit not found.".to_string())),
        Err(e) => {
            error!(user_id, habit_id, error = %e, "Pause update failed");
            Ok(Some("⚠️ Could not update the habit.".to_string()))
        }
    }
}

async fn delete_habit(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    habit_id: i64,
) -> String {
    match db::deactivate_habit(&state.pool, habit_id, user_id).await {
        Ok(true) => {
            state.completions.invalidate(user_id, habit_id);
            if let Ok(Some(user)) = db::get_user(&state.pool, user_id).await {
                let chat_id = q
                    .message
                    .as_ref()
                    .map(|msg| msg.chat().id)
                    .unwrap_or(ChatId(user_id));
                if let Err(e) = send_habit_list(bot, state, chat_id, &user).await {
                    debug!(user_id, error = %e, "Could not refresh habit list");
                }
            }
            "🗑 Habit deleted.".to_string()
        }
        Ok(false) => "Habit not found.".to_string(),
        Err(e) => {
            error!(user_id, habit_id, error = %e, "Delete failed");
            "⚠️ Could not delete the habit.".to_string()
        }
    }
}

enum Setting {
    Ai,
    Notifications,
}

async fn show_settings(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
) -> Result<()> {
    let Ok(Some(user)) = db::get_user(&state.pool, user_id).await else {
        return Ok(());
    };
    let text = settings_message(&user);
    let keyboard = settings_keyboard(&user);
    if let Some(msg) = &q.message {
        bot.edit_message_text(msg.chat().id, msg.id(), text)
            .reply_markup(keyboard)
            .await?;
    } else {
        bot.send_message(ChatId(user_id), text)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

async fn toggle_setting(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    setting: Setting,
) -> Result<Option<String>> {
    let Ok(Some(user)) = db::get_user(&state.pool, user_id).await else {
        return Ok(Some("Start the bot with /start first.".to_string()));
    };

    let result = match setting {
        Setting::Ai => {
            let enabled = !user.ai_enabled;
            db::set_ai_enabled(&state.pool, user_id, enabled)
                .await
                .map(|_| format!("AI reminders {}", if enabled { "on" } else { "off" }))
        }
        Setting::Notifications => {
            let enabled = !user.notifications_enabled;
            db::set_notifications_enabled(&state.pool, user_id, enabled)
                .await
                .map(|_| format!("Notifications {}", if enabled { "on" } else { "off" }))
        }
    };

    match result {
        Ok(answer) => {
            show_settings(bot, state, q, user_id).await?;
            Ok(Some(answer))
        }
        Err(e) => {
            error!(user_id, error = %e, "Settings update failed");
            Ok(Some("⚠️ Could not update settings.".to_string()))
        }
    }
}

async fn change_timezone(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    user_id: i64,
    zone: &str,
) -> Result<Option<String>> {
    // Only store names the tz database actually knows
    if zone.parse::<chrono_tz::Tz>().is_err() {
        return Ok(Some("Unknown timezone.".to_string()));
    }
    match db::set_timezone(&state.pool, user_id, zone).await {
        Ok(()) => {
            show_settings(bot, state, q, user_id).await?;
            Ok(Some(format!("Timezone set to {zone}")))
        }
        Err(e) => {
            error!(user_id, error = %e, "Timezone update failed");
            Ok(Some("⚠️ Could not update the timezone.".to_string()))
        }
    }
}

async fn show_progress(
    bot: &Bot,
    state: &AppState,
    q: &CallbackQuery,
    chat_id: ChatId,
    user_id: i64,
) -> Result<()> {
    match db::get_user_stats(&state.pool, user_id).await {
        Ok(stats) => {
            let text = progress_message(&stats);
            if let Some(msg) = &q.message {
                bot.edit_message_text(msg.chat().id, msg.id(), text)
                    .reply_markup(progress_keyboard())
                    .await?;
            } else {
                bot.send_message(chat_id, text)
                    .reply_markup(progress_keyboard())
                    .await?;
            }
        }
        Err(e) => {
            error!(user_id, error = %e, "Stats lookup failed");
            bot.send_message(chat_id, "⚠️ Something went wrong. Please try again later.")
                .await?;
        }
    }
    Ok(())
}
