//! Dialogue Manager module for handling dialogue state transitions

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;
use tracing::{debug, error};

use crate::db;
use crate::dialogue::{apply_event, DialogEvent, Transition};
use crate::session::{DialogSession, DialogStep};

use super::ui_builder::{
    after_commit_keyboard, description_step_keyboard, emoji_step_keyboard,
    frequency_step_keyboard, habit_created_message, name_step_keyboard, step_prompt,
    time_step_keyboard, validation_message,
};
use super::AppState;

fn step_keyboard(step: DialogStep) -> InlineKeyboardMarkup {
    match step {
        DialogStep::Name => name_step_keyboard(),
        DialogStep::Description => description_step_keyboard(),
        DialogStep::Emoji => emoji_step_keyboard(),
        DialogStep::Frequency => frequency_step_keyboard(),
        DialogStep::ReminderTime => time_step_keyboard(),
    }
}

/// Start (or restart) the add-habit dialogue and prompt for the first step
pub async fn begin_dialogue(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
) -> Result<()> {
    state.sessions.start(user_id, state.clock.now_utc());
    debug!(user_id, "Dialogue started");
    bot.send_message(chat_id, step_prompt(DialogStep::Name))
        .reply_markup(name_step_keyboard())
        .await?;
    Ok(())
}

/// Feed one event through the state machine and render the outcome. The
/// session passed in has already been gated and freshness-checked.
pub async fn drive_dialogue(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    user_id: i64,
    mut session: DialogSession,
    event: DialogEvent,
) -> Result<()> {
    let now = state.clock.now_utc();
    let transition = apply_event(&mut session, event, now);
    let step = session.step;

    match transition {
        Transition::Advanced { next } => {
            state.sessions.put(session);
            bot.send_message(chat_id, step_prompt(next))
                .reply_markup(step_keyboard(next))
                .await?;
        }
        Transition::Invalid(validation_error) => {
            // Nothing collected is lost; the same step is asked again
            state.sessions.put(session);
            debug!(user_id, code = validation_error.code(), "Input rejected");
            bot.send_message(chat_id, validation_message(step, validation_error))
                .await?;
        }
        Transition::SteppedBack { restored } => {
            state.sessions.put(session);
            bot.send_message(chat_id, step_prompt(restored))
                .reply_markup(step_keyboard(restored))
                .await?;
        }
        Transition::CannotGoBack => {
            state.sessions.put(session);
            bot.send_message(chat_id, "You are already at the first step.")
                .await?;
        }
        Transition::Cancelled => {
            state.sessions.clear(user_id);
            bot.send_message(chat_id, "❌ Habit creation cancelled.")
                .await?;
        }
        Transition::ReadyToCommit { habit } => {
            match db::create_habit(&state.pool, user_id, &habit).await {
                Ok(created) => {
                    // Only a successful commit ends the session
                    state.sessions.clear(user_id);
                    bot.send_message(chat_id, habit_created_message(&created))
                        .reply_markup(after_commit_keyboard())
                        .await?;
                }
                Err(e) => {
                    // The session stays at the reminder-time step with the
                    // full draft; the user can resubmit
                    error!(user_id, error = %e, "Habit commit failed");
                    state.sessions.put(session);
                    bot.send_message(
                        chat_id,
                        "⚠️ Could not save the habit right now. Please try again.",
                    )
                    .await?;
                }
            }
        }
        Transition::Ignored => {
            state.sessions.put(session);
        }
    }

    Ok(())
}
