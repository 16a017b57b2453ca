//! UI Builder module for keyboards and message formatting

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::db::UserStats;
use crate::dialogue::{ValidationError, EMOJI_PALETTE};
use crate::models::{Habit, User};
use crate::session::DialogStep;

// Callback data tags shared between keyboards and the callback handler
pub const CB_ADD_HABIT: &str = "add_habit";
pub const CB_LIST_HABITS: &str = "list_habits";
pub const CB_SHOW_PROGRESS: &str = "show_progress";
pub const CB_CANCEL_DIALOG: &str = "cancel_dialog";
pub const CB_BACK_STEP: &str = "back_step";
pub const CB_SKIP_DESCRIPTION: &str = "skip_description";
pub const CB_SKIP_EMOJI: &str = "skip_emoji";
pub const CB_EMOJI_PREFIX: &str = "emoji:";
pub const CB_FREQ_PREFIX: &str = "freq:";
pub const CB_TIME_PREFIX: &str = "time:";
pub const CB_HABIT_PREFIX: &str = "habit:";
pub const CB_COMPLETE_PREFIX: &str = "complete:";
pub const CB_SKIP_PREFIX: &str = "skip:";
pub const CB_SNOOZE_PREFIX: &str = "snooze:";
pub const CB_PAUSE_PREFIX: &str = "pause:";
pub const CB_RESUME_PREFIX: &str = "resume:";
pub const CB_DELETE_PREFIX: &str = "delete:";
pub const CB_SETTINGS: &str = "settings";
pub const CB_TOGGLE_AI: &str = "toggle_ai";
pub const CB_TOGGLE_NOTIFICATIONS: &str = "toggle_notifications";
pub const CB_CHANGE_TIMEZONE: &str = "change_timezone";
pub const CB_TZ_PREFIX: &str = "tz:";

/// Timezone presets offered in settings, label + IANA name
pub const TIMEZONE_PRESETS: [(&str, &str); 6] = [
    ("🌍 UTC", "UTC"),
    ("🇷🇺 Moscow (UTC+3)", "Europe/Moscow"),
    ("🇰🇿 Almaty (UTC+5)", "Asia/Almaty"),
    ("🇹🇭 Bangkok (UTC+7)", "Asia/Bangkok"),
    ("🇨🇳 Shanghai (UTC+8)", "Asia/Shanghai"),
    ("🇯🇵 Tokyo (UTC+9)", "Asia/Tokyo"),
];

fn button(text: &str, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.to_string(), data.into())
}

fn nav_row(with_back: bool) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::new();
    if with_back {
        row.push(button("« Back", CB_BACK_STEP));
    }
    row.push(button("❌ Cancel", CB_CANCEL_DIALOG));
    row
}

/// Keyboard for the name step: cancel only, there is nothing to go back to
pub fn name_step_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![nav_row(false)])
}

pub fn description_step_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("Skip »", CB_SKIP_DESCRIPTION)],
        nav_row(true),
    ])
}

/// The fixed emoji palette, four per row
pub fn emoji_step_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = EMOJI_PALETTE
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .map(|emoji| button(emoji, format!("{CB_EMOJI_PREFIX}{emoji}")))
                .collect()
        })
        .collect();
    rows.push(vec![button("Skip »", CB_SKIP_EMOJI)]);
    rows.push(nav_row(true));
    InlineKeyboardMarkup::new(rows)
}

pub fn frequency_step_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("📅 Every day", format!("{CB_FREQ_PREFIX}daily"))],
        vec![
            button("📆 Weekdays", format!("{CB_FREQ_PREFIX}weekdays")),
            button("🎉 Weekends", format!("{CB_FREQ_PREFIX}weekends")),
        ],
        vec![button("🗓 Once a week", format!("{CB_FREQ_PREFIX}weekly"))],
        nav_row(true),
    ])
}

pub fn time_step_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("🌅 Morning (07:00)", format!("{CB_TIME_PREFIX}07:00")),
            button("🌇 Evening (20:00)", format!("{CB_TIME_PREFIX}20:00")),
        ],
        vec![button("No reminder", format!("{CB_TIME_PREFIX}none"))],
        nav_row(true),
    ])
}

/// Action buttons attached to a delivered reminder
pub fn reminder_keyboard(habit_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("✅ Done", format!("{CB_COMPLETE_PREFIX}{habit_id}")),
            button("⏰ In an hour", format!("{CB_SNOOZE_PREFIX}{habit_id}")),
        ],
        vec![button("❌ Skip today", format!("{CB_SKIP_PREFIX}{habit_id}"))],
    ])
}

pub fn habit_list_keyboard(habits: &[Habit]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = habits
        .iter()
        .map(|habit| {
            vec![button(
                &format!("{} {}", habit.emoji, habit.name),
                format!("{CB_HABIT_PREFIX}{}", habit.id),
            )]
        })
        .collect();
    rows.push(vec![
        button("➕ Add", CB_ADD_HABIT),
        button("📊 Progress", CB_SHOW_PROGRESS),
    ]);
    InlineKeyboardMarkup::new(rows)
}

pub fn habit_detail_keyboard(habit: &Habit) -> InlineKeyboardMarkup {
    let pause_button = if habit.is_paused {
        button("▶️ Resume", format!("{CB_RESUME_PREFIX}{}", habit.id))
    } else {
        button("⏸ Pause", format!("{CB_PAUSE_PREFIX}{}", habit.id))
    };
    InlineKeyboardMarkup::new(vec![
        vec![button(
            "✅ Complete today",
            format!("{CB_COMPLETE_PREFIX}{}", habit.id),
        )],
        vec![
            pause_button,
            button("🗑 Delete", format!("{CB_DELETE_PREFIX}{}", habit.id)),
        ],
        vec![button("« Back to list", CB_LIST_HABITS)],
    ])
}

pub fn after_commit_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("📋 My habits", CB_LIST_HABITS),
        button("➕ Another one", CB_ADD_HABIT),
    ]])
}

pub fn progress_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("📋 My habits", CB_LIST_HABITS)]])
}

pub fn empty_list_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "➕ Add your first habit",
        CB_ADD_HABIT,
    )]])
}

pub fn settings_keyboard(user: &User) -> InlineKeyboardMarkup {
    let ai_label = if user.ai_enabled {
        "🤖 AI: turn off"
    } else {
        "🤖 AI: turn on"
    };
    let notifications_label = if user.notifications_enabled {
        "🔔 Notifications: turn off"
    } else {
        "🔔 Notifications: turn on"
    };
    InlineKeyboardMarkup::new(vec![
        vec![button(ai_label, CB_TOGGLE_AI)],
        vec![button(notifications_label, CB_TOGGLE_NOTIFICATIONS)],
        vec![button("🌍 Change timezone", CB_CHANGE_TIMEZONE)],
        vec![button("📋 My habits", CB_LIST_HABITS)],
    ])
}

pub fn timezone_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = TIMEZONE_PRESETS
        .chunks(2)
        .map(|chunk| {
            chunk
                .iter()
                .map(|(label, zone)| button(label, format!("{CB_TZ_PREFIX}{zone}")))
                .collect()
        })
        .collect();
    rows.push(vec![button("« Back", CB_SETTINGS)]);
    InlineKeyboardMarkup::new(rows)
}

// ==================== Texts ====================

/// Prompt shown when entering a dialogue step
pub fn step_prompt(step: DialogStep) -> String {
    let n = step.number();
    match step {
        DialogStep::Name => format!(
            "📝 Adding a new habit\n\nStep {n}/5: What is the habit called?\n\
             For example: \"Morning run\" or \"Read 30 minutes\""
        ),
        DialogStep::Description => {
            format!("Step {n}/5: Add a description (optional)")
        }
        DialogStep::Emoji => format!("Step {n}/5: Pick an emoji for the habit:"),
        DialogStep::Frequency => format!("Step {n}/5: How often?"),
        DialogStep::ReminderTime => format!(
            "Step {n}/5: When should I remind you?\n\
             Pick a preset or type a time like 08:30, or \"none\""
        ),
    }
}

/// User-facing text for a validation failure at the given step
pub fn validation_message(step: DialogStep, error: ValidationError) -> String {
    let reason = match (step, error) {
        (DialogStep::Name, ValidationError::TooShort) => {
            "The name must be at least 2 characters.".to_string()
        }
        (DialogStep::Name, ValidationError::TooLong) => {
            "The name must be at most 100 characters.".to_string()
        }
        (DialogStep::Name, ValidationError::ForbiddenPrefix) => {
            "The name cannot start with / or !.".to_string()
        }
        (DialogStep::Description, ValidationError::TooLong) => {
            "The description is too long (max 500 characters).".to_string()
        }
        (DialogStep::Emoji, _) => "Please pick one of the emoji below.".to_string(),
        (DialogStep::ReminderTime, ValidationError::BadFormat) => {
            "That does not look like a time. Use HH:MM, e.g. 08:30, or \"none\".".to_string()
        }
        (DialogStep::ReminderTime, ValidationError::OutOfRange) => {
            "Hours go up to 23 and minutes up to 59.".to_string()
        }
        _ => "That value does not fit here.".to_string(),
    };
    format!("❌ {reason}\nTry again:")
}

pub fn session_expired_message(timeout_minutes: u64) -> String {
    format!(
        "⏰ Session expired\n\nMore than {timeout_minutes} minutes of inactivity.\n\
         Start again with /add_habit if you want to continue."
    )
}

pub fn habit_created_message(habit: &Habit) -> String {
    let reminder = match habit.reminder_time {
        Some(time) => format!("⏰ Reminder: {}", time.format("%H:%M")),
        None => "🔕 No reminder".to_string(),
    };
    format!(
        "🎉 Habit created!\n\n{} {}\n{reminder}\n\nTrack it every day and keep the streak going! 💪",
        habit.emoji, habit.name
    )
}

/// One line per habit with completion status, streak and reminder time
pub fn habit_list_message(habits: &[(Habit, bool)]) -> String {
    let mut text = String::from("📋 Your habits:\n\n");
    for (i, (habit, completed_today)) in habits.iter().enumerate() {
        let status = if *completed_today { "✅" } else { "⏳" };
        let streak = if habit.current_streak > 0 {
            format!("🔥 {}", habit.current_streak)
        } else {
            "🆕".to_string()
        };
        let reminder = match habit.reminder_time {
            Some(time) => format!(" ⏰ {}", time.format("%H:%M")),
            None => String::new(),
        };
        let paused = if habit.is_paused { " ⏸" } else { "" };
        text.push_str(&format!(
            "{}. {} {} {status}{paused}\n   {streak} streak | {:.0}% of target{reminder}\n\n",
            i + 1,
            habit.emoji,
            habit.name,
            habit.progress_percentage()
        ));
    }
    text
}

pub fn habit_detail_message(habit: &Habit, completed_today: bool) -> String {
    let mut text = format!("{} {}\n", habit.emoji, habit.name);
    if let Some(description) = &habit.description {
        text.push_str(&format!("{description}\n"));
    }
    text.push_str(&format!(
        "\n🔥 Streak: {} days (best: {})\n🎯 Completions: {}/{}\n",
        habit.current_streak, habit.best_streak, habit.total_completions, habit.target_days
    ));
    text.push_str(match habit.reminder_time {
        Some(_) => "⏰ Reminder set\n",
        None => "🔕 No reminder\n",
    });
    if habit.is_paused {
        text.push_str("⏸ Paused\n");
    }
    if completed_today {
        text.push_str("\n✅ Already completed today");
    }
    text
}

pub fn progress_message(stats: &UserStats) -> String {
    let motivation = if stats.total_completions == 0 {
        "💪 Time to start! Add your first habit."
    } else if stats.best_streak < 7 {
        "🌱 Great start! Keep it up."
    } else if stats.best_streak < 21 {
        "🚀 Good progress! The habit is forming."
    } else {
        "⭐ Impressive! You are a true habit master!"
    };
    format!(
        "📊 Your progress\n\n📌 Total habits: {}\n✅ Active: {}\n🎯 Completions: {}\n\
         🔥 Best streak: {} days\n\n{motivation}",
        stats.total_habits, stats.active_habits, stats.total_completions, stats.best_streak
    )
}

/// Notification about streaks reset by the lazy evaluator
pub fn broken_streaks_message(broken: &[(Habit, i32)]) -> String {
    if broken.len() == 1 {
        let (habit, prior) = &broken[0];
        format!(
            "😔 Streak broken\n\n{} {}\nYour {prior}-day streak was reset.\n\n\
             Don't give up! Start a new one right now 💪",
            habit.emoji, habit.name
        )
    } else {
        let mut text = String::from("😔 Several streaks broken\n\n");
        for (habit, prior) in broken {
            text.push_str(&format!("• {} {}: {prior} days\n", habit.emoji, habit.name));
        }
        text.push_str("\nDon't give up! Start again 💪");
        text
    }
}

pub fn settings_message(user: &User) -> String {
    let ai_status = if user.ai_enabled { "✅ on" } else { "❌ off" };
    let notifications_status = if user.notifications_enabled {
        "✅ on"
    } else {
        "❌ off"
    };
    let break_policy = match user.streak_break_days {
        0 => "never".to_string(),
        days => format!("after {days} silent days"),
    };
    format!(
        "⚙️ Settings\n\n👤 Name: {}\n🌐 Timezone: {}\n\n🤖 AI reminders: {ai_status}\n\
         🔔 Notifications: {notifications_status}\n🔥 Streak reset: {break_policy}\n\n\
         Pick what you want to change:",
        user.first_name, user.timezone
    )
}

pub fn welcome_message(first_name: &str) -> String {
    format!(
        "👋 Hi, {first_name}!\n\nI help you build habits: add one with /add_habit, \
         mark it done every day and watch your streak grow.\n\n\
         /add_habit — add a habit\n/my_habits — your habits\n\
         /my_progress — statistics\n/settings — settings\n\
         /cancel — abort the current dialogue\n/help — help"
    )
}

pub fn help_message() -> String {
    "ℹ️ How it works\n\n\
     1. /add_habit walks you through five short steps.\n\
     2. I remind you at the time you chose, in your timezone.\n\
     3. Tap ✅ Done on the reminder to grow your streak.\n\
     4. Miss too many days and the streak resets (configurable).\n\n\
     Commands: /add_habit, /my_habits, /my_progress, /settings, /cancel"
        .to_string()
}
