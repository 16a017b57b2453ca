//! # Dialogue State Machine
//!
//! Deterministic mapping of `(current step, event)` to the next session
//! state for the add-habit flow. All transitions are pure: no I/O happens
//! here, and the final commit is delegated to the caller so a failed store
//! write leaves the session parked at the last step for retry.

use chrono::{DateTime, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::Frequency;
use crate::session::{DialogSession, DialogStep, NewHabit};

/// Fixed palette offered at the emoji step
pub const EMOJI_PALETTE: [&str; 12] = [
    "✅", "💪", "🏃", "📚", "💧", "🧘", "🥗", "💊", "🎯", "⭐", "🔥", "❤️",
];

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

lazy_static! {
    static ref TIME_PATTERN: Regex = Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap();
}

/// Structured validation failure, reported back to the same step. The code
/// is machine-readable so callers can map it to user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    TooShort,
    TooLong,
    BadFormat,
    OutOfRange,
    ForbiddenPrefix,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::TooShort => "too_short",
            ValidationError::TooLong => "too_long",
            ValidationError::BadFormat => "bad_format",
            ValidationError::OutOfRange => "out_of_range",
            ValidationError::ForbiddenPrefix => "forbidden_prefix",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::error::Error for ValidationError {}

/// An input event dispatched to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    /// Free text typed at the current step
    Input(String),
    SkipDescription,
    PickEmoji(String),
    SkipEmoji,
    PickFrequency(String),
    /// `"none"` or an `HH:MM` preset from the keyboard
    PickTime(String),
    Back,
    Cancel,
}

/// Outcome of applying one event to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Value accepted, history pushed, session now at `next`
    Advanced { next: DialogStep },
    /// Final step validated; the caller persists `habit` and only then
    /// clears the session
    ReadyToCommit { habit: NewHabit },
    /// Step unchanged, no history pushed
    Invalid(ValidationError),
    /// Previous snapshot restored
    SteppedBack { restored: DialogStep },
    /// Already at the first step; nothing changed
    CannotGoBack,
    /// The caller clears the session unconditionally
    Cancelled,
    /// Event does not apply to the current step
    Ignored,
}

/// Validate the habit name: trimmed length in `[2, 100]`, no command-like
/// prefix
pub fn validate_name(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.starts_with('/') || trimmed.starts_with('!') {
        return Err(ValidationError::ForbiddenPrefix);
    }
    let chars = trimmed.chars().count();
    if chars < NAME_MIN_CHARS {
        return Err(ValidationError::TooShort);
    }
    if chars > NAME_MAX_CHARS {
        return Err(ValidationError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Validate an optional description: trimmed length at most 500
pub fn validate_description(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(ValidationError::TooLong);
    }
    Ok(trimmed.to_string())
}

/// Validate an emoji pick against the fixed palette
pub fn validate_emoji(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if EMOJI_PALETTE.contains(&trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(ValidationError::BadFormat)
    }
}

/// Validate a frequency pick. `custom` is not offered by the dialogue.
pub fn validate_frequency(input: &str) -> Result<Frequency, ValidationError> {
    match Frequency::parse(input.trim()) {
        Some(Frequency::Custom) | None => Err(ValidationError::BadFormat),
        Some(freq) => Ok(freq),
    }
}

/// Parse the reminder-time step: `"none"` disables the reminder, otherwise
/// the input must be `HH:MM`. Text that does not look like a time at all is
/// a format error; a time-shaped input with an impossible hour or minute is
/// a range error. The two are distinguishable by error code.
pub fn validate_reminder_time(input: &str) -> Result<Option<NaiveTime>, ValidationError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let captures = TIME_PATTERN
        .captures(trimmed)
        .ok_or(ValidationError::BadFormat)?;
    let hours: u32 = captures[1].parse().map_err(|_| ValidationError::BadFormat)?;
    let minutes: u32 = captures[2].parse().map_err(|_| ValidationError::BadFormat)?;
    if hours > 23 || minutes > 59 {
        return Err(ValidationError::OutOfRange);
    }
    Ok(NaiveTime::from_hms_opt(hours, minutes, 0))
}

/// Apply one event to the session, mutating it in place and returning the
/// transition outcome. Validation failures leave the session untouched and
/// may repeat indefinitely; there is no retry limit.
pub fn apply_event(
    session: &mut DialogSession,
    event: DialogEvent,
    now: DateTime<Utc>,
) -> Transition {
    match event {
        DialogEvent::Cancel => Transition::Cancelled,
        DialogEvent::Back => {
            if session.step_back() {
                Transition::SteppedBack {
                    restored: session.step,
                }
            } else {
                Transition::CannotGoBack
            }
        }
        other => apply_step_event(session, other, now),
    }
}

fn apply_step_event(
    session: &mut DialogSession,
    event: DialogEvent,
    now: DateTime<Utc>,
) -> Transition {
    match (session.step, event) {
        (DialogStep::Name, DialogEvent::Input(text)) => match validate_name(&text) {
            Ok(name) => {
                session.draft.name = Some(name);
                advance(session, now)
            }
            Err(e) => Transition::Invalid(e),
        },
        (DialogStep::Description, DialogEvent::Input(text)) => match validate_description(&text) {
            Ok(description) => {
                session.draft.description = Some(Some(description));
                advance(session, now)
            }
            Err(e) => Transition::Invalid(e),
        },
        (DialogStep::Description, DialogEvent::SkipDescription) => {
            session.draft.description = Some(None);
            advance(session, now)
        }
        (DialogStep::Emoji, DialogEvent::PickEmoji(emoji))
        | (DialogStep::Emoji, DialogEvent::Input(emoji)) => match validate_emoji(&emoji) {
            Ok(emoji) => {
                session.draft.emoji = Some(emoji);
                advance(session, now)
            }
            Err(e) => Transition::Invalid(e),
        },
        (DialogStep::Emoji, DialogEvent::SkipEmoji) => {
            // Leave the slot empty; the default is applied at commit
            advance(session, now)
        }
        (DialogStep::Frequency, DialogEvent::PickFrequency(freq))
        | (DialogStep::Frequency, DialogEvent::Input(freq)) => match validate_frequency(&freq) {
            Ok(frequency) => {
                session.draft.frequency = Some(frequency);
                advance(session, now)
            }
            Err(e) => Transition::Invalid(e),
        },
        (DialogStep::ReminderTime, DialogEvent::PickTime(text))
        | (DialogStep::ReminderTime, DialogEvent::Input(text)) => {
            match validate_reminder_time(&text) {
                Ok(reminder_time) => {
                    session.draft.reminder_time = Some(reminder_time);
                    match session.draft.finalize() {
                        Some(habit) => Transition::ReadyToCommit { habit },
                        // Unreachable through the step order; the name step
                        // cannot be skipped
                        None => Transition::Ignored,
                    }
                }
                Err(e) => Transition::Invalid(e),
            }
        }
        _ => Transition::Ignored,
    }
}

fn advance(session: &mut DialogSession, now: DateTime<Utc>) -> Transition {
    match session.step.next() {
        Some(next) => {
            session.advance(next, now);
            Transition::Advanced { next }
        }
        None => Transition::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn session() -> DialogSession {
        DialogSession::new(1, now())
    }

    #[test]
    fn test_name_validation_rules() {
        assert!(validate_name("Morning run").is_ok());
        assert_eq!(validate_name("  ok  ").unwrap(), "ok");
        assert_eq!(validate_name("a"), Err(ValidationError::TooShort));
        assert_eq!(
            validate_name(&"x".repeat(101)),
            Err(ValidationError::TooLong)
        );
        assert_eq!(
            validate_name("/start pretending"),
            Err(ValidationError::ForbiddenPrefix)
        );
        assert_eq!(
            validate_name("!bang"),
            Err(ValidationError::ForbiddenPrefix)
        );
        // Exactly at the bounds
        assert!(validate_name("ab").is_ok());
        assert!(validate_name(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn test_description_validation() {
        assert!(validate_description("short note").is_ok());
        assert!(validate_description(&"x".repeat(500)).is_ok());
        assert_eq!(
            validate_description(&"x".repeat(501)),
            Err(ValidationError::TooLong)
        );
    }

    #[test]
    fn test_emoji_palette() {
        assert!(validate_emoji("🔥").is_ok());
        assert!(validate_emoji(" ✅ ").is_ok());
        assert_eq!(validate_emoji("🦀"), Err(ValidationError::BadFormat));
    }

    #[test]
    fn test_frequency_rejects_custom_and_unknown() {
        assert_eq!(validate_frequency("daily"), Ok(Frequency::Daily));
        assert_eq!(validate_frequency("weekly"), Ok(Frequency::Weekly));
        assert_eq!(
            validate_frequency("custom"),
            Err(ValidationError::BadFormat)
        );
        assert_eq!(
            validate_frequency("sometimes"),
            Err(ValidationError::BadFormat)
        );
    }

    #[test]
    fn test_time_format_vs_range_are_distinct() {
        assert_eq!(
            validate_reminder_time("08:30").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0)
        );
        assert_eq!(validate_reminder_time("none").unwrap(), None);
        assert_eq!(validate_reminder_time("NONE").unwrap(), None);
        // Not time-shaped at all
        assert_eq!(
            validate_reminder_time("morning"),
            Err(ValidationError::BadFormat)
        );
        assert_eq!(
            validate_reminder_time("8.30"),
            Err(ValidationError::BadFormat)
        );
        // Time-shaped but impossible
        assert_eq!(
            validate_reminder_time("24:00"),
            Err(ValidationError::OutOfRange)
        );
        assert_eq!(
            validate_reminder_time("12:60"),
            Err(ValidationError::OutOfRange)
        );
    }

    #[test]
    fn test_forward_transition_advances_and_pushes() {
        let mut s = session();
        let t = apply_event(&mut s, DialogEvent::Input("Run".to_string()), now());
        assert_eq!(
            t,
            Transition::Advanced {
                next: DialogStep::Description
            }
        );
        assert_eq!(s.step, DialogStep::Description);
        assert_eq!(s.draft.name.as_deref(), Some("Run"));
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn test_invalid_input_is_idempotent() {
        let mut s = session();
        let first = apply_event(&mut s, DialogEvent::Input("x".to_string()), now());
        let state_after_first = s.clone();
        let second = apply_event(&mut s, DialogEvent::Input("x".to_string()), now());
        assert_eq!(first, Transition::Invalid(ValidationError::TooShort));
        assert_eq!(second, first);
        assert_eq!(s, state_after_first);
        assert_eq!(s.step, DialogStep::Name);
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn test_back_from_first_step_signals_cannot_go_back() {
        let mut s = session();
        let t = apply_event(&mut s, DialogEvent::Back, now());
        assert_eq!(t, Transition::CannotGoBack);
        assert_eq!(s.step, DialogStep::Name);
    }

    #[test]
    fn test_cancel_from_any_step() {
        let mut s = session();
        apply_event(&mut s, DialogEvent::Input("Run".to_string()), now());
        let t = apply_event(&mut s, DialogEvent::Cancel, now());
        assert_eq!(t, Transition::Cancelled);
    }

    #[test]
    fn test_full_flow_reaches_commit() {
        let mut s = session();
        apply_event(&mut s, DialogEvent::Input("Read books".to_string()), now());
        apply_event(&mut s, DialogEvent::SkipDescription, now());
        apply_event(&mut s, DialogEvent::PickEmoji("📚".to_string()), now());
        apply_event(
            &mut s,
            DialogEvent::PickFrequency("daily".to_string()),
            now(),
        );
        let t = apply_event(&mut s, DialogEvent::PickTime("20:00".to_string()), now());
        match t {
            Transition::ReadyToCommit { habit } => {
                assert_eq!(habit.name, "Read books");
                assert_eq!(habit.emoji, "📚");
                assert_eq!(habit.frequency, Frequency::Daily);
                assert_eq!(habit.reminder_time, NaiveTime::from_hms_opt(20, 0, 0));
            }
            other => panic!("expected commit, got {other:?}"),
        }
        // The session itself is not cleared by the machine
        assert_eq!(s.step, DialogStep::ReminderTime);
    }

    #[test]
    fn test_commit_failure_leaves_session_resumable() {
        let mut s = session();
        apply_event(&mut s, DialogEvent::Input("Read".to_string()), now());
        apply_event(&mut s, DialogEvent::SkipDescription, now());
        apply_event(&mut s, DialogEvent::SkipEmoji, now());
        apply_event(
            &mut s,
            DialogEvent::PickFrequency("weekly".to_string()),
            now(),
        );
        let first = apply_event(&mut s, DialogEvent::PickTime("07:00".to_string()), now());
        assert!(matches!(first, Transition::ReadyToCommit { .. }));

        // Caller's store call failed; the session was kept. Retrying the
        // same step produces the same commit payload.
        let second = apply_event(&mut s, DialogEvent::PickTime("07:00".to_string()), now());
        assert_eq!(second, first);
    }

    #[test]
    fn test_mismatched_event_is_ignored() {
        let mut s = session();
        let t = apply_event(
            &mut s,
            DialogEvent::PickFrequency("daily".to_string()),
            now(),
        );
        assert_eq!(t, Transition::Ignored);
        assert_eq!(s.step, DialogStep::Name);
    }
}
