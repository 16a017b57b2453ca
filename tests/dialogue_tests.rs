use chrono::{DateTime, TimeZone, Utc};

use habitmax::dialogue::{apply_event, DialogEvent, Transition, ValidationError};
use habitmax::models::Frequency;
use habitmax::session::{BackStack, DialogSession, DialogStep, HabitDraft, MAX_HISTORY};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn forward(session: &mut DialogSession, event: DialogEvent) {
    match apply_event(session, event, now()) {
        Transition::Advanced { .. } => {}
        other => panic!("expected a forward transition, got {other:?}"),
    }
}

/// N forward transitions followed by N back transitions return the session
/// to its initial step and fields, for every N the back stack can hold
#[test]
fn test_back_stack_soundness() {
    for n in [1usize, 5, 9] {
        let initial_step = DialogStep::Name;
        let initial_draft = HabitDraft::default();

        let mut stack = BackStack::default();
        stack.push(initial_step, initial_draft.clone(), now());

        // N forward snapshots, each with a distinct draft
        let mut step = initial_step;
        for i in 0..n {
            let mut draft = HabitDraft::default();
            draft.name = Some(format!("habit {i}"));
            step = step.next().unwrap_or(DialogStep::Name);
            stack.push(step, draft, now());
        }
        assert!(stack.len() <= MAX_HISTORY);

        // N backs restore the initial snapshot
        let mut restored = None;
        for _ in 0..n {
            restored = stack.pop().cloned();
        }
        let restored = restored.expect("back stack exhausted too early");
        assert_eq!(restored.step, initial_step);
        assert_eq!(restored.draft, initial_draft);
    }
}

/// Back navigation through the real dialogue flow restores each snapshot
#[test]
fn test_session_forward_back_round_trip() {
    let mut session = DialogSession::new(1, now());

    forward(&mut session, DialogEvent::Input("Morning run".to_string()));
    forward(&mut session, DialogEvent::Input("Around the block".to_string()));
    forward(&mut session, DialogEvent::PickEmoji("🏃".to_string()));
    forward(&mut session, DialogEvent::PickFrequency("daily".to_string()));
    assert_eq!(session.step, DialogStep::ReminderTime);

    for expected in [
        DialogStep::Frequency,
        DialogStep::Emoji,
        DialogStep::Description,
        DialogStep::Name,
    ] {
        match apply_event(&mut session, DialogEvent::Back, now()) {
            Transition::SteppedBack { restored } => assert_eq!(restored, expected),
            other => panic!("expected a back transition, got {other:?}"),
        }
    }

    assert_eq!(session.step, DialogStep::Name);
    assert_eq!(session.draft, HabitDraft::default());
}

/// Pressing back at the first step never clears or mutates fields
#[test]
fn test_back_from_first_step_is_noop() {
    let mut session = DialogSession::new(1, now());
    let before = session.clone();
    assert_eq!(
        apply_event(&mut session, DialogEvent::Back, now()),
        Transition::CannotGoBack
    );
    assert_eq!(session, before);
}

/// The same invalid input twice produces the same error code and leaves the
/// step unchanged both times
#[test]
fn test_validation_idempotence() {
    let mut session = DialogSession::new(1, now());
    let bad = DialogEvent::Input("/definitely-a-command".to_string());

    let first = apply_event(&mut session, bad.clone(), now());
    let second = apply_event(&mut session, bad, now());

    assert_eq!(
        first,
        Transition::Invalid(ValidationError::ForbiddenPrefix)
    );
    assert_eq!(second, first);
    assert_eq!(session.step, DialogStep::Name);
    assert_eq!(session.history.len(), 1);
}

/// Every validation error carries its machine-readable code
#[test]
fn test_error_codes_are_stable() {
    assert_eq!(ValidationError::TooShort.code(), "too_short");
    assert_eq!(ValidationError::TooLong.code(), "too_long");
    assert_eq!(ValidationError::BadFormat.code(), "bad_format");
    assert_eq!(ValidationError::OutOfRange.code(), "out_of_range");
    assert_eq!(ValidationError::ForbiddenPrefix.code(), "forbidden_prefix");
}

/// A complete pass through the dialogue assembles the commit payload with
/// skipped steps defaulted
#[test]
fn test_full_flow_with_skips() {
    let mut session = DialogSession::new(1, now());
    forward(&mut session, DialogEvent::Input("Drink water".to_string()));
    forward(&mut session, DialogEvent::SkipDescription);
    forward(&mut session, DialogEvent::SkipEmoji);
    forward(&mut session, DialogEvent::PickFrequency("weekdays".to_string()));

    match apply_event(&mut session, DialogEvent::PickTime("none".to_string()), now()) {
        Transition::ReadyToCommit { habit } => {
            assert_eq!(habit.name, "Drink water");
            assert_eq!(habit.emoji, "✅");
            assert_eq!(habit.frequency, Frequency::Weekdays);
            assert!(habit.description.is_none());
            assert!(habit.reminder_time.is_none());
        }
        other => panic!("expected commit, got {other:?}"),
    }
}

/// A failed commit leaves the session at the reminder-time step with every
/// collected field intact, so the user can simply resubmit
#[test]
fn test_commit_atomicity_session_side() {
    let mut session = DialogSession::new(1, now());
    forward(&mut session, DialogEvent::Input("Meditate".to_string()));
    forward(&mut session, DialogEvent::Input("Ten minutes".to_string()));
    forward(&mut session, DialogEvent::PickEmoji("🧘".to_string()));
    forward(&mut session, DialogEvent::PickFrequency("daily".to_string()));

    let first = apply_event(&mut session, DialogEvent::PickTime("08:30".to_string()), now());
    assert!(matches!(first, Transition::ReadyToCommit { .. }));

    // Simulated store failure: the caller keeps the session. Nothing was
    // lost and the retry yields the identical payload.
    assert_eq!(session.step, DialogStep::ReminderTime);
    assert_eq!(session.draft.name.as_deref(), Some("Meditate"));
    let retry = apply_event(&mut session, DialogEvent::PickTime("08:30".to_string()), now());
    assert_eq!(retry, first);
}

/// Cancel clears unconditionally from any step (here: mid-flow)
#[test]
fn test_cancel_mid_flow() {
    let mut session = DialogSession::new(1, now());
    forward(&mut session, DialogEvent::Input("Stretch".to_string()));
    forward(&mut session, DialogEvent::Input("Neck and back".to_string()));
    assert_eq!(
        apply_event(&mut session, DialogEvent::Cancel, now()),
        Transition::Cancelled
    );
}
