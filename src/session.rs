//! # Dialogue Session Module
//!
//! Per-user conversation state for the multi-step "add habit" flow: the
//! typed field buffer, the bounded back-navigation stack and the in-memory
//! session store. One session exists per user at a time; starting a new
//! dialogue replaces any active one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{Frequency, DEFAULT_EMOJI};

/// Maximum number of snapshots kept for back navigation
pub const MAX_HISTORY: usize = 10;

/// Steps of the add-habit dialogue, in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogStep {
    Name,
    Description,
    Emoji,
    Frequency,
    ReminderTime,
}

impl DialogStep {
    pub fn next(&self) -> Option<DialogStep> {
        match self {
            DialogStep::Name => Some(DialogStep::Description),
            DialogStep::Description => Some(DialogStep::Emoji),
            DialogStep::Emoji => Some(DialogStep::Frequency),
            DialogStep::Frequency => Some(DialogStep::ReminderTime),
            DialogStep::ReminderTime => None,
        }
    }

    /// 1-based position for "Step N/5" prompts
    pub fn number(&self) -> u8 {
        match self {
            DialogStep::Name => 1,
            DialogStep::Description => 2,
            DialogStep::Emoji => 3,
            DialogStep::Frequency => 4,
            DialogStep::ReminderTime => 5,
        }
    }
}

/// Fields collected so far, one optional slot per step. The nested options on
/// `description` and `reminder_time` distinguish "not asked yet" (outer
/// `None`) from "explicitly skipped" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitDraft {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub emoji: Option<String>,
    pub frequency: Option<Frequency>,
    pub reminder_time: Option<Option<NaiveTime>>,
}

/// Values assembled for the final commit, with step defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct NewHabit {
    pub name: String,
    pub description: Option<String>,
    pub emoji: String,
    pub frequency: Frequency,
    pub reminder_time: Option<NaiveTime>,
}

impl HabitDraft {
    /// Assemble the commit payload. The name must have been collected;
    /// emoji and frequency fall back to their defaults when skipped.
    pub fn finalize(&self) -> Option<NewHabit> {
        Some(NewHabit {
            name: self.name.clone()?,
            description: self.description.clone().flatten(),
            emoji: self
                .emoji
                .clone()
                .unwrap_or_else(|| DEFAULT_EMOJI.to_string()),
            frequency: self.frequency.unwrap_or(Frequency::Daily),
            reminder_time: self.reminder_time.flatten(),
        })
    }
}

/// One snapshot on the back stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: DialogStep,
    pub draft: HabitDraft,
    pub pushed_at: DateTime<Utc>,
}

/// Bounded stack of `(step, draft)` snapshots. The top entry always mirrors
/// the session's current state, so "back" needs at least two entries: the
/// current one to discard and the previous one to restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackStack {
    entries: Vec<HistoryEntry>,
}

impl BackStack {
    pub fn push(&mut self, step: DialogStep, draft: HabitDraft, now: DateTime<Utc>) {
        self.entries.push(HistoryEntry {
            step,
            draft,
            pushed_at: now,
        });
        if self.entries.len() > MAX_HISTORY {
            self.entries.remove(0);
        }
    }

    /// Discard the current snapshot and return the previous one.
    /// Returns `None` when already at the first recorded step.
    pub fn pop(&mut self) -> Option<&HistoryEntry> {
        if self.entries.len() < 2 {
            return None;
        }
        self.entries.pop();
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The ephemeral state of one user's dialogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogSession {
    pub user_id: i64,
    pub step: DialogStep,
    pub draft: HabitDraft,
    pub history: BackStack,
    /// Updated on every processed event; `None` until the first touch
    pub last_activity: Option<DateTime<Utc>>,
}

impl DialogSession {
    /// Create a fresh session at the first step, with the initial snapshot
    /// seeded so that the back stack always mirrors the current state
    pub fn new(user_id: i64, now: DateTime<Utc>) -> Self {
        let mut session = Self {
            user_id,
            step: DialogStep::Name,
            draft: HabitDraft::default(),
            history: BackStack::default(),
            last_activity: None,
        };
        session.history.push(session.step, session.draft.clone(), now);
        session
    }

    /// Record the new state after a forward transition
    pub fn advance(&mut self, next: DialogStep, now: DateTime<Utc>) {
        self.step = next;
        self.history.push(next, self.draft.clone(), now);
    }

    /// Restore the previous snapshot. Returns `false` when there is nothing
    /// to go back to; the session is left untouched in that case.
    pub fn step_back(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.step = previous.step;
                self.draft = previous.draft.clone();
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = Some(now);
    }
}

/// In-memory session store keyed by user id, last write wins. Sessions are
/// exclusively owned by the dialogue path for one user, so a plain mutex
/// around the map suffices; per-user event ordering is enforced by
/// [`UserGate`].
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, DialogSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new dialogue for the user, replacing any active session
    pub fn start(&self, user_id: i64, now: DateTime<Utc>) -> DialogSession {
        let session = DialogSession::new(user_id, now);
        self.inner
            .lock()
            .unwrap()
            .insert(user_id, session.clone());
        session
    }

    pub fn get(&self, user_id: i64) -> Option<DialogSession> {
        self.inner.lock().unwrap().get(&user_id).cloned()
    }

    pub fn put(&self, session: DialogSession) {
        self.inner
            .lock()
            .unwrap()
            .insert(session.user_id, session);
    }

    pub fn clear(&self, user_id: i64) -> bool {
        self.inner.lock().unwrap().remove(&user_id).is_some()
    }
}

/// Per-user sequencing guard. The dispatcher may run handlers on a
/// multi-threaded runtime; holding the user's gate for the duration of one
/// event guarantees no two events for the same user interleave.
#[derive(Debug, Default)]
pub struct UserGate {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl UserGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            Arc::clone(
                locks
                    .entry(user_id)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}
