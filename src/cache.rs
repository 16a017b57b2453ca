//! Completion-status cache for low-latency list rendering.
//!
//! One component owns today's completion answers, keyed by
//! `(user_id, habit_id)`; every log write for a habit invalidates its
//! entry. An entry only answers for the exact date it was stored with, so
//! a cached "yesterday" can never leak into today's list.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

#[derive(Debug, Default)]
pub struct CompletionCache {
    inner: Mutex<HashMap<(i64, i64), (NaiveDate, bool)>>,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached completion status for the habit on `date`, if known
    pub fn get(&self, user_id: i64, habit_id: i64, date: NaiveDate) -> Option<bool> {
        let inner = self.inner.lock().unwrap();
        match inner.get(&(user_id, habit_id)) {
            Some((cached_date, completed)) if *cached_date == date => Some(*completed),
            _ => None,
        }
    }

    pub fn put(&self, user_id: i64, habit_id: i64, date: NaiveDate, completed: bool) {
        self.inner
            .lock()
            .unwrap()
            .insert((user_id, habit_id), (date, completed));
    }

    /// Drop the entry after any log write for the habit
    pub fn invalidate(&self, user_id: i64, habit_id: i64) {
        self.inner.lock().unwrap().remove(&(user_id, habit_id));
    }
}
