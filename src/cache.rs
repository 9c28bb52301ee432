//! Parsed-record cache.
//!
//! Holds the last good record per task id plus the raw text of the most
//! recent `view`. Entries are dropped per id on mutation and wholesale when
//! the scheduler session is replaced, since a new process may have reloaded
//! its task table.
//!
//! Records are read outside the cache lock, so every store names the
//! [`RecordCache::epoch`] observed before its read began. A store is refused
//! when its id was invalidated, or the cache cleared, after that point.

use std::collections::HashMap;

use tracing::debug;

use crate::core::model::{Task, TaskId};

#[derive(Debug, Default)]
pub struct RecordCache {
    records: HashMap<TaskId, Task>,
    last_view: Option<(TaskId, String)>,
    generation: u64,
    /// Bumped by every invalidation and clear.
    epoch: u64,
    invalidated_at: HashMap<TaskId, u64>,
    cleared_at: u64,
}

impl RecordCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for `id`.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        let hit = self.records.get(&id);
        if hit.is_some() {
            debug!(id, "record cache hit");
        }
        hit
    }

    /// Current position in the invalidation history.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stores `task` unless it went stale after `since`.
    ///
    /// Returns true if the record was stored.
    pub fn put_since(&mut self, task: Task, since: u64) -> bool {
        if !self.is_fresh(task.id, since) {
            debug!(id = task.id, since, epoch = self.epoch, "dropping record read before a mutation");
            return false;
        }
        self.records.insert(task.id, task);
        true
    }

    /// Remembers the raw `view` output captured for `id`, under the same
    /// staleness rule as [`RecordCache::put_since`].
    pub fn remember_view_since(&mut self, id: TaskId, text: impl Into<String>, since: u64) {
        if self.is_fresh(id, since) {
            self.last_view = Some((id, text.into()));
        }
    }

    fn is_fresh(&self, id: TaskId, since: u64) -> bool {
        self.cleared_at <= since && self.invalidated_at.get(&id).is_none_or(|at| *at <= since)
    }

    /// Raw `view` text, if the last one was for `id`.
    #[must_use]
    pub fn last_view(&self, id: TaskId) -> Option<&str> {
        match &self.last_view {
            Some((view_id, text)) if *view_id == id => Some(text),
            _ => None,
        }
    }

    /// Drops everything known about `id`.
    pub fn invalidate(&mut self, id: TaskId) {
        self.epoch += 1;
        self.invalidated_at.insert(id, self.epoch);
        let removed = self.records.remove(&id).is_some();
        if self.last_view.as_ref().is_some_and(|(view_id, _)| *view_id == id) {
            self.last_view = None;
        }
        debug!(id, removed, "record cache invalidated");
    }

    pub fn clear(&mut self) {
        self.epoch += 1;
        self.cleared_at = self.epoch;
        self.invalidated_at.clear();
        self.records.clear();
        self.last_view = None;
    }

    /// Clears the cache if the session generation moved.
    ///
    /// Returns true if it was cleared.
    pub fn sync_generation(&mut self, generation: u64) -> bool {
        if generation == self.generation {
            return false;
        }
        if !self.records.is_empty() || self.last_view.is_some() {
            debug!(from = self.generation, to = generation, "session replaced; clearing record cache");
        }
        self.generation = generation;
        self.clear();
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
