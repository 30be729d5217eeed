// src/engine/queue.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dag::RunId;

/// Gate between materialized logical times and active runs.
///
/// Semantics:
/// - Each logical time is accepted at most once over the queue's lifetime;
///   later duplicates are ignored.
/// - Accepted times wait in FIFO order until a slot frees up.
/// - At most `max_active` runs are active at any time.
///
/// The queue is pure bookkeeping; the [`Scheduler`](super::Scheduler) decides
/// when to call it.
#[derive(Debug)]
pub struct RunQueue {
    max_active: usize,
    pending: VecDeque<DateTime<Utc>>,
    active: BTreeMap<RunId, DateTime<Utc>>,
    materialized: BTreeSet<DateTime<Utc>>,
    peak_active: usize,
}

impl RunQueue {
    /// `max_active` is clamped to at least 1.
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active: max_active.max(1),
            pending: VecDeque::new(),
            active: BTreeMap::new(),
            materialized: BTreeSet::new(),
            peak_active: 0,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Queue a run for `logical_time`. Returns `false` if that time was
    /// already queued, active or finished.
    pub fn enqueue(&mut self, logical_time: DateTime<Utc>) -> bool {
        if !self.materialized.insert(logical_time) {
            debug!(%logical_time, "run already materialized; ignoring");
            return false;
        }
        self.pending.push_back(logical_time);
        true
    }

    /// Activate the oldest pending run under `run_id` if a slot is free.
    pub fn next_startable(&mut self, run_id: RunId) -> Option<DateTime<Utc>> {
        if self.active.len() >= self.max_active {
            return None;
        }
        let logical_time = self.pending.pop_front()?;
        self.active.insert(run_id, logical_time);
        self.peak_active = self.peak_active.max(self.active.len());
        Some(logical_time)
    }

    /// Release the slot held by `run_id`.
    pub fn finish(&mut self, run_id: RunId) -> Option<DateTime<Utc>> {
        self.active.remove(&run_id)
    }

    /// Drop every pending run; returns how many were dropped. Dropped times
    /// stay materialized and will not be accepted again.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// No active and no pending runs.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty() && self.pending.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Highest number of simultaneously active runs seen so far.
    pub fn peak_active(&self) -> usize {
        self.peak_active
    }
}
