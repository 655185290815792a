//! Bounded investigation queue for the frontier.
//!
//! Drop policy: drop-newest. A push into a full queue returns
//! [`PushOutcome::Dropped`] immediately; it never blocks and never evicts
//! entries already queued.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use followscout_common::ProfileId;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was full; the entry was discarded.
    Dropped,
}

#[derive(Debug)]
pub struct InvestigationQueue {
    entries: Mutex<VecDeque<ProfileId>>,
    capacity: usize,
    ready: Notify,
}

impl InvestigationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<ProfileId>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn try_push(&self, id: ProfileId) -> PushOutcome {
        {
            let mut entries = self.entries();
            if entries.len() >= self.capacity {
                return PushOutcome::Dropped;
            }
            entries.push_back(id);
        }
        self.ready.notify_one();
        PushOutcome::Queued
    }

    pub fn try_pop(&self) -> Option<ProfileId> {
        self.entries().pop_front()
    }

    /// Wait for the next entry. Returns `None` once `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<ProfileId> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(id) = self.try_pop() {
                return Some(id);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.ready.notified() => {}
            }
        }
    }
}
