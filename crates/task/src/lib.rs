#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Bookkeeping of submitted-but-not-yet-completed work.
//!
//! An [`InFlightSet`] tracks the identity of spawned tasks without owning
//! their [`tokio::task::JoinHandle`]: a task registers itself before it can
//! possibly observe its own completion, and removes itself exactly once when
//! done. This mirrors a thread pool's "incomplete futures" bookkeeping
//! without requiring the futures themselves to be shareable.

pub mod waiter;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::Notify;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {}

/// A set of outstanding task ids, with a wakeup signal fired on every
/// removal so waiters can efficiently block until specific ids (or all ids)
/// have drained.
#[derive(Clone, Default)]
pub struct InFlightSet {
    ids: Arc<Mutex<HashSet<u64>>>,
    next_id: Arc<AtomicU64>,
    drained: Arc<Notify>,
}

impl InFlightSet {
    /// Creates a new, empty in-flight set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently registered.
    pub fn len(&self) -> usize {
        self.ids.lock().expect("in-flight set mutex poisoned").len()
    }

    /// Whether the set currently holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves a fresh id and registers it as in flight. Must be called
    /// before the task identified by the returned id can possibly call
    /// [`InFlightSet::remove`] for that id, so that registration always
    /// happens-before removal.
    pub fn register(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.ids.lock().expect("in-flight set mutex poisoned").insert(id);
        tracing::trace!(task_id = id, "task registered as in-flight");
        id
    }

    /// Removes `id` from the set. Safe to call more than once for the same
    /// id: a second removal for an already-absent id is a no-op.
    pub fn remove(&self, id: u64) {
        let removed = self.ids.lock().expect("in-flight set mutex poisoned").remove(&id);
        if removed {
            tracing::trace!(task_id = id, "task removed from in-flight set");
        }
        // Notify regardless: a waiter may be re-checking an id that was
        // already removed by a previous, racing call.
        self.drained.notify_waiters();
    }

    /// A non-destructive snapshot of the ids currently registered.
    pub fn snapshot(&self) -> Vec<u64> {
        self.ids.lock().expect("in-flight set mutex poisoned").iter().copied().collect()
    }

    pub(crate) fn still_pending(&self, ids: &[u64]) -> Vec<u64> {
        let guard = self.ids.lock().expect("in-flight set mutex poisoned");
        ids.iter().copied().filter(|id| guard.contains(id)).collect()
    }

    pub(crate) async fn wait_until_drained(&self, ids: &[u64]) {
        loop {
            if self.still_pending(ids).is_empty() {
                return;
            }
            let notified = self.drained.notified();
            if self.still_pending(ids).is_empty() {
                return;
            }
            notified.await;
        }
    }
}
