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

//! A tombstone is a one-shot, level-triggered signal used to ask a
//! long-running task to stop. Unlike a one-shot channel, it can be
//! `set`/`clear`'d repeatedly across the lifetime of the task it guards, and
//! any number of waiters can observe it becoming set.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Notify;

/// A one-shot signal that can be set, cleared, and waited on by any number
/// of observers.
#[derive(Clone, Default)]
pub struct Tombstone {
    set: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Tombstone {
    /// Creates a new, unset tombstone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tombstone and wakes every current waiter.
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
        tracing::trace!("tombstone set");
        self.notify.notify_waiters();
    }

    /// Clears the tombstone.
    pub fn clear(&self) {
        self.set.store(false, Ordering::SeqCst);
        tracing::trace!("tombstone cleared");
    }

    /// Returns whether the tombstone is currently set.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Waits until the tombstone is set, or `timeout` elapses.
    ///
    /// Returns `true` iff the tombstone was observed set before the
    /// deadline. A `timeout` of `None` blocks indefinitely.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let wait_for_set = async {
            loop {
                if self.is_set() {
                    return;
                }
                let notified = self.notify.notified();
                if self.is_set() {
                    return;
                }
                notified.await;
            }
        };

        match timeout {
            None => {
                wait_for_set.await;
                true
            }
            Some(duration) => tokio::time::timeout(duration, wait_for_set).await.is_ok(),
        }
    }
}
