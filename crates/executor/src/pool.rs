//! A bounded, shutdown-aware spawn pool.
//!
//! Submission never blocks and never queues on the caller's side: every
//! accepted submission is spawned immediately as its own Tokio task, which
//! then waits on a semaphore permit before running its body. This bounds
//! the number of *concurrently executing* submissions to the configured
//! pool size while letting Tokio's scheduler hold the backlog, the same
//! shape as a bounded thread pool's internal work queue.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{sync::Semaphore, task::JoinHandle};

#[derive(Clone)]
pub(crate) struct Pool {
    semaphore: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
}

impl Pool {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns `fut` gated by a permit, unless the pool has been shut down.
    /// Returns `None` to signal the caller that submission was rejected.
    pub(crate) fn try_run<F>(&self, fut: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return None;
        }

        let semaphore = self.semaphore.clone();
        Some(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("pool semaphore never closed");
            fut.await;
        }))
    }

    /// Stops the pool from accepting new work. Tasks already spawned (even
    /// those still waiting on a permit) are left to run to completion.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        tracing::debug!("executor pool shut down, no longer accepting submissions");
    }
}
