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

//! The **Pooled Executor**: a single poller task cooperating with a bounded
//! worker pool.
//!
//! [`PooledExecutor`] bridges the synchronous [`transport::Listener::poll`]
//! / [`transport::Listener::batch_poll`] calls to asynchronous dispatch
//! work: each poller iteration asks a [`Dispatch`] implementation to poll
//! the listener and build a [`Submission`] to run on the pool. Lifecycle
//! (`start`/`stop`/`wait`), in-flight bookkeeping, and shutdown are all
//! owned here; routing and filtering are not (see the `dispatch` crate).

mod pool;

use std::{sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use config::ExecutorConfig;
use futures::FutureExt;
use signal::Tombstone;
use task::InFlightSet;
use tokio::task::JoinHandle;
use transport::Listener;

use crate::pool::Pool;

/// All the errors that can occur while operating a [`PooledExecutor`].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The supplied configuration was invalid.
    #[error("invalid executor configuration (reason: {reason})")]
    InvalidConfig {
        /// The reason the configuration was rejected.
        reason: String,
    },
}

/// A callback bound to one polled message or batch: `run` performs the
/// routing and handler invocation, `done` performs the post-dispatch
/// acknowledgement or requeue. The executor guarantees exactly one `done`
/// call per submission attempt, whether or not `run` ever executed.
#[async_trait]
pub trait Submission: Send + Sync + 'static {
    /// Executes the dispatch work for the bound message(s).
    async fn run(&self);
    /// Finalizes the bound message(s) (acknowledge or requeue). Called
    /// exactly once, after `run` completes, or immediately if submission to
    /// the pool failed.
    async fn done(&self);
}

/// The poller-facing half of a notification dispatcher: owns the decision
/// of whether to call [`Listener::poll`] or [`Listener::batch_poll`] (and
/// with what batch parameters), and turns whatever was polled into a
/// [`Submission`].
#[async_trait]
pub trait Dispatch<L: Listener>: Send + Sync + 'static {
    /// Polls `listener` once and returns the [`Submission`] for what was
    /// polled, or `None` if nothing was available this iteration.
    async fn poll_and_dispatch(&self, listener: &L) -> Option<Box<dyn Submission>>;
}

#[derive(Default)]
struct PollerHandle {
    handle: Option<JoinHandle<()>>,
}

/// A poller task cooperating with a bounded worker pool.
///
/// Construct one per `(listener, dispatch)` pair, call [`PooledExecutor::start`]
/// to begin polling, [`PooledExecutor::stop`] to request shutdown, and
/// [`PooledExecutor::wait`] to drain outstanding work deterministically.
pub struct PooledExecutor<L, D>
where
    L: Listener + 'static,
    D: Dispatch<L> + 'static,
{
    listener: Arc<L>,
    dispatch: Arc<D>,
    config: ExecutorConfig,
    tombstone: Tombstone,
    inflight: InFlightSet,
    pool: Arc<Mutex<Option<Pool>>>,
    poller: Arc<Mutex<PollerHandle>>,
}

impl<L, D> PooledExecutor<L, D>
where
    L: Listener + Send + Sync + 'static,
    D: Dispatch<L> + Send + Sync + 'static,
{
    /// Creates a new executor, not yet started. Rejects a configuration
    /// whose `executor_thread_pool_size` is not `>= 1`.
    pub fn new(config: ExecutorConfig, listener: L, dispatch: D) -> Result<Self, Error> {
        config.validate().map_err(|error| Error::InvalidConfig { reason: error.to_string() })?;
        Ok(Self {
            listener: Arc::new(listener),
            dispatch: Arc::new(dispatch),
            config,
            tombstone: Tombstone::new(),
            inflight: InFlightSet::new(),
            pool: Arc::new(Mutex::new(None)),
            poller: Arc::new(Mutex::new(PollerHandle::default())),
        })
    }

    /// Idempotent activation: lazily builds the pool, clears the tombstone,
    /// and spawns the poller if it is not already alive. Safe to call again
    /// after a successful [`PooledExecutor::wait`].
    pub fn start(&self) {
        {
            let mut pool = self.pool.lock().expect("executor pool mutex poisoned");
            if pool.is_none() {
                *pool = Some(Pool::new(self.config.executor_thread_pool_size));
            }
        }
        self.tombstone.clear();

        let mut poller = self.poller.lock().expect("executor poller mutex poisoned");
        let already_alive = poller.handle.as_ref().is_some_and(|h| !h.is_finished());
        if already_alive {
            return;
        }

        let listener = self.listener.clone();
        let dispatch = self.dispatch.clone();
        let tombstone = self.tombstone.clone();
        let inflight = self.inflight.clone();
        let pool = self.pool.clone();
        poller.handle = Some(tokio::spawn(run_poller(listener, dispatch, tombstone, inflight, pool)));
        tracing::info!("pooled executor started");
    }

    /// Requests shutdown: stops the pool from accepting new work, sets the
    /// tombstone, and stops the listener. Non-blocking; call
    /// [`PooledExecutor::wait`] to observe completion. Idempotent.
    pub async fn stop(&self) {
        if let Some(pool) = self.pool.lock().expect("executor pool mutex poisoned").as_ref() {
            pool.shutdown();
        }
        self.tombstone.set();
        self.listener.stop().await;
        tracing::info!("pooled executor stop requested");
    }

    /// Drains the executor: waits for the tombstone, joins the poller, then
    /// waits for every in-flight task, all within `timeout` (or forever if
    /// `None`). Returns `true` iff every phase completed in time; the caller
    /// may call `wait` again to continue a drain that timed out.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let stopwatch = std::time::Instant::now();
        let remaining = |timeout: Option<Duration>| timeout.map(|total| total.saturating_sub(stopwatch.elapsed()));

        if !self.tombstone.wait(remaining(timeout)).await {
            return false;
        }

        let poller_handle = self.poller.lock().expect("executor poller mutex poisoned").handle.take();
        if let Some(mut handle) = poller_handle {
            let joined = match remaining(timeout) {
                None => {
                    let _ = (&mut handle).await;
                    true
                }
                Some(duration) => tokio::time::timeout(duration, &mut handle).await.is_ok(),
            };
            if !joined {
                // The poller task is still running (or still being awaited):
                // put the handle back so a later `wait()` call keeps tracking
                // it instead of treating it as already joined.
                self.poller.lock().expect("executor poller mutex poisoned").handle = Some(handle);
                return false;
            }
        }

        let snapshot = self.inflight.snapshot();
        let (_, pending) = task::waiter::wait(&self.inflight, snapshot, remaining(timeout)).await;
        if !pending.is_empty() {
            return false;
        }

        *self.pool.lock().expect("executor pool mutex poisoned") = None;
        tracing::info!("pooled executor drained");
        true
    }

    /// The number of worker tasks currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }
}

async fn run_poller<L, D>(listener: Arc<L>, dispatch: Arc<D>, tombstone: Tombstone, inflight: InFlightSet, pool: Arc<Mutex<Option<Pool>>>)
where
    L: Listener + Send + Sync + 'static,
    D: Dispatch<L> + Send + Sync + 'static,
{
    loop {
        if tombstone.is_set() {
            break;
        }

        let iteration = std::panic::AssertUnwindSafe(poll_once(&listener, &dispatch, &inflight, &pool))
            .catch_unwind()
            .await;

        match iteration {
            Ok(true) => continue,
            Ok(false) => break,
            Err(panic) => {
                tracing::error!(?panic, "poller loop iteration panicked, restarting");
                continue;
            }
        }
    }
    tracing::info!("poller loop exited");
}

/// Polls for one message (or batch), submits it, and reports whether the
/// poller should continue. Returns `false` only when submission discovers
/// the pool has been shut down.
async fn poll_once<L, D>(listener: &Arc<L>, dispatch: &Arc<D>, inflight: &InFlightSet, pool: &Arc<Mutex<Option<Pool>>>) -> bool
where
    L: Listener + Send + Sync + 'static,
    D: Dispatch<L> + Send + Sync + 'static,
{
    match dispatch.poll_and_dispatch(listener).await {
        None => true,
        Some(submission) => do_submit(Arc::from(submission), inflight, pool).await,
    }
}

async fn do_submit(callback: Arc<dyn Submission>, inflight: &InFlightSet, pool: &Arc<Mutex<Option<Pool>>>) -> bool {
    let pool_handle = pool.lock().expect("executor pool mutex poisoned").clone();
    let Some(pool_handle) = pool_handle else {
        callback.done().await;
        return false;
    };

    let id = inflight.register();
    let cb_run = callback.clone();
    let spawned = pool_handle.try_run(async move {
        cb_run.run().await;
    });

    let Some(handle) = spawned else {
        inflight.remove(id);
        callback.done().await;
        tracing::warn!("submission rejected: pool is shut down, message finalized without running handlers");
        return false;
    };

    let inflight = inflight.clone();
    let cb_done = callback.clone();
    let _tracker: JoinHandle<()> = tokio::spawn(async move {
        if let Err(panic) = handle.await {
            tracing::error!(?panic, "submitted task panicked");
        }
        inflight.remove(id);
        cb_done.done().await;
    });
    true
}

#[cfg(test)]
mod test {
    use super::*;

    struct DummyMessage;

    #[async_trait]
    impl transport::IncomingMessage for DummyMessage {
        type RawCtxt = ();
        type RawPayload = ();

        fn raw_ctxt(&self) -> &() {
            &()
        }

        fn raw_payload(&self) -> &() {
            &()
        }

        fn publisher_id(&self) -> Option<&str> {
            None
        }

        fn event_type(&self) -> Option<&str> {
            None
        }

        fn message_id(&self) -> Option<&str> {
            None
        }

        fn timestamp(&self) -> Option<&str> {
            None
        }

        fn priority(&self) -> Option<&str> {
            None
        }

        async fn acknowledge(&self) -> Result<(), transport::Error> {
            Ok(())
        }

        async fn requeue(&self) -> Result<(), transport::Error> {
            Ok(())
        }
    }

    struct NeverPolls;

    #[async_trait]
    impl Listener for NeverPolls {
        type Message = DummyMessage;

        async fn poll(&self) -> Option<Self::Message> {
            None
        }

        async fn batch_poll(&self, _size: usize, _timeout: Option<Duration>) -> Vec<Self::Message> {
            Vec::new()
        }

        async fn stop(&self) {}
    }

    struct NoSubmissions;

    #[async_trait]
    impl Dispatch<NeverPolls> for NoSubmissions {
        async fn poll_and_dispatch(&self, listener: &NeverPolls) -> Option<Box<dyn Submission>> {
            listener.poll().await.map(|_| unreachable!())
        }
    }

    #[test]
    fn new_rejects_a_zero_thread_pool_size() {
        let config = ExecutorConfig {
            executor_thread_pool_size: 0,
        };
        let error = PooledExecutor::new(config, NeverPolls, NoSubmissions).expect_err("a zero-sized pool must be rejected");
        assert!(matches!(error, Error::InvalidConfig { .. }));
    }

    #[test]
    fn new_accepts_the_default_config() {
        assert!(PooledExecutor::new(ExecutorConfig::default(), NeverPolls, NoSubmissions).is_ok());
    }
}
