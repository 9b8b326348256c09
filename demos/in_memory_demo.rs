//! A complete, runnable wiring of the dispatch core: an in-memory transport
//! feeding a `PooledExecutor` running a single-message `NotificationDispatcher`
//! over two endpoints, one of them filtered.
//!
//! Run with `cargo run --example in_memory_demo`.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use color_eyre::eyre::Result;
use config::ExecutorConfig;
use dispatch::NotificationDispatcher;
use endpoint::{Endpoint, Handler, Verdict};
use executor::PooledExecutor;
use filter::{FilterRule, Metadata, Priority};
use tokio::sync::Mutex;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use transport::{IncomingMessage, Listener, NoOpSerializer};

/// One notification, as it would arrive from a real transport: nothing
/// decoded yet, context and payload both plain strings.
#[derive(Debug, Clone)]
struct RawNotification {
    ctxt: String,
    publisher_id: Option<String>,
    event_type: Option<String>,
    priority: Option<String>,
    message_id: Option<String>,
    payload: String,
}

struct InMemoryIncoming {
    raw: RawNotification,
    acknowledged: Arc<AtomicUsize>,
    requeued: Arc<AtomicUsize>,
}

#[async_trait]
impl IncomingMessage for InMemoryIncoming {
    type RawCtxt = String;
    type RawPayload = String;

    fn raw_ctxt(&self) -> &String {
        &self.raw.ctxt
    }

    fn raw_payload(&self) -> &String {
        &self.raw.payload
    }

    fn publisher_id(&self) -> Option<&str> {
        self.raw.publisher_id.as_deref()
    }

    fn event_type(&self) -> Option<&str> {
        self.raw.event_type.as_deref()
    }

    fn message_id(&self) -> Option<&str> {
        self.raw.message_id.as_deref()
    }

    fn timestamp(&self) -> Option<&str> {
        None
    }

    fn priority(&self) -> Option<&str> {
        self.raw.priority.as_deref()
    }

    async fn acknowledge(&self) -> Result<(), transport::Error> {
        let _ = self.acknowledged.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(message_id = ?self.raw.message_id, "acknowledged");
        Ok(())
    }

    async fn requeue(&self) -> Result<(), transport::Error> {
        let _ = self.requeued.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(message_id = ?self.raw.message_id, "requeued");
        Ok(())
    }
}

/// A transport backed by an in-process queue: `push` simulates messages
/// arriving, `poll`/`batch_poll` hand them to the executor.
#[derive(Clone, Default)]
struct InMemoryTransport {
    queue: Arc<Mutex<VecDeque<RawNotification>>>,
    acknowledged: Arc<AtomicUsize>,
    requeued: Arc<AtomicUsize>,
}

impl InMemoryTransport {
    async fn push(&self, raw: RawNotification) {
        self.queue.lock().await.push_back(raw);
    }

    fn wrap(&self, raw: RawNotification) -> InMemoryIncoming {
        InMemoryIncoming {
            raw,
            acknowledged: self.acknowledged.clone(),
            requeued: self.requeued.clone(),
        }
    }
}

#[async_trait]
impl Listener for InMemoryTransport {
    type Message = InMemoryIncoming;

    async fn poll(&self) -> Option<InMemoryIncoming> {
        let raw = self.queue.lock().await.pop_front()?;
        Some(self.wrap(raw))
    }

    async fn batch_poll(&self, size: usize, _timeout: Option<Duration>) -> Vec<InMemoryIncoming> {
        let mut queue = self.queue.lock().await;
        (0..size).filter_map(|_| queue.pop_front()).map(|raw| self.wrap(raw)).collect()
    }

    async fn stop(&self) {
        tracing::info!("transport stopped");
    }
}

/// Logs every `info` notification it sees.
struct LoggingEndpoint;

#[async_trait]
impl Handler<String, String> for LoggingEndpoint {
    async fn handle(&self, ctxt: &String, publisher_id: Option<&str>, _event_type: Option<&str>, payload: &String, _metadata: &Metadata) -> Option<Verdict> {
        tracing::info!(%ctxt, ?publisher_id, %payload, "handled info notification");
        None
    }
}

impl Endpoint<String, String> for LoggingEndpoint {
    fn handlers(&self) -> std::collections::HashMap<Priority, Arc<dyn Handler<String, String>>> {
        let mut map: std::collections::HashMap<Priority, Arc<dyn Handler<String, String>>> = std::collections::HashMap::new();
        let _ = map.insert(Priority::Info, Arc::new(LoggingEndpoint));
        map
    }
}

/// Only sees notifications published by `"billing"`.
struct BillingOnlyFilter;

impl FilterRule<String, String> for BillingOnlyFilter {
    fn matches(&self, _ctxt: &String, publisher_id: Option<&str>, _event_type: Option<&str>, _metadata: &Metadata, _payload: &String) -> bool {
        publisher_id == Some("billing")
    }
}

struct BillingEndpoint;

#[async_trait]
impl Handler<String, String> for BillingEndpoint {
    async fn handle(&self, _ctxt: &String, publisher_id: Option<&str>, _event_type: Option<&str>, payload: &String, _metadata: &Metadata) -> Option<Verdict> {
        tracing::info!(?publisher_id, %payload, "handled billing-only info notification");
        None
    }
}

impl Endpoint<String, String> for BillingEndpoint {
    fn handlers(&self) -> std::collections::HashMap<Priority, Arc<dyn Handler<String, String>>> {
        let mut map: std::collections::HashMap<Priority, Arc<dyn Handler<String, String>>> = std::collections::HashMap::new();
        let _ = map.insert(Priority::Info, Arc::new(BillingEndpoint));
        map
    }

    fn filter_rule(&self) -> Option<Arc<dyn FilterRule<String, String>>> {
        Some(Arc::new(BillingOnlyFilter))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let transport = InMemoryTransport::default();

    for (index, publisher) in ["checkout", "billing", "checkout"].into_iter().enumerate() {
        transport
            .push(RawNotification {
                ctxt: "demo-ctxt".to_string(),
                publisher_id: Some(publisher.to_string()),
                event_type: Some("order.updated".to_string()),
                priority: Some("INFO".to_string()),
                message_id: Some(format!("msg-{index}")),
                payload: format!("payload-{index}"),
            })
            .await;
    }

    let endpoints: Vec<Arc<dyn Endpoint<String, String>>> = vec![Arc::new(LoggingEndpoint), Arc::new(BillingEndpoint)];
    let dispatcher = NotificationDispatcher::new(vec!["demo-target".to_string()], endpoints, NoOpSerializer, false);

    let executor = PooledExecutor::new(ExecutorConfig::default(), transport.clone(), dispatcher)?;
    executor.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    executor.stop().await;
    assert!(executor.wait(Some(Duration::from_secs(5))).await, "executor failed to drain in time");

    tracing::info!(
        acknowledged = transport.acknowledged.load(Ordering::SeqCst),
        requeued = transport.requeued.load(Ordering::SeqCst),
        "demo complete"
    );

    Ok(())
}
