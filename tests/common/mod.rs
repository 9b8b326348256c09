//! Shared in-memory transport and recording endpoints for the dispatch core
//! integration tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use endpoint::{BatchEndpoint, BatchHandler, DecodedRecord, Endpoint, Handler, Verdict};
use filter::{FilterRule, Metadata, Priority};
use tokio::sync::Mutex;
use transport::{Error as TransportError, IncomingMessage, Listener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acknowledged,
    Requeued,
}

#[derive(Debug, Clone)]
pub struct RawNotification {
    pub id: &'static str,
    pub ctxt: String,
    pub publisher_id: Option<String>,
    pub priority: Option<String>,
    pub payload: String,
}

impl RawNotification {
    pub fn new(id: &'static str, priority: &str, payload: &str) -> Self {
        Self {
            id,
            ctxt: "ctxt".to_string(),
            publisher_id: None,
            priority: Some(priority.to_string()),
            payload: payload.to_string(),
        }
    }

    pub fn with_publisher(mut self, publisher_id: &str) -> Self {
        self.publisher_id = Some(publisher_id.to_string());
        self
    }
}

pub struct TestIncoming {
    raw: RawNotification,
    outcomes: Arc<Mutex<Vec<(&'static str, Outcome)>>>,
}

#[async_trait]
impl IncomingMessage for TestIncoming {
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
        None
    }

    fn message_id(&self) -> Option<&str> {
        Some(self.raw.id)
    }

    fn timestamp(&self) -> Option<&str> {
        None
    }

    fn priority(&self) -> Option<&str> {
        self.raw.priority.as_deref()
    }

    async fn acknowledge(&self) -> Result<(), TransportError> {
        self.outcomes.lock().await.push((self.raw.id, Outcome::Acknowledged));
        Ok(())
    }

    async fn requeue(&self) -> Result<(), TransportError> {
        self.outcomes.lock().await.push((self.raw.id, Outcome::Requeued));
        Ok(())
    }
}

/// A transport backed by an in-process queue, recording every
/// acknowledge/requeue outcome so tests can assert on it by message id.
#[derive(Clone, Default)]
pub struct TestTransport {
    queue: Arc<Mutex<VecDeque<RawNotification>>>,
    outcomes: Arc<Mutex<Vec<(&'static str, Outcome)>>>,
    stop_calls: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
}

impl TestTransport {
    pub async fn push(&self, raw: RawNotification) {
        self.queue.lock().await.push_back(raw);
    }

    pub async fn outcome_for(&self, id: &str) -> Option<Outcome> {
        self.outcomes.lock().await.iter().find(|(message_id, _)| *message_id == id).map(|(_, outcome)| *outcome)
    }

    pub async fn outcome_count(&self) -> usize {
        self.outcomes.lock().await.len()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn wrap(&self, raw: RawNotification) -> TestIncoming {
        TestIncoming {
            raw,
            outcomes: self.outcomes.clone(),
        }
    }
}

#[async_trait]
impl Listener for TestTransport {
    type Message = TestIncoming;

    async fn poll(&self) -> Option<TestIncoming> {
        let raw = self.queue.lock().await.pop_front()?;
        Some(self.wrap(raw))
    }

    async fn batch_poll(&self, size: usize, _timeout: Option<Duration>) -> Vec<TestIncoming> {
        let mut queue = self.queue.lock().await;
        (0..size).filter_map(|_| queue.pop_front()).map(|raw| self.wrap(raw)).collect()
    }

    async fn stop(&self) {
        let _ = self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// A transport whose `poll` always sleeps for a fixed delay before reporting
/// no message, simulating a poller iteration that is still in flight when
/// `stop()` is called.
#[derive(Clone)]
pub struct SlowPollTransport {
    delay: Duration,
}

impl SlowPollTransport {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Listener for SlowPollTransport {
    type Message = TestIncoming;

    async fn poll(&self) -> Option<TestIncoming> {
        tokio::time::sleep(self.delay).await;
        None
    }

    async fn batch_poll(&self, _size: usize, _timeout: Option<Duration>) -> Vec<TestIncoming> {
        tokio::time::sleep(self.delay).await;
        Vec::new()
    }

    async fn stop(&self) {}
}

/// Records every call it receives (as `(ctxt, publisher_id, payload)`
/// triples) and replies with a fixed verdict.
pub struct RecordingHandler {
    pub calls: Arc<Mutex<Vec<(String, Option<String>, String)>>>,
    pub verdict: Option<Verdict>,
}

impl RecordingHandler {
    pub fn new(verdict: Option<Verdict>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            verdict,
        }
    }
}

#[async_trait]
impl Handler<String, String> for RecordingHandler {
    async fn handle(&self, ctxt: &String, publisher_id: Option<&str>, _event_type: Option<&str>, payload: &String, _metadata: &Metadata) -> Option<Verdict> {
        self.calls.lock().await.push((ctxt.clone(), publisher_id.map(str::to_string), payload.clone()));
        self.verdict
    }
}

/// A handler that always panics, for exercising the forever-retry guard.
pub struct PanickingHandler;

#[async_trait]
impl Handler<String, String> for PanickingHandler {
    async fn handle(&self, _ctxt: &String, _publisher_id: Option<&str>, _event_type: Option<&str>, _payload: &String, _metadata: &Metadata) -> Option<Verdict> {
        panic!("handler exploded");
    }
}

/// A handler that sleeps before returning, for exercising concurrency bounds
/// and drain-on-shutdown.
pub struct SlowHandler {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<String, String> for SlowHandler {
    async fn handle(&self, _ctxt: &String, _publisher_id: Option<&str>, _event_type: Option<&str>, _payload: &String, _metadata: &Metadata) -> Option<Verdict> {
        tokio::time::sleep(self.delay).await;
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// A single-message endpoint registering one handler under one priority,
/// with an optional filter.
pub struct SingleEndpoint {
    priority: Priority,
    handler: Arc<dyn Handler<String, String>>,
    filter: Option<Arc<dyn FilterRule<String, String>>>,
}

impl SingleEndpoint {
    pub fn new(priority: Priority, handler: Arc<dyn Handler<String, String>>) -> Self {
        Self {
            priority,
            handler,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn FilterRule<String, String>>) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Endpoint<String, String> for SingleEndpoint {
    fn handlers(&self) -> HashMap<Priority, Arc<dyn Handler<String, String>>> {
        let mut map: HashMap<Priority, Arc<dyn Handler<String, String>>> = HashMap::new();
        let _ = map.insert(self.priority, self.handler.clone());
        map
    }

    fn filter_rule(&self) -> Option<Arc<dyn FilterRule<String, String>>> {
        self.filter.clone()
    }
}

/// Matches only messages published by a fixed publisher id.
pub struct PublisherIs(pub &'static str);

impl FilterRule<String, String> for PublisherIs {
    fn matches(&self, _ctxt: &String, publisher_id: Option<&str>, _event_type: Option<&str>, _metadata: &Metadata, _payload: &String) -> bool {
        publisher_id == Some(self.0)
    }
}

/// Records the size of every batch it is called with.
pub struct RecordingBatchHandler {
    pub calls: Arc<Mutex<Vec<usize>>>,
}

impl RecordingBatchHandler {
    pub fn new() -> Self {
        Self { calls: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait]
impl BatchHandler<String, String> for RecordingBatchHandler {
    async fn handle(&self, records: &[DecodedRecord<String, String>]) -> Option<Verdict> {
        self.calls.lock().await.push(records.len());
        None
    }
}

/// A batch endpoint registering one handler under one priority.
pub struct SingleBatchEndpoint {
    priority: Priority,
    handler: Arc<dyn BatchHandler<String, String>>,
}

impl SingleBatchEndpoint {
    pub fn new(priority: Priority, handler: Arc<dyn BatchHandler<String, String>>) -> Self {
        Self { priority, handler }
    }
}

impl BatchEndpoint<String, String> for SingleBatchEndpoint {
    fn handlers(&self) -> HashMap<Priority, Arc<dyn BatchHandler<String, String>>> {
        let mut map: HashMap<Priority, Arc<dyn BatchHandler<String, String>>> = HashMap::new();
        let _ = map.insert(self.priority, self.handler.clone());
        map
    }
}
