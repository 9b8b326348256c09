//! The batch dispatch variant: a list of [`transport::IncomingMessage`]s in,
//! handlers invoked once per priority with the filtered list of decoded
//! records, no per-message local context installed.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use endpoint::{BatchEndpoint, DecodedRecord, Verdict};
use executor::{Dispatch, Submission};
use filter::Priority;
use futures::FutureExt;
use transport::{IncomingMessage, Listener, Serializer};

use crate::{extract, log_ack_failure, log_requeue_failure, log_unknown_priority, PriorityIndex};

/// Dispatches a batch of messages per cycle to registered [`BatchEndpoint`]s.
pub struct BatchNotificationDispatcher<S, Ctxt, Payload> {
    endpoints: Vec<Arc<dyn BatchEndpoint<Ctxt, Payload>>>,
    index: Arc<PriorityIndex<Ctxt, Payload, dyn endpoint::BatchHandler<Ctxt, Payload>>>,
    serializer: Arc<S>,
    allow_requeue: bool,
    subscriptions: Vec<(String, Priority)>,
    batch_size: usize,
    batch_timeout: Option<Duration>,
}

impl<S, Ctxt, Payload> BatchNotificationDispatcher<S, Ctxt, Payload>
where
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Clone + Send + Sync + 'static,
{
    /// Builds a batch dispatcher from `endpoints`. `batch_size` of `0` is
    /// coerced to `1`.
    pub fn new(
        targets: Vec<String>,
        endpoints: Vec<Arc<dyn BatchEndpoint<Ctxt, Payload>>>,
        serializer: S,
        allow_requeue: bool,
        batch_size: usize,
        batch_timeout: Option<Duration>,
    ) -> Self {
        let index = Arc::new(PriorityIndex::build_batch(&endpoints));
        let subscriptions = crate::subscriptions(&targets, index.registered_priorities());
        Self {
            endpoints,
            index,
            serializer: Arc::new(serializer),
            allow_requeue,
            subscriptions,
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    /// The endpoints registered with this dispatcher, in registration order.
    pub fn endpoints(&self) -> &[Arc<dyn BatchEndpoint<Ctxt, Payload>>] {
        &self.endpoints
    }

    /// The `(target, priority)` pairs this dispatcher would ask the
    /// transport to subscribe to.
    pub fn subscriptions(&self) -> &[(String, Priority)] {
        &self.subscriptions
    }
}

struct BatchExecutionContext<M, S, Ctxt, Payload> {
    incoming: Vec<M>,
    serializer: Arc<S>,
    index: Arc<PriorityIndex<Ctxt, Payload, dyn endpoint::BatchHandler<Ctxt, Payload>>>,
    allow_requeue: bool,
    requeue: Mutex<Option<HashSet<usize>>>,
}

#[async_trait]
impl<M, S, Ctxt, Payload> Submission for BatchExecutionContext<M, S, Ctxt, Payload>
where
    M: IncomingMessage + 'static,
    S: Serializer<M::RawCtxt, Ctxt, M::RawPayload, Payload> + 'static,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Clone + Send + Sync + 'static,
{
    async fn run(&self) {
        let requeue = std::panic::AssertUnwindSafe(dispatch_and_handle_errors(&self.incoming, &self.serializer, &self.index, self.allow_requeue))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(?panic, "batch handler invocation panicked, messages will be acknowledged");
                HashSet::new()
            });
        *self.requeue.lock().expect("requeue mutex poisoned") = Some(requeue);
    }

    async fn done(&self) {
        let requeue_set = self.requeue.lock().expect("requeue mutex poisoned").take().unwrap_or_default();
        for (index, message) in self.incoming.iter().enumerate() {
            if requeue_set.contains(&index) {
                if let Err(error) = message.requeue().await {
                    log_requeue_failure(&error);
                }
            } else if let Err(error) = message.acknowledge().await {
                log_ack_failure(&error);
            }
        }
    }
}

async fn dispatch_and_handle_errors<M, S, Ctxt, Payload>(
    incoming: &[M],
    serializer: &S,
    index: &PriorityIndex<Ctxt, Payload, dyn endpoint::BatchHandler<Ctxt, Payload>>,
    allow_requeue: bool,
) -> HashSet<usize>
where
    M: IncomingMessage,
    S: Serializer<M::RawCtxt, Ctxt, M::RawPayload, Payload>,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Clone + Send + Sync + 'static,
{
    // Group by priority, preserving order of first appearance.
    let mut order: Vec<Priority> = Vec::new();
    let mut groups: HashMap<Priority, Vec<(usize, DecodedRecord<Ctxt, Payload>)>> = HashMap::new();

    for (raw_index, message) in incoming.iter().enumerate() {
        let extracted = extract(message, serializer);
        let Some(priority) = extracted.priority else {
            log_unknown_priority(message.priority());
            continue;
        };
        if !groups.contains_key(&priority) {
            order.push(priority);
        }
        groups.entry(priority).or_default().push((raw_index, extracted.record));
    }

    let mut requeue_set = HashSet::new();

    for priority in order {
        let group = groups.get(&priority).expect("priority was just inserted into `order`");
        let group_raw_indices: Vec<usize> = group.iter().map(|(raw_index, _)| *raw_index).collect();

        for (filter, handler) in index.handlers_for(priority) {
            let filtered: Vec<DecodedRecord<Ctxt, Payload>> = group
                .iter()
                .filter(|(_, record)| {
                    filter
                        .as_ref()
                        .map_or(true, |filter| filter.matches(&record.ctxt, record.publisher_id.as_deref(), record.event_type.as_deref(), &record.metadata, &record.payload))
                })
                .map(|(_, record)| record.clone())
                .collect();

            if filtered.is_empty() {
                continue;
            }

            let verdict: Verdict = handler.handle(&filtered).await.into();

            if allow_requeue && verdict == Verdict::Requeue {
                requeue_set.extend(group_raw_indices.iter().copied());
                break;
            }
        }
    }

    requeue_set
}

#[async_trait]
impl<L, S, Ctxt, Payload> Dispatch<L> for BatchNotificationDispatcher<S, Ctxt, Payload>
where
    L: Listener,
    L::Message: 'static,
    S: Serializer<<L::Message as IncomingMessage>::RawCtxt, Ctxt, <L::Message as IncomingMessage>::RawPayload, Payload> + 'static,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Clone + Send + Sync + 'static,
{
    async fn poll_and_dispatch(&self, listener: &L) -> Option<Box<dyn Submission>> {
        let batch = listener.batch_poll(self.batch_size, self.batch_timeout).await;
        if batch.is_empty() {
            return None;
        }
        Some(Box::new(BatchExecutionContext {
            incoming: batch,
            serializer: self.serializer.clone(),
            index: self.index.clone(),
            allow_requeue: self.allow_requeue,
            requeue: Mutex::new(None),
        }))
    }
}
