//! The single-message dispatch variant: one [`transport::IncomingMessage`]
//! in, at most one requeue decision out, handlers invoked with a positional
//! `(ctxt, publisher_id, event_type, payload, metadata)` signature and the
//! decoded context installed as the active [`context`] local context.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use endpoint::{Endpoint, Verdict};
use executor::{Dispatch, Submission};
use futures::FutureExt;
use transport::{IncomingMessage, Listener, Serializer};

use crate::{extract, log_ack_failure, log_requeue_failure, log_unknown_priority, PriorityIndex};

/// Dispatches one message at a time to registered [`Endpoint`]s.
pub struct NotificationDispatcher<S, Ctxt, Payload> {
    endpoints: Vec<Arc<dyn Endpoint<Ctxt, Payload>>>,
    index: Arc<PriorityIndex<Ctxt, Payload, dyn endpoint::Handler<Ctxt, Payload>>>,
    serializer: Arc<S>,
    allow_requeue: bool,
    subscriptions: Vec<(String, filter::Priority)>,
}

impl<S, Ctxt, Payload> NotificationDispatcher<S, Ctxt, Payload>
where
    Ctxt: Send + Sync + 'static,
    Payload: Send + Sync + 'static,
{
    /// Builds a dispatcher from `endpoints`, precomputing the priority
    /// index and the `(target, priority)` subscriptions the transport's
    /// subscribe hook would consume.
    pub fn new(targets: Vec<String>, endpoints: Vec<Arc<dyn Endpoint<Ctxt, Payload>>>, serializer: S, allow_requeue: bool) -> Self {
        let index = Arc::new(PriorityIndex::build_single(&endpoints));
        let subscriptions = crate::subscriptions(&targets, index.registered_priorities());
        Self {
            endpoints,
            index,
            serializer: Arc::new(serializer),
            allow_requeue,
            subscriptions,
        }
    }

    /// The endpoints registered with this dispatcher, in registration order.
    pub fn endpoints(&self) -> &[Arc<dyn Endpoint<Ctxt, Payload>>] {
        &self.endpoints
    }

    /// The `(target, priority)` pairs this dispatcher would ask the
    /// transport to subscribe to.
    pub fn subscriptions(&self) -> &[(String, filter::Priority)] {
        &self.subscriptions
    }
}

/// The scoped `(run, done)` pairing bound to one incoming message.
struct SingleExecutionContext<M, S, Ctxt, Payload> {
    incoming: M,
    serializer: Arc<S>,
    index: Arc<PriorityIndex<Ctxt, Payload, dyn endpoint::Handler<Ctxt, Payload>>>,
    allow_requeue: bool,
    requeue: Mutex<Option<bool>>,
}

#[async_trait]
impl<M, S, Ctxt, Payload> Submission for SingleExecutionContext<M, S, Ctxt, Payload>
where
    M: IncomingMessage + 'static,
    S: Serializer<M::RawCtxt, Ctxt, M::RawPayload, Payload> + 'static,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Send + Sync + 'static,
{
    async fn run(&self) {
        let requeue = std::panic::AssertUnwindSafe(dispatch_and_handle_errors(&self.incoming, &self.serializer, &self.index, self.allow_requeue))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(?panic, "handler invocation panicked, message will be acknowledged");
                false
            });
        *self.requeue.lock().expect("requeue mutex poisoned") = Some(requeue);
    }

    async fn done(&self) {
        let requeue = self.requeue.lock().expect("requeue mutex poisoned").take().unwrap_or(false);
        if requeue {
            if let Err(error) = self.incoming.requeue().await {
                log_requeue_failure(&error);
            }
        } else if let Err(error) = self.incoming.acknowledge().await {
            log_ack_failure(&error);
        }
    }
}

async fn dispatch_and_handle_errors<M, S, Ctxt, Payload>(
    message: &M,
    serializer: &S,
    index: &PriorityIndex<Ctxt, Payload, dyn endpoint::Handler<Ctxt, Payload>>,
    allow_requeue: bool,
) -> bool
where
    M: IncomingMessage,
    S: Serializer<M::RawCtxt, Ctxt, M::RawPayload, Payload>,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Send + Sync + 'static,
{
    let extracted = extract(message, serializer);
    let Some(priority) = extracted.priority else {
        log_unknown_priority(message.priority());
        return false;
    };

    let record = extracted.record;
    let mut requeue = false;

    for (filter, handler) in index.handlers_for(priority) {
        if let Some(filter) = filter {
            if !filter.matches(&record.ctxt, record.publisher_id.as_deref(), record.event_type.as_deref(), &record.metadata, &record.payload) {
                continue;
            }
        }

        let scoped_ctxt = record.ctxt.clone();
        let verdict: Verdict = context::scoped(
            scoped_ctxt,
            handler.handle(&record.ctxt, record.publisher_id.as_deref(), record.event_type.as_deref(), &record.payload, &record.metadata),
        )
        .await
        .into();

        if allow_requeue && verdict == Verdict::Requeue {
            requeue = true;
            break;
        }
    }

    requeue
}

#[async_trait]
impl<L, S, Ctxt, Payload> Dispatch<L> for NotificationDispatcher<S, Ctxt, Payload>
where
    L: Listener,
    L::Message: 'static,
    S: Serializer<<L::Message as IncomingMessage>::RawCtxt, Ctxt, <L::Message as IncomingMessage>::RawPayload, Payload> + 'static,
    Ctxt: Clone + Send + Sync + 'static,
    Payload: Send + Sync + 'static,
{
    async fn poll_and_dispatch(&self, listener: &L) -> Option<Box<dyn Submission>> {
        let message = listener.poll().await?;
        Some(Box::new(SingleExecutionContext {
            incoming: message,
            serializer: self.serializer.clone(),
            index: self.index.clone(),
            allow_requeue: self.allow_requeue,
            requeue: Mutex::new(None),
        }))
    }
}
