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

//! The **Notification Dispatcher**: turns one incoming message (or batch of
//! messages) into zero or more handler invocations and an ack/requeue plan.
//!
//! Two variants are provided, selecting different extraction and handler
//! invocation strategies over the same [`endpoint`]/[`filter`] registration
//! model (see the module docs on [`single::NotificationDispatcher`] and
//! [`batch::BatchNotificationDispatcher`]):
//!
//! - [`single::NotificationDispatcher`] handles one message at a time, with
//!   the decoded context installed as the active [`context`] for the
//!   handler call.
//! - [`batch::BatchNotificationDispatcher`] handles a batch at a time,
//!   calling each handler once per priority with the filtered list of
//!   decoded records.

mod batch;
mod index;
mod single;

pub use batch::BatchNotificationDispatcher;
pub use single::NotificationDispatcher;

use filter::{Metadata, Priority};
use transport::IncomingMessage;

/// One decoded notification, paired with the priority it was extracted
/// under and a reference back to its raw, not-yet-decoded message.
pub(crate) struct Extracted<Ctxt, Payload> {
    pub(crate) priority: Option<Priority>,
    pub(crate) record: endpoint::DecodedRecord<Ctxt, Payload>,
}

/// Decodes one raw incoming message into its priority and decoded record.
/// A missing or unrecognized priority string yields `priority: None`; the
/// caller is responsible for logging and dropping such records (the raw
/// message is still acknowledged, never requeued).
pub(crate) fn extract<M, S, Ctxt, Payload>(message: &M, serializer: &S) -> Extracted<Ctxt, Payload>
where
    M: IncomingMessage,
    S: transport::Serializer<M::RawCtxt, Ctxt, M::RawPayload, Payload>,
{
    let ctxt = serializer.deserialize_context(message.raw_ctxt());
    let payload = serializer.deserialize_entity(&ctxt, message.raw_payload());
    let priority = message.priority().and_then(Priority::parse);
    let metadata = Metadata {
        message_id: message.message_id().map(str::to_string),
        timestamp: message.timestamp().map(str::to_string),
    };

    Extracted {
        priority,
        record: endpoint::DecodedRecord {
            ctxt,
            publisher_id: message.publisher_id().map(str::to_string),
            event_type: message.event_type().map(str::to_string),
            payload,
            metadata,
        },
    }
}

/// Declarative `(target, priority)` subscriptions a dispatcher's
/// constructor precomputes from its transport targets and its registered
/// priorities, for use by a transport's own subscribe hook. Purely
/// informational: the dispatch core itself does not act on it. Only
/// priorities with at least one registered handler are included, matching
/// `_NotificationDispatcherBase.__init__`'s `self._callbacks_by_priority.keys()`
/// in the source this dispatcher is built from.
pub(crate) fn subscriptions(targets: &[String], priorities: impl Iterator<Item = Priority> + Clone) -> Vec<(String, Priority)> {
    targets.iter().flat_map(|target| priorities.clone().map(move |priority| (target.clone(), priority))).collect()
}

pub(crate) fn log_unknown_priority(raw: Option<&str>) {
    tracing::warn!(priority = raw.unwrap_or(""), "unknown priority, message dropped (still acknowledged)");
}

pub(crate) fn log_ack_failure(error: &transport::Error) {
    tracing::error!(%error, "failed to acknowledge message");
}

pub(crate) fn log_requeue_failure(error: &transport::Error) {
    tracing::error!(%error, "failed to requeue message");
}

pub(crate) use index::PriorityIndex;
