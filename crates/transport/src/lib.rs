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

//! Definition of the transport-facing traits the dispatch core consumes:
//! [`Listener`], [`IncomingMessage`], and [`Serializer`]. The transport
//! itself, and payload (de)serialization, are external collaborators — this
//! crate only names the interface the core is built against.

use std::time::Duration;

use async_trait::async_trait;

/// All the errors that can occur while interacting with a transport.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Acknowledging a message failed.
    #[error("failed to acknowledge message (reason: {reason})")]
    Acknowledge {
        /// The underlying error message.
        reason: String,
    },

    /// Requeuing a message failed.
    #[error("failed to requeue message (reason: {reason})")]
    Requeue {
        /// The underlying error message.
        reason: String,
    },
}

/// An envelope delivered by the transport: an opaque, not-yet-deserialized
/// context and payload, plus the message fields the dispatcher reads
/// directly. Acknowledged or requeued exactly once by the dispatch core.
#[async_trait]
pub trait IncomingMessage: Send + Sync {
    /// The transport-level context, before [`Serializer::deserialize_context`].
    type RawCtxt: Send + Sync;
    /// The payload, before [`Serializer::deserialize_entity`].
    type RawPayload: Send + Sync;

    /// The opaque transport-level context.
    fn raw_ctxt(&self) -> &Self::RawCtxt;
    /// The not-yet-deserialized payload.
    fn raw_payload(&self) -> &Self::RawPayload;
    /// The publisher that emitted this notification, if known.
    fn publisher_id(&self) -> Option<&str>;
    /// The event type of this notification, if known.
    fn event_type(&self) -> Option<&str>;
    /// The transport-assigned message id, if known.
    fn message_id(&self) -> Option<&str>;
    /// The transport-assigned timestamp, if known.
    fn timestamp(&self) -> Option<&str>;
    /// The raw priority string, if present (not yet case-folded).
    fn priority(&self) -> Option<&str>;

    /// Acknowledges this message. May fail; failures are logged and
    /// swallowed by the dispatch core.
    async fn acknowledge(&self) -> Result<(), Error>;
    /// Requeues this message. May fail; failures are logged and swallowed
    /// by the dispatch core.
    async fn requeue(&self) -> Result<(), Error>;
}

/// The transport that delivers notifications to the dispatch core.
#[async_trait]
pub trait Listener: Send + Sync {
    /// The concrete message type this listener produces.
    type Message: IncomingMessage;

    /// Polls for a single message. Expected to block or time out rather
    /// than busy-loop; returns `None` on no message available.
    async fn poll(&self) -> Option<Self::Message>;

    /// Polls for up to `size` messages, waiting at most `timeout` (or
    /// indefinitely if `None`) for the batch to fill.
    async fn batch_poll(&self, size: usize, timeout: Option<Duration>) -> Vec<Self::Message>;

    /// Signals the transport to stop delivering further messages.
    async fn stop(&self);
}

/// Decodes the opaque transport context and payload into the types handlers
/// and filter rules operate on.
pub trait Serializer<RawCtxt, Ctxt, RawPayload, Payload>: Send + Sync {
    /// Decodes the raw transport context.
    fn deserialize_context(&self, raw: &RawCtxt) -> Ctxt;
    /// Decodes the raw payload, given the already-decoded context.
    fn deserialize_entity(&self, ctxt: &Ctxt, raw: &RawPayload) -> Payload;
}

/// A serializer that performs no transformation: `Ctxt = RawCtxt` and
/// `Payload = RawPayload`, both simply cloned.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSerializer;

impl<T: Clone + Send + Sync> Serializer<T, T, T, T> for NoOpSerializer {
    fn deserialize_context(&self, raw: &T) -> T {
        raw.clone()
    }

    fn deserialize_entity(&self, _ctxt: &T, raw: &T) -> T {
        raw.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn noop_serializer_clones_through() {
        let serializer = NoOpSerializer;
        let ctxt = serializer.deserialize_context(&"ctxt".to_string());
        assert_eq!(ctxt, "ctxt");
        let payload = serializer.deserialize_entity(&ctxt, &"payload".to_string());
        assert_eq!(payload, "payload");
    }
}
