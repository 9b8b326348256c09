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

//! Definition of the [`Endpoint`] and [`BatchEndpoint`] traits: the
//! user-supplied objects the dispatch core routes decoded notifications to.
//!
//! An endpoint is discovered by *explicit registration* rather than by
//! reflecting over method names: it exposes a `handlers()` map from
//! [`filter::Priority`] to a handler, and an optional [`filter::FilterRule`].
//! The single-message and batch dispatch variants use two distinct handler
//! signatures (one record at a time vs. a filtered list per cycle), so they
//! get two distinct endpoint traits rather than one trait with an enum mode.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use filter::{FilterRule, Metadata, Priority};

/// A handler's reply. `Requeue` is only honored when the dispatcher was
/// constructed with `allow_requeue = true`; otherwise it is treated exactly
/// like `Handled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The message was handled; acknowledge it.
    Handled,
    /// Return the message (and every other message of the same priority in
    /// this cycle) to the transport instead of acknowledging it.
    Requeue,
}

impl From<Option<Verdict>> for Verdict {
    /// A handler returning `None` is coerced to `Handled`, matching a
    /// falsy/`None` reply in the source implementation.
    fn from(verdict: Option<Verdict>) -> Self {
        verdict.unwrap_or(Verdict::Handled)
    }
}

/// One decoded notification, as handed to a batch handler: the decoded
/// context and payload plus the fields the dispatcher reads directly.
#[derive(Debug, Clone)]
pub struct DecodedRecord<Ctxt, Payload> {
    /// The decoded transport context.
    pub ctxt: Ctxt,
    /// The publisher that emitted this notification, if known.
    pub publisher_id: Option<String>,
    /// The event type of this notification, if known.
    pub event_type: Option<String>,
    /// The decoded payload.
    pub payload: Payload,
    /// Transport-assigned metadata (message id, timestamp).
    pub metadata: Metadata,
}

/// A single-message handler: called once per decoded notification, with the
/// decoded context installed as the active local context ([`context::scoped`])
/// for the duration of the call.
#[async_trait]
pub trait Handler<Ctxt, Payload>: Send + Sync {
    /// Handles one decoded notification.
    async fn handle(
        &self,
        ctxt: &Ctxt,
        publisher_id: Option<&str>,
        event_type: Option<&str>,
        payload: &Payload,
        metadata: &Metadata,
    ) -> Option<Verdict>;
}

/// A batch handler: called once per dispatch cycle with every filtered
/// record of one priority.
#[async_trait]
pub trait BatchHandler<Ctxt, Payload>: Send + Sync {
    /// Handles every filtered record of one priority from one dispatch
    /// cycle. `records` is never empty: the dispatcher skips a handler
    /// whose filtered set is empty.
    async fn handle(&self, records: &[DecodedRecord<Ctxt, Payload>]) -> Option<Verdict>;
}

/// A user-supplied single-message endpoint: zero or more priority handlers,
/// plus an optional filter screening every message before any of its
/// handlers see it.
pub trait Endpoint<Ctxt, Payload>: Send + Sync {
    /// The handlers this endpoint registers, keyed by priority. An endpoint
    /// with no interest in a given priority simply omits it.
    fn handlers(&self) -> HashMap<Priority, Arc<dyn Handler<Ctxt, Payload>>>;

    /// The filter screening every message routed to this endpoint's
    /// handlers. `None` means every message passes.
    fn filter_rule(&self) -> Option<Arc<dyn FilterRule<Ctxt, Payload>>> {
        None
    }
}

/// The batch-mode counterpart of [`Endpoint`].
pub trait BatchEndpoint<Ctxt, Payload>: Send + Sync {
    /// The handlers this endpoint registers, keyed by priority.
    fn handlers(&self) -> HashMap<Priority, Arc<dyn BatchHandler<Ctxt, Payload>>>;

    /// The filter screening every record routed to this endpoint's
    /// handlers. `None` means every record passes.
    fn filter_rule(&self) -> Option<Arc<dyn FilterRule<Ctxt, Payload>>> {
        None
    }
}
