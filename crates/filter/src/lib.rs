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

//! Definition of the fixed priority set, message metadata, and the
//! [`FilterRule`] trait endpoints use to screen notifications before their
//! handlers are invoked.

use std::fmt;

/// The fixed set of priorities a notification may carry. Any other string
/// is an unknown priority: it is logged and dropped by the dispatcher, never
/// routed to a handler.
pub const PRIORITIES: [Priority; 7] = [
    Priority::Audit,
    Priority::Debug,
    Priority::Info,
    Priority::Warn,
    Priority::Error,
    Priority::Critical,
    Priority::Sample,
];

/// One of the seven fixed severity tags carried on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Priority {
    /// `audit`
    Audit,
    /// `debug`
    Debug,
    /// `info`
    Info,
    /// `warn`
    Warn,
    /// `error`
    Error,
    /// `critical`
    Critical,
    /// `sample`
    Sample,
}

impl Priority {
    /// The lowercase wire name of this priority, as carried on the message.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Audit => "audit",
            Priority::Debug => "debug",
            Priority::Info => "info",
            Priority::Warn => "warn",
            Priority::Error => "error",
            Priority::Critical => "critical",
            Priority::Sample => "sample",
        }
    }

    /// Parses a case-folded priority string. Returns `None` for any string
    /// outside the fixed set (including the empty string), matching the
    /// dispatcher's "unknown priority" handling.
    pub fn parse(raw: &str) -> Option<Priority> {
        let lower = raw.to_lowercase();
        PRIORITIES.into_iter().find(|p| p.as_str() == lower)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-supplied metadata that rides along with every notification,
/// independent of its payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// The transport-assigned message id, if any.
    pub message_id: Option<String>,
    /// The transport-assigned timestamp, if any, as an opaque string.
    pub timestamp: Option<String>,
}

/// A pure predicate over a message's context, publisher, event type,
/// metadata, and payload. Implementations must not have side effects: the
/// dispatcher may call `matches` any number of times per message.
pub trait FilterRule<Ctxt, Payload>: Send + Sync {
    /// Returns whether the message described by these fields should be
    /// delivered to the endpoint this rule screens.
    fn matches(&self, ctxt: &Ctxt, publisher_id: Option<&str>, event_type: Option<&str>, metadata: &Metadata, payload: &Payload) -> bool;
}
