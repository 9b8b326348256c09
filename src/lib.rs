#![doc = include_str!("../README.md")]
#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results,
    variant_size_differences
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! `notify-dispatch` is the execution and dispatch core of a notification
//! message-handling server: a [`executor::PooledExecutor`] continuously
//! polls a transport and fans incoming messages out to a bounded worker
//! pool, and a [`dispatch::NotificationDispatcher`] (or its batch
//! counterpart, [`dispatch::BatchNotificationDispatcher`]) routes each
//! decoded message to every eligible [`endpoint::Endpoint`], applies
//! optional [`filter::FilterRule`] screening, and decides whether the
//! underlying transport message should be acknowledged or requeued.
//!
//! The transport itself, payload serialization, and configuration sourcing
//! beyond the executor's own thread-pool size are external collaborators:
//! this crate only names the interfaces it is built against
//! ([`transport::Listener`], [`transport::IncomingMessage`],
//! [`transport::Serializer`]) and the core state machines on top of them.

pub use config;
pub use context;
pub use dispatch;
pub use endpoint;
pub use executor;
pub use filter;
pub use signal;
pub use task;
pub use transport;
