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

//! Process-scoped local context for the duration of a single-message
//! dispatch.
//!
//! A notification handler, or anything it calls into, may want ambient
//! access to the transport's decoded context without it being threaded
//! through every call. [`scoped`] installs a value as the *active* local
//! context for the lifetime of a future, the way a server framework
//! installs a request context around a handler invocation, and guarantees
//! it is cleared on every exit path (normal return, early return, or
//! panic unwinding) once that future completes.

use std::{any::Any, future::Future, sync::Arc};

tokio::task_local! {
    static ACTIVE: Arc<dyn Any + Send + Sync>;
}

/// Runs `fut` with `ctxt` installed as the active local context, clearing it
/// once `fut` completes.
pub async fn scoped<Ctxt, F, T>(ctxt: Ctxt, fut: F) -> T
where
    Ctxt: Send + Sync + 'static,
    F: Future<Output = T>,
{
    ACTIVE.scope(Arc::new(ctxt), fut).await
}

/// Returns the currently active local context, if one of type `Ctxt` has
/// been installed by an enclosing [`scoped`] call on this task.
pub fn active<Ctxt: Send + Sync + 'static>() -> Option<Arc<Ctxt>> {
    ACTIVE.try_with(|ctxt| ctxt.clone().downcast::<Ctxt>().ok()).ok().flatten()
}

#[cfg(test)]
mod test {
    use futures::FutureExt;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct RequestCtxt {
        id: &'static str,
    }

    #[tokio::test]
    async fn active_context_visible_inside_scope() {
        assert!(active::<RequestCtxt>().is_none());

        scoped(RequestCtxt { id: "a" }, async {
            let ctxt = active::<RequestCtxt>().expect("context should be installed");
            assert_eq!(ctxt.id, "a");
        })
        .await;

        assert!(active::<RequestCtxt>().is_none());
    }

    #[tokio::test]
    async fn mismatched_type_is_not_visible() {
        scoped(RequestCtxt { id: "a" }, async {
            assert!(active::<u32>().is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn cleared_even_when_scope_body_panics() {
        let result = std::panic::AssertUnwindSafe(scoped(RequestCtxt { id: "a" }, async {
            panic!("boom");
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
        assert!(active::<RequestCtxt>().is_none());
    }
}
