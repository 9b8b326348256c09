//! A helper that waits for a batch of in-flight tasks to complete within an
//! optional deadline, splitting the batch into what finished and what is
//! still pending.

use std::time::Duration;

use crate::InFlightSet;

/// Waits for every id in `ids` to drain from `set`, up to `timeout`.
///
/// Returns `(completed, still_pending)`. A `timeout` of `None` blocks until
/// every id has drained. Safe to call with an empty `ids`: returns
/// `(vec![], vec![])` immediately without touching `set`.
pub async fn wait(set: &InFlightSet, ids: Vec<u64>, timeout: Option<Duration>) -> (Vec<u64>, Vec<u64>) {
    if ids.is_empty() {
        return (Vec::new(), Vec::new());
    }

    match timeout {
        None => {
            set.wait_until_drained(&ids).await;
            (ids, Vec::new())
        }
        Some(duration) => match tokio::time::timeout(duration, set.wait_until_drained(&ids)).await {
            Ok(()) => (ids, Vec::new()),
            Err(_) => {
                let pending = set.still_pending(&ids);
                let completed = ids.into_iter().filter(|id| !pending.contains(id)).collect();
                (completed, pending)
            }
        },
    }
}
