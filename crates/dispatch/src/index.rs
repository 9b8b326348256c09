//! The **Endpoint Registry**: an index of `priority -> [(filter, handler)]`
//! built once, at dispatcher construction time, from the cross-product of
//! registered endpoints and the fixed priority set. Registration order is
//! preserved so handler invocation order is deterministic.

use std::{collections::HashMap, sync::Arc};

use endpoint::{BatchEndpoint, BatchHandler, Endpoint, Handler};
use filter::{FilterRule, Priority};

/// `priority -> [(filter, handler)]`, in endpoint-registration order.
pub(crate) struct PriorityIndex<Ctxt, Payload, H: ?Sized> {
    entries: HashMap<Priority, Vec<(Option<Arc<dyn FilterRule<Ctxt, Payload>>>, Arc<H>)>>,
}

impl<Ctxt, Payload, H: ?Sized> PriorityIndex<Ctxt, Payload, H> {
    fn from_entries(entries: HashMap<Priority, Vec<(Option<Arc<dyn FilterRule<Ctxt, Payload>>>, Arc<H>)>>) -> Self {
        Self { entries }
    }

    /// The `(filter, handler)` pairs registered for `priority`, in
    /// registration order. Empty (not missing) when nothing is registered.
    pub(crate) fn handlers_for(&self, priority: Priority) -> &[(Option<Arc<dyn FilterRule<Ctxt, Payload>>>, Arc<H>)] {
        self.entries.get(&priority).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The priorities that have at least one registered handler. Used to
    /// precompute `(target, priority)` subscriptions: a priority nothing
    /// ever handles has no reason to be subscribed to.
    pub(crate) fn registered_priorities(&self) -> impl Iterator<Item = Priority> + Clone + '_ {
        self.entries.keys().copied()
    }
}

impl<Ctxt, Payload> PriorityIndex<Ctxt, Payload, dyn Handler<Ctxt, Payload>> {
    /// Builds the index for single-message endpoints.
    pub(crate) fn build_single(endpoints: &[Arc<dyn Endpoint<Ctxt, Payload>>]) -> Self {
        let mut entries: HashMap<Priority, Vec<(Option<Arc<dyn FilterRule<Ctxt, Payload>>>, Arc<dyn Handler<Ctxt, Payload>>)>> = HashMap::new();
        for endpoint in endpoints {
            let filter = endpoint.filter_rule();
            for (priority, handler) in endpoint.handlers() {
                entries.entry(priority).or_default().push((filter.clone(), handler));
            }
        }
        Self::from_entries(entries)
    }
}

impl<Ctxt, Payload> PriorityIndex<Ctxt, Payload, dyn BatchHandler<Ctxt, Payload>> {
    /// Builds the index for batch endpoints.
    pub(crate) fn build_batch(endpoints: &[Arc<dyn BatchEndpoint<Ctxt, Payload>>]) -> Self {
        let mut entries: HashMap<Priority, Vec<(Option<Arc<dyn FilterRule<Ctxt, Payload>>>, Arc<dyn BatchHandler<Ctxt, Payload>>)>> = HashMap::new();
        for endpoint in endpoints {
            let filter = endpoint.filter_rule();
            for (priority, handler) in endpoint.handlers() {
                entries.entry(priority).or_default().push((filter.clone(), handler));
            }
        }
        Self::from_entries(entries)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use filter::Metadata;

    use super::*;
    use endpoint::Verdict;

    struct Noop;

    #[async_trait]
    impl Handler<(), ()> for Noop {
        async fn handle(&self, _ctxt: &(), _publisher_id: Option<&str>, _event_type: Option<&str>, _payload: &(), _metadata: &Metadata) -> Option<Verdict> {
            None
        }
    }

    struct InfoEndpoint(Arc<Noop>);

    impl Endpoint<(), ()> for InfoEndpoint {
        fn handlers(&self) -> HashMap<Priority, Arc<dyn Handler<(), ()>>> {
            let mut map: HashMap<Priority, Arc<dyn Handler<(), ()>>> = HashMap::new();
            let _ = map.insert(Priority::Info, self.0.clone());
            map
        }
    }

    #[test]
    fn builds_index_from_registered_endpoints() {
        let endpoints: Vec<Arc<dyn Endpoint<(), ()>>> = vec![Arc::new(InfoEndpoint(Arc::new(Noop)))];
        let index = PriorityIndex::build_single(&endpoints);
        assert_eq!(index.handlers_for(Priority::Info).len(), 1);
        assert!(index.handlers_for(Priority::Warn).is_empty());
    }

    #[test]
    fn registered_priorities_excludes_priorities_with_no_handler() {
        let endpoints: Vec<Arc<dyn Endpoint<(), ()>>> = vec![Arc::new(InfoEndpoint(Arc::new(Noop)))];
        let index = PriorityIndex::build_single(&endpoints);
        let registered: Vec<Priority> = index.registered_priorities().collect();
        assert_eq!(registered, vec![Priority::Info]);
    }
}
