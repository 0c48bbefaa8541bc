//! The source dispatcher (C5): fans an event batch out to every adaptor
//! currently registered for a source.
//!
//! Dispatch is concurrent across adaptors via `futures::future::join_all`,
//! with each adaptor's failure isolated from its siblings.

use crate::backends::AdaptorHandle;
use crate::event::{LogEvent, SourceId};
use crate::internal_events;
use crate::registry::Registry;
use tracing::warn;

pub struct Dispatcher<'a> {
    registry: &'a Registry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Looks up every adaptor registered under `source_id` and invokes
    /// `ingest` on each concurrently. Ordering between distinct adaptors
    /// is unspecified; ordering of events within one adaptor's call
    /// equals `events`'s order (the whole batch is handed to each
    /// adaptor as-is). Returns once every dispatch has been initiated and
    /// completed; adaptor failures are logged, never propagated.
    pub async fn dispatch(&self, source_id: SourceId, events: Vec<LogEvent>) {
        if events.is_empty() {
            return;
        }

        let adaptors: Vec<_> = self
            .registry
            .dispatch_snapshot(source_id)
            .into_iter()
            .filter_map(|entry| entry.handle.downcast::<AdaptorHandle>().ok())
            .collect();

        let futures = adaptors.into_iter().map(|adaptor| {
            let batch = events.clone();
            async move {
                if let Err(err) = adaptor.0.ingest(batch).await {
                    warn!(source_id, error = %err, message = %internal_events::ADAPTOR_DISPATCH_FAILED);
                }
            }
        });

        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryAdaptor;
    use crate::backends::AdaptorHandle;
    use crate::registry::{Entry, RegistryKey};
    use serde_json::Map;
    use std::sync::Arc;

    fn event(id: u64) -> LogEvent {
        LogEvent {
            id,
            source_token: 0,
            ingested_at: 0,
            body: Map::new(),
            params: Map::new(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_every_registered_adaptor() {
        let registry = Registry::new();
        let a = MemoryAdaptor::start();
        let b = MemoryAdaptor::start();

        registry
            .register(
                RegistryKey::Backend {
                    source_id: 1,
                    backend_id: 1,
                    sub_role: "ingest",
                },
                Entry::new(Arc::new(AdaptorHandle(a.clone())), Some(1)),
            )
            .unwrap();
        registry
            .register(
                RegistryKey::Backend {
                    source_id: 1,
                    backend_id: 2,
                    sub_role: "ingest",
                },
                Entry::new(Arc::new(AdaptorHandle(b.clone())), Some(1)),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(&registry);
        dispatcher.dispatch(1, vec![event(1), event(2)]).await;

        assert_eq!(a.received_count(), 2);
        assert_eq!(b.received_count(), 2);
    }

    #[tokio::test]
    async fn empty_batch_dispatches_nothing() {
        let registry = Registry::new();
        let a = MemoryAdaptor::start();
        registry
            .register(
                RegistryKey::Backend {
                    source_id: 1,
                    backend_id: 1,
                    sub_role: "ingest",
                },
                Entry::new(Arc::new(AdaptorHandle(a.clone())), Some(1)),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(&registry);
        dispatcher.dispatch(1, vec![]).await;
        assert_eq!(a.received_count(), 0);
    }

    #[tokio::test]
    async fn only_dispatches_to_the_matching_source() {
        let registry = Registry::new();
        let a = MemoryAdaptor::start();
        registry
            .register(
                RegistryKey::Backend {
                    source_id: 1,
                    backend_id: 1,
                    sub_role: "ingest",
                },
                Entry::new(Arc::new(AdaptorHandle(a.clone())), Some(1)),
            )
            .unwrap();

        let dispatcher = Dispatcher::new(&registry);
        dispatcher.dispatch(2, vec![event(1)]).await;
        assert_eq!(a.received_count(), 0);
    }
}
