//! The persistence seam: the minimal trait the pipeline and touch-timer
//! need from the external store, plus one in-memory reference
//! implementation. Durable storage of log bodies is out of scope; this
//! crate only needs CRUD of a few source-level fields.

use crate::backends::AdaptorRegistry;
use crate::config::{Source, SourceBackend};
use crate::error::ConfigError;
use crate::event::SourceId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_source(&self, source_id: SourceId) -> Option<Source>;
    async fn list_backends_for_source(&self, source_id: SourceId) -> Vec<SourceBackend>;
    async fn touch_log_events_updated_at(&self, source_id: SourceId, at_millis: u64);
}

/// A trivial in-memory [`StoreClient`], suitable for tests and as a
/// reference implementation for anyone embedding this crate without a
/// real persistence layer yet.
pub struct InMemoryStore {
    adaptors: Arc<AdaptorRegistry>,
    sources: DashMap<SourceId, Source>,
    backends: DashMap<SourceId, Vec<SourceBackend>>,
    log_events_updated_at: DashMap<SourceId, AtomicU64>,
}

impl InMemoryStore {
    pub fn new(adaptors: Arc<AdaptorRegistry>) -> Self {
        Self {
            adaptors,
            sources: DashMap::new(),
            backends: DashMap::new(),
            log_events_updated_at: DashMap::new(),
        }
    }

    pub fn put_source(&self, source: Source) {
        self.sources.insert(source.id, source);
    }

    /// Rejects a backend whose `backend_type` isn't in the adaptor table —
    /// a `SourceBackend` of an unregistered type can never be started, so
    /// it can't be stored either.
    pub fn put_backend(&self, backend: SourceBackend) -> Result<(), ConfigError> {
        if self.adaptors.get(&backend.backend_type).is_none() {
            return Err(ConfigError::new(
                "type",
                format!("unknown backend type {:?}", backend.backend_type),
            ));
        }
        self.backends
            .entry(backend.source_id)
            .or_default()
            .push(backend);
        Ok(())
    }

    pub fn log_events_updated_at(&self, source_id: SourceId) -> Option<u64> {
        self.log_events_updated_at
            .get(&source_id)
            .map(|v| v.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn get_source(&self, source_id: SourceId) -> Option<Source> {
        self.sources.get(&source_id).map(|s| s.clone())
    }

    async fn list_backends_for_source(&self, source_id: SourceId) -> Vec<SourceBackend> {
        self.backends
            .get(&source_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    async fn touch_log_events_updated_at(&self, source_id: SourceId, at_millis: u64) {
        self.log_events_updated_at
            .entry(source_id)
            .or_insert_with(|| AtomicU64::new(0))
            .store(at_millis, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::new(Arc::new(AdaptorRegistry::with_builtins()))
    }

    #[tokio::test]
    async fn round_trips_source_and_backends() {
        let store = store();
        store.put_source(Source::new(1, 100, "my-source"));
        store
            .put_backend(SourceBackend {
                id: 1,
                source_id: 1,
                backend_type: "webhook".into(),
                config: Default::default(),
            })
            .unwrap();

        let source = store.get_source(1).await.unwrap();
        assert_eq!(source.name, "my-source");

        let backends = store.list_backends_for_source(1).await;
        assert_eq!(backends.len(), 1);
    }

    #[tokio::test]
    async fn put_backend_rejects_unregistered_type() {
        let store = store();
        let err = store
            .put_backend(SourceBackend {
                id: 1,
                source_id: 1,
                backend_type: "carrier_pigeon".into(),
                config: Default::default(),
            })
            .unwrap_err();
        assert_eq!(err.field, "type");
        assert!(store.list_backends_for_source(1).await.is_empty());
    }

    #[tokio::test]
    async fn touch_updates_timestamp() {
        let store = store();
        store.touch_log_events_updated_at(1, 12345).await;
        assert_eq!(store.log_events_updated_at(1), Some(12345));
    }
}
