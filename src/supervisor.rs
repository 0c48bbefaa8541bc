//! The source supervisor (C7): starts and stops the full set of per-source
//! workers, idempotently, with a one-for-one restart strategy.
//!
//! Idempotence is implemented by routing `start` through the registry's
//! optimistic name insertion: two concurrent `start` calls race on
//! registering `RegistryKey::Worker(source_id, Role::Supervisor)`, and the
//! loser observes `AlreadyStarted`.

use crate::backends::AdaptorRegistry;
use crate::buffer::MemoryBuffer;
use crate::cluster::ClusterAggregator;
use crate::config::{RuntimeConfig, Source, SourceBackend};
use crate::error::LifecycleError;
use crate::event::SourceId;
use crate::internal_events;
use crate::peer_registry::PeerRegistry;
use crate::pipeline::{IngestionHub, Pipeline};
use crate::pubsub::PubSub;
use crate::recent_logs::{RecentLogsCache, RecentLogsWorkers};
use crate::registry::{Entry, Registry, RegistryKey, Role};
use crate::store::StoreClient;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

struct RunningSource {
    #[allow(dead_code)]
    cache: Arc<RecentLogsCache>,
    #[allow(dead_code)]
    buffer: Arc<MemoryBuffer>,
    workers: RecentLogsWorkers,
}

pub struct SourceSupervisor {
    registry: Arc<Registry>,
    hub: Arc<IngestionHub>,
    pubsub: Arc<PubSub>,
    store: Arc<dyn StoreClient>,
    adaptors: Arc<AdaptorRegistry>,
    cluster: Arc<ClusterAggregator>,
    peer_registry: PeerRegistry,
    config: RuntimeConfig,
    node_id: String,
    running: DashMap<SourceId, RunningSource>,
}

impl SourceSupervisor {
    pub fn new(
        registry: Arc<Registry>,
        hub: Arc<IngestionHub>,
        pubsub: Arc<PubSub>,
        store: Arc<dyn StoreClient>,
        adaptors: Arc<AdaptorRegistry>,
        cluster: Arc<ClusterAggregator>,
        config: RuntimeConfig,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            hub,
            pubsub,
            store,
            adaptors,
            cluster,
            peer_registry: PeerRegistry::new(),
            config,
            node_id: node_id.into(),
            running: DashMap::new(),
        }
    }

    pub fn started(&self, source_id: SourceId) -> bool {
        self.running.contains_key(&source_id)
    }

    /// Returns this source's cache, starting it lazily under the
    /// cluster-wide advisory lock if no supervisor has started it yet —
    /// e.g. a read against a source whose supervisor runs on a different
    /// node. Returns `None` if the source doesn't exist.
    pub async fn ensure_cache(&self, source_id: SourceId) -> Option<Arc<RecentLogsCache>> {
        if let Some(running) = self.running.get(&source_id) {
            return Some(running.cache.clone());
        }
        if let Some(entry) = self.registry.lookup(&RegistryKey::Worker(source_id, Role::Cache)) {
            if let Ok(cache) = entry.handle.downcast::<RecentLogsCache>() {
                return Some(cache);
            }
        }
        if !self.peer_registry.try_claim(source_id) {
            // Another caller is creating it concurrently; whatever they
            // register will be visible on the next lookup.
            return self
                .registry
                .lookup(&RegistryKey::Worker(source_id, Role::Cache))
                .and_then(|entry| entry.handle.downcast::<RecentLogsCache>().ok());
        }

        if self.store.get_source(source_id).await.is_none() {
            self.peer_registry.release(source_id);
            return None;
        }
        let cache = RecentLogsCache::new(source_id, &self.node_id, self.config.cache_capacity);
        self.registry
            .register(
                RegistryKey::Worker(source_id, Role::Cache),
                Entry::new(cache.clone(), None),
            )
            .ok();
        Some(cache)
    }

    /// Starts C3, C2, and one instance of each configured C4 for `source`.
    /// Returns `AlreadyStarted` if the source is already running.
    pub fn start(&self, source: Source, backends: Vec<SourceBackend>) -> Result<(), LifecycleError> {
        self.registry
            .register(
                RegistryKey::Worker(source.id, Role::Supervisor),
                Entry::new(Arc::new(()), None),
            )
            .map_err(|_| LifecycleError::AlreadyStarted(source.id))?;

        let source_id = source.id;
        self.peer_registry.try_claim(source_id);

        // A lazy read may have already started the cache for this source
        // before its supervisor got here; reuse it instead of racing a
        // second cache into existence.
        let cache = self
            .registry
            .lookup(&RegistryKey::Worker(source_id, Role::Cache))
            .and_then(|entry| entry.handle.downcast::<RecentLogsCache>().ok())
            .unwrap_or_else(|| RecentLogsCache::new(source_id, &self.node_id, self.config.cache_capacity));
        let buffer = Arc::new(MemoryBuffer::new(source_id, self.config.buffer_capacity));
        let workers = RecentLogsWorkers::spawn(
            cache.clone(),
            self.pubsub.clone(),
            self.store.clone(),
            self.cluster.clone(),
            self.config.clone(),
        );

        self.registry
            .register(
                RegistryKey::Worker(source_id, Role::Cache),
                Entry::new(cache.clone(), None),
            )
            .ok();
        self.registry
            .register(
                RegistryKey::Worker(source_id, Role::Buffer),
                Entry::new(buffer.clone(), None),
            )
            .ok();

        for backend in backends {
            if let Some(adaptor) = self.adaptors.start(&backend) {
                self.registry
                    .register(
                        RegistryKey::Backend {
                            source_id,
                            backend_id: backend.id,
                            sub_role: "ingest",
                        },
                        Entry::new(
                            Arc::new(crate::backends::AdaptorHandle(adaptor)),
                            Some(source_id),
                        ),
                    )
                    .ok();
            }
        }

        let pipeline = Arc::new(Pipeline::new(
            source,
            cache.clone(),
            buffer.clone(),
            self.registry.clone(),
            self.pubsub.clone(),
        ));
        self.registry
            .register(
                RegistryKey::Worker(source_id, Role::Pipeline),
                Entry::new(pipeline.clone(), None),
            )
            .ok();
        self.hub.register(pipeline);

        self.running.insert(source_id, RunningSource { cache, buffer, workers });
        info!(source_id, message = %internal_events::SOURCE_STARTED);
        Ok(())
    }

    /// Terminates every worker for `source_id` by handle. Returns
    /// `NotStarted` if the source is not currently running.
    pub fn stop(&self, source_id: SourceId) -> Result<(), LifecycleError> {
        let (_, running) = self
            .running
            .remove(&source_id)
            .ok_or(LifecycleError::NotStarted(source_id))?;

        running.workers.abort();
        self.hub.unregister(source_id);
        self.registry.unregister_group(source_id);
        self.registry
            .unregister(&RegistryKey::Worker(source_id, Role::Supervisor));
        self.registry
            .unregister(&RegistryKey::Worker(source_id, Role::Cache));
        self.registry
            .unregister(&RegistryKey::Worker(source_id, Role::Buffer));
        self.registry
            .unregister(&RegistryKey::Worker(source_id, Role::Pipeline));
        self.peer_registry.release(source_id);

        info!(source_id, message = %internal_events::SOURCE_STOPPED);
        Ok(())
    }

    /// `stop` then `start`. Fails with `NotStarted` if the source was not
    /// running — a restart is not an implicit start.
    pub fn restart(&self, source: Source, backends: Vec<SourceBackend>) -> Result<(), LifecycleError> {
        if !self.started(source.id) {
            return Err(LifecycleError::NotStarted(source.id));
        }
        self.stop(source.id)?;
        self.start(source, backends)
    }
}
