//! The recent-logs cache (C2) and the rate/insert broadcaster that runs
//! inside it (C9).

use crate::cluster::ClusterAggregator;
use crate::config::RuntimeConfig;
use crate::event::{LogEvent, SourceId};
use crate::internal_events;
use crate::pubsub::{insert_shard_topic, source_channel_topic, Message, PubSub};
use crate::store::StoreClient;
use crate::supervise::SupervisedTask;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const TOUCH_THRESHOLD_MS: u64 = 45 * 60 * 1000;

struct State {
    events: VecDeque<LogEvent>,
    latest: Option<LogEvent>,
}

/// Per-source bounded FIFO of the last `capacity` events, plus the insert
/// counters C9 broadcasts. One instance per source; created (possibly
/// lazily, under an advisory per-source lock) the first time a source is
/// read or ingested into.
pub struct RecentLogsCache {
    source_id: SourceId,
    node_id: String,
    capacity: usize,
    state: Mutex<State>,
    inserts_since_boot: AtomicU64,
    total_cluster_inserts: AtomicU64,
    last_broadcast_inserts: AtomicU64,
    last_broadcast_total: AtomicU64,
}

impl RecentLogsCache {
    pub fn new(source_id: SourceId, node_id: impl Into<String>, capacity: usize) -> Arc<Self> {
        let node_id = node_id.into();
        let cache = Arc::new(Self {
            source_id,
            node_id: node_id.clone(),
            capacity,
            state: Mutex::new(State {
                events: VecDeque::with_capacity(capacity.min(1024)),
                latest: None,
            }),
            inserts_since_boot: AtomicU64::new(0),
            total_cluster_inserts: AtomicU64::new(0),
            last_broadcast_inserts: AtomicU64::new(0),
            last_broadcast_total: AtomicU64::new(0),
        });
        cache.push(vec![cache.boot_marker()]);
        cache
    }

    fn boot_marker(&self) -> LogEvent {
        let mut body = Map::new();
        body.insert(
            "event_message".to_string(),
            Value::String(format!("Initialized on node {}", self.node_id)),
        );
        let mut params = Map::new();
        params.insert("is_system_log_event?".to_string(), Value::Bool(true));
        LogEvent {
            id: 0,
            source_token: 0,
            ingested_at: now_millis(),
            body,
            params,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Appends `events` in order, evicting the oldest when full. `latest`
    /// tracks the newest push even across evictions.
    pub fn push(&self, events: Vec<LogEvent>) {
        if events.is_empty() {
            return;
        }
        let count = events.len() as u64;
        let mut state = self.state.lock();
        for event in events {
            if state.events.len() >= self.capacity {
                state.events.pop_front();
            }
            state.latest = Some(event.clone());
            state.events.push_back(event);
        }
        drop(state);
        self.inserts_since_boot.fetch_add(count, Ordering::Relaxed);
    }

    pub fn list(&self) -> Vec<LogEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<LogEvent> {
        self.state.lock().latest.clone()
    }

    pub fn inserts_since_boot(&self) -> u64 {
        self.inserts_since_boot.load(Ordering::Relaxed)
    }

    pub fn total_cluster_inserts(&self) -> u64 {
        self.total_cluster_inserts.load(Ordering::Relaxed)
    }

    /// Sets the cluster-wide insert total to `total`, as computed by
    /// [`ClusterAggregator::sync_insert_total`] from this node's local
    /// count plus every peer's reported count. Absolute, not additive —
    /// each sync supersedes the last rather than accumulating on top of
    /// it.
    pub fn record_cluster_inserts(&self, total: u64) {
        self.total_cluster_inserts.store(total, Ordering::Relaxed);
    }

    fn newest_non_system_age_ms(&self) -> Option<u64> {
        let state = self.state.lock();
        state
            .events
            .iter()
            .rev()
            .find(|e| !e.is_system_log_event())
            .map(|e| now_millis().saturating_sub(e.ingested_at))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The two periodic workers driving the cache: a 500ms broadcast tick and
/// a ~45min+jitter touch tick. Spawned by the source supervisor alongside
/// the cache; each runs under [`SupervisedTask`] so a panic respawns it
/// rather than leaving the cache un-broadcast forever. Aborted on
/// supervisor stop.
pub struct RecentLogsWorkers {
    broadcast: SupervisedTask,
    touch: SupervisedTask,
}

impl RecentLogsWorkers {
    pub fn spawn(
        cache: Arc<RecentLogsCache>,
        pubsub: Arc<PubSub>,
        store: Arc<dyn StoreClient>,
        cluster: Arc<ClusterAggregator>,
        config: RuntimeConfig,
    ) -> Self {
        let broadcast = SupervisedTask::spawn({
            let cache = cache.clone();
            let pubsub = pubsub.clone();
            let cluster = cluster.clone();
            let config = config.clone();
            move || {
                broadcast_loop(cache.clone(), pubsub.clone(), cluster.clone(), config.clone())
            }
        });
        let touch = SupervisedTask::spawn({
            let cache = cache.clone();
            let store = store.clone();
            let config = config.clone();
            move || touch_loop(cache.clone(), store.clone(), config.clone())
        });
        Self { broadcast, touch }
    }

    pub fn abort(&self) {
        self.broadcast.abort();
        self.touch.abort();
    }
}

impl Drop for RecentLogsWorkers {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn broadcast_loop(
    cache: Arc<RecentLogsCache>,
    pubsub: Arc<PubSub>,
    cluster: Arc<ClusterAggregator>,
    config: RuntimeConfig,
) {
    let mut interval = tokio::time::interval(config.broadcast_interval());
    loop {
        interval.tick().await;

        let inserts = cache.inserts_since_boot();
        let last_inserts = cache.last_broadcast_inserts.swap(inserts, Ordering::Relaxed);
        if inserts > last_inserts {
            let topic = insert_shard_topic(cache.source_id(), config.pool_size);
            pubsub.publish(
                &topic,
                Message::Inserts {
                    source_id: cache.source_id(),
                    node_inserts: inserts - last_inserts,
                    bq_inserts: 0,
                },
            );
        }

        let cluster_total = cluster.sync_insert_total(cache.source_id(), inserts).await;
        cache.record_cluster_inserts(cluster_total);

        let total = cache.total_cluster_inserts();
        let last_total = cache.last_broadcast_total.swap(total, Ordering::Relaxed);
        if total > last_total {
            pubsub.publish(
                &source_channel_topic(cache.source_id()),
                Message::LogCount {
                    source_id: cache.source_id(),
                    total,
                },
            );
        }
    }
}

async fn touch_loop(cache: Arc<RecentLogsCache>, store: Arc<dyn StoreClient>, config: RuntimeConfig) {
    loop {
        tokio::time::sleep(config.touch_interval()).await;

        if let Some(age) = cache.newest_non_system_age_ms() {
            if age < TOUCH_THRESHOLD_MS {
                let at = now_millis();
                store.touch_log_events_updated_at(cache.source_id(), at).await;
                info!(
                    source_id = cache.source_id(),
                    message = %internal_events::LOG_EVENTS_UPDATED_AT_TOUCHED
                );
            }
        }
    }
}
