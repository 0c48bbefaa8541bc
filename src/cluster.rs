//! The cluster aggregator (C8): fans list/count queries out to peer
//! nodes and merges the results under a hard deadline.

use crate::error::ClusterError;
use crate::event::{LogEvent, SourceId};
use crate::internal_events;
use crate::recent_logs::RecentLogsCache;
use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The peer transport seam, kept transport-agnostic: a production
/// deployment plugs in gRPC/HTTP here; this crate ships only
/// [`InProcessTransport`] for single-process testing.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn list(&self, peer: &str, source_id: SourceId) -> Result<Vec<LogEvent>, ClusterError>;

    /// The peer's locally observed insert count for `source_id`, used to
    /// fold into the cluster-wide total.
    async fn insert_count(&self, peer: &str, source_id: SourceId) -> Result<u64, ClusterError>;
}

/// An in-process transport that resolves peers through a small registry
/// of peer name -> per-source cache handles. Sufficient to exercise the
/// aggregator's merge/deadline/fallback logic without real network peers.
#[derive(Default)]
pub struct InProcessTransport {
    peers: dashmap::DashMap<(String, SourceId), Arc<RecentLogsCache>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_peer_cache(&self, peer: impl Into<String>, cache: Arc<RecentLogsCache>) {
        self.peers.insert((peer.into(), cache.source_id()), cache);
    }
}

#[async_trait]
impl ClusterTransport for InProcessTransport {
    async fn list(&self, peer: &str, source_id: SourceId) -> Result<Vec<LogEvent>, ClusterError> {
        match self.peers.get(&(peer.to_string(), source_id)) {
            Some(cache) => Ok(cache.list()),
            None => Err(ClusterError::Transport {
                peer: peer.to_string(),
                source: anyhow::anyhow!("no cache registered for peer {peer} source {source_id}"),
            }),
        }
    }

    async fn insert_count(&self, peer: &str, source_id: SourceId) -> Result<u64, ClusterError> {
        match self.peers.get(&(peer.to_string(), source_id)) {
            Some(cache) => Ok(cache.inserts_since_boot()),
            None => Err(ClusterError::Transport {
                peer: peer.to_string(),
                source: anyhow::anyhow!("no cache registered for peer {peer} source {source_id}"),
            }),
        }
    }
}

pub struct ClusterAggregator {
    transport: Arc<dyn ClusterTransport>,
    peers: Vec<String>,
    deadline: Duration,
}

impl ClusterAggregator {
    pub fn new(transport: Arc<dyn ClusterTransport>, peers: Vec<String>, deadline: Duration) -> Self {
        Self {
            transport,
            peers,
            deadline,
        }
    }

    /// Enumerates peers, requests `list(source_id)` from each, collects
    /// results under the configured deadline (cancelling stragglers),
    /// merges, sorts by `body.timestamp` ascending, and keeps the last
    /// 100. Falls back to `local` entirely if the collection step fails
    /// (every peer erroring or timing out).
    pub async fn list_for_cluster(
        &self,
        source_id: SourceId,
        local: Vec<LogEvent>,
    ) -> Vec<LogEvent> {
        if self.peers.is_empty() {
            return truncate_sorted(local);
        }

        let mut in_flight = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(self.peers.len());

        for peer in &self.peers {
            let transport = self.transport.clone();
            let peer = peer.clone();
            let handle = tokio::spawn(async move {
                let result = transport.list(&peer, source_id).await;
                (peer, result)
            });
            abort_handles.push(handle.abort_handle());
            in_flight.push(handle);
        }

        let sleep = tokio::time::sleep(self.deadline);
        tokio::pin!(sleep);

        let mut collected = Vec::new();
        let mut any_peer_succeeded = false;
        let mut completed: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                biased;
                next = in_flight.next(), if !in_flight.is_empty() => {
                    match next {
                        Some(Ok((peer, Ok(events)))) => {
                            any_peer_succeeded = true;
                            collected.extend(events);
                            completed.insert(peer);
                        }
                        Some(Ok((peer, Err(err)))) => {
                            warn!(peer, error = %err, message = %internal_events::CLUSTER_PEER_LIST_FAILED);
                            completed.insert(peer);
                        }
                        Some(Err(_join_err)) => {}
                        None => break,
                    }
                }
                _ = &mut sleep => {
                    for peer in &self.peers {
                        if !completed.contains(peer) {
                            let err = ClusterError::Timeout {
                                peer: peer.clone(),
                                elapsed_ms: self.deadline.as_millis() as u64,
                            };
                            warn!(peer, error = %err, message = %internal_events::CLUSTER_PEER_LIST_FAILED);
                        }
                    }
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        if !any_peer_succeeded {
            return truncate_sorted(local);
        }

        collected.extend(local);
        truncate_sorted(collected)
    }

    /// Fans `insert_count(source_id)` out to every peer under the
    /// configured deadline and sums the successful responses with
    /// `local_inserts`. A peer that errors or times out is simply
    /// excluded from the sum, the same fallback behavior as
    /// `list_for_cluster`.
    pub async fn sync_insert_total(&self, source_id: SourceId, local_inserts: u64) -> u64 {
        if self.peers.is_empty() {
            return local_inserts;
        }

        let mut in_flight = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(self.peers.len());

        for peer in &self.peers {
            let transport = self.transport.clone();
            let peer = peer.clone();
            let handle = tokio::spawn(async move {
                let result = transport.insert_count(&peer, source_id).await;
                (peer, result)
            });
            abort_handles.push(handle.abort_handle());
            in_flight.push(handle);
        }

        let sleep = tokio::time::sleep(self.deadline);
        tokio::pin!(sleep);

        let mut total = local_inserts;
        let mut completed: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                biased;
                next = in_flight.next(), if !in_flight.is_empty() => {
                    match next {
                        Some(Ok((peer, Ok(count)))) => {
                            total += count;
                            completed.insert(peer);
                        }
                        Some(Ok((peer, Err(err)))) => {
                            warn!(peer, error = %err, message = %internal_events::CLUSTER_PEER_LIST_FAILED);
                            completed.insert(peer);
                        }
                        Some(Err(_join_err)) => {}
                        None => break,
                    }
                }
                _ = &mut sleep => {
                    for peer in &self.peers {
                        if !completed.contains(peer) {
                            let err = ClusterError::Timeout {
                                peer: peer.clone(),
                                elapsed_ms: self.deadline.as_millis() as u64,
                            };
                            warn!(peer, error = %err, message = %internal_events::CLUSTER_PEER_LIST_FAILED);
                        }
                    }
                    for handle in &abort_handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        total
    }

    /// Local-only: the most recent `ingested_at`, or 0 if nothing has
    /// been observed.
    pub fn latest_date(cache: &RecentLogsCache) -> u64 {
        cache.latest().map(|e| e.ingested_at).unwrap_or(0)
    }
}

fn sort_key(event: &LogEvent) -> i64 {
    match event.body.get("timestamp") {
        Some(v) => v.as_i64().unwrap_or(event.ingested_at as i64),
        None => event.ingested_at as i64,
    }
}

fn truncate_sorted(mut events: Vec<LogEvent>) -> Vec<LogEvent> {
    events.sort_by_key(sort_key);
    if events.len() > 100 {
        let drop = events.len() - 100;
        events.drain(0..drop);
    }
    events
}
