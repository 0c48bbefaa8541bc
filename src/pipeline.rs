//! The ingestion pipeline (C6): normalizes raw log parameters, applies
//! drop/route rules, and broadcasts surviving events to the cache,
//! buffer, and dispatcher.

use crate::buffer::MemoryBuffer;
use crate::config::Source;
use crate::dispatcher::Dispatcher;
use crate::event::{EventClock, RawEvent, SourceId, SourceToken};
use crate::internal_events;
use crate::pubsub::{source_channel_topic, Message, PubSub};
use crate::recent_logs::RecentLogsCache;
use crate::registry::Registry;
use async_recursion::async_recursion;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// One source's pipeline: normalization clock plus the C2/C3 handles and
/// registry it broadcasts into.
pub struct Pipeline {
    pub source: Source,
    clock: EventClock,
    cache: Arc<RecentLogsCache>,
    buffer: Arc<MemoryBuffer>,
    registry: Arc<Registry>,
    pubsub: Arc<PubSub>,
}

impl Pipeline {
    pub fn new(
        source: Source,
        cache: Arc<RecentLogsCache>,
        buffer: Arc<MemoryBuffer>,
        registry: Arc<Registry>,
        pubsub: Arc<PubSub>,
    ) -> Self {
        Self {
            source,
            clock: EventClock::new(),
            cache,
            buffer,
            registry,
            pubsub,
        }
    }

    /// `ingest(raw_events, source) -> ok`, with rule evaluation enabled.
    /// Always returns `Ok(())`: normalization is total and dropped/failed
    /// events are logged and counted, never surfaced as an error.
    pub async fn ingest(&self, hub: &IngestionHub, raw_events: Vec<RawEvent>) -> anyhow::Result<()> {
        self.ingest_with_rules(hub, raw_events, true).await
    }

    /// Used by [`IngestionHub::ingest_into_sink`] to re-ingest a
    /// rule-routed event with rule evaluation disabled, bounding routing
    /// depth to one hop.
    ///
    /// Routing a matched rule re-enters this method through
    /// [`IngestionHub::ingest_into_sink`] on a different source's pipeline,
    /// so the call graph is (indirectly) recursive; `#[async_recursion]`
    /// boxes the returned future to give it a finite size.
    #[async_recursion]
    pub async fn ingest_with_rules(
        &self,
        hub: &IngestionHub,
        raw_events: Vec<RawEvent>,
        rules_enabled: bool,
    ) -> anyhow::Result<()> {
        if raw_events.is_empty() {
            return Ok(());
        }

        let mut surviving = Vec::with_capacity(raw_events.len());
        for raw in raw_events {
            let event = self.clock.normalize(raw, self.source.token);

            if let Some(filter) = &self.source.drop_filter {
                if filter.is_match(&event) {
                    continue;
                }
            }

            if rules_enabled {
                for rule in &self.source.rules {
                    if rule.is_match(&event) {
                        hub.ingest_into_sink(rule.sink_token, vec![event.body.clone()])
                            .await;
                    }
                }
            }

            surviving.push(event);
        }

        if surviving.is_empty() {
            return Ok(());
        }

        let topic = source_channel_topic(self.source.id);
        for event in &surviving {
            self.pubsub.publish(
                &topic,
                Message::NewEvent {
                    source_id: self.source.id,
                    event_id: event.id,
                },
            );
            trace!(
                source_id = self.source.id,
                event_id = event.id,
                message = %internal_events::NEW_EVENT_PUBLISHED
            );
        }

        self.cache.push(surviving.clone());
        self.buffer.add_many(surviving.clone());
        Dispatcher::new(&self.registry)
            .dispatch(self.source.id, surviving)
            .await;

        Ok(())
    }
}

/// Resolves sink tokens to pipelines so rule routing can re-ingest into a
/// different source. Owns every active source's [`Pipeline`].
#[derive(Default)]
pub struct IngestionHub {
    by_id: DashMap<SourceId, Arc<Pipeline>>,
    token_to_id: DashMap<SourceToken, SourceId>,
}

impl IngestionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pipeline: Arc<Pipeline>) {
        self.token_to_id
            .insert(pipeline.source.token, pipeline.source.id);
        self.by_id.insert(pipeline.source.id, pipeline);
    }

    pub fn unregister(&self, source_id: SourceId) {
        if let Some((_, pipeline)) = self.by_id.remove(&source_id) {
            self.token_to_id.remove(&pipeline.source.token);
        }
    }

    pub fn pipeline(&self, source_id: SourceId) -> Option<Arc<Pipeline>> {
        self.by_id.get(&source_id).map(|p| p.clone())
    }

    pub async fn ingest(&self, source_id: SourceId, raw_events: Vec<RawEvent>) -> anyhow::Result<()> {
        match self.pipeline(source_id) {
            Some(pipeline) => pipeline.ingest(self, raw_events).await,
            None => {
                warn!(source_id, message = %internal_events::INGEST_UNKNOWN_SOURCE);
                Ok(())
            }
        }
    }

    /// Re-ingests a rule-routed event into `token`'s source with rule
    /// evaluation disabled. Missing sinks are logged and otherwise
    /// ignored — a dangling rule must not fail the originating ingest.
    pub async fn ingest_into_sink(&self, token: SourceToken, raw_events: Vec<RawEvent>) {
        let Some(source_id) = self.token_to_id.get(&token).map(|id| *id) else {
            warn!(sink_token = token, message = %internal_events::RULE_SINK_NOT_FOUND);
            return;
        };
        if let Some(pipeline) = self.pipeline(source_id) {
            let _ = pipeline.ingest_with_rules(self, raw_events, false).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryAdaptor;
    use crate::backends::AdaptorHandle;
    use crate::registry::{Entry, RegistryKey};
    use crate::rules::{Matcher, Rule};
    use serde_json::{json, Map};

    fn raw(message: &str) -> RawEvent {
        let mut m = Map::new();
        m.insert("message".to_string(), json!(message));
        m
    }

    fn make_pipeline(id: SourceId, token: SourceToken, source: Source) -> (Arc<Pipeline>, Arc<RecentLogsCache>, Arc<Registry>) {
        let cache = RecentLogsCache::new(id, "node-a", 100);
        let buffer = Arc::new(MemoryBuffer::new(id, 1_000));
        let registry = Arc::new(Registry::new());
        let pubsub = Arc::new(PubSub::new());
        let _ = token;
        (
            Arc::new(Pipeline::new(source, cache.clone(), buffer, registry.clone(), pubsub)),
            cache,
            registry,
        )
    }

    fn attach_memory_adaptor(registry: &Registry, source_id: SourceId) -> Arc<MemoryAdaptor> {
        let adaptor = MemoryAdaptor::start();
        registry
            .register(
                RegistryKey::Backend {
                    source_id,
                    backend_id: 1,
                    sub_role: "ingest",
                },
                Entry::new(Arc::new(AdaptorHandle(adaptor.clone())), Some(source_id)),
            )
            .unwrap();
        adaptor
    }

    #[tokio::test]
    async fn s1_empty_batch_is_a_no_op() {
        let (pipeline, cache, _registry) = make_pipeline(1, 100, Source::new(1, 100, "s"));
        let hub = IngestionHub::new();
        hub.register(pipeline.clone());
        let before = cache.list().len();

        pipeline.ingest(&hub, vec![]).await.unwrap();

        assert_eq!(cache.list().len(), before);
    }

    #[tokio::test]
    async fn surviving_events_publish_new_event_notifications() {
        let cache = RecentLogsCache::new(1, "node-a", 100);
        let buffer = Arc::new(MemoryBuffer::new(1, 1_000));
        let registry = Arc::new(Registry::new());
        let pubsub = Arc::new(PubSub::new());
        let mut rx = pubsub.subscribe(&source_channel_topic(1));

        let pipeline = Arc::new(Pipeline::new(
            Source::new(1, 100, "s"),
            cache,
            buffer,
            registry,
            pubsub,
        ));
        let hub = IngestionHub::new();
        hub.register(pipeline.clone());

        pipeline.ingest(&hub, vec![raw("testing 123")]).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(matches!(*msg, Message::NewEvent { source_id: 1, .. }));
    }

    #[tokio::test]
    async fn s2_message_is_renamed_to_event_message() {
        let (pipeline, cache, _registry) = make_pipeline(1, 100, Source::new(1, 100, "s"));
        let hub = IngestionHub::new();
        hub.register(pipeline.clone());

        pipeline.ingest(&hub, vec![raw("testing 123")]).await.unwrap();

        let event = cache.latest().unwrap();
        assert_eq!(event.body.get("event_message"), Some(&json!("testing 123")));
        assert!(event.body.get("message").is_none());
    }

    #[tokio::test]
    async fn s3_non_map_metadata_is_preserved() {
        let (pipeline, cache, _registry) = make_pipeline(1, 100, Source::new(1, 100, "s"));
        let hub = IngestionHub::new();
        hub.register(pipeline.clone());

        let mut event_raw = Map::new();
        event_raw.insert("event_message".to_string(), json!("any"));
        event_raw.insert("metadata".to_string(), json!("some_value"));

        pipeline.ingest(&hub, vec![event_raw]).await.unwrap();

        let event = cache.latest().unwrap();
        assert_eq!(event.body.get("metadata"), Some(&json!("some_value")));
    }

    #[tokio::test]
    async fn s4_drop_filter_hides_matching_events_from_cache_and_backends() {
        let source = Source::new(1, 100, "s").with_drop_filter(Matcher::compile_query("testing"));
        let (pipeline, cache, registry) = make_pipeline(1, 100, source);
        let adaptor = attach_memory_adaptor(&registry, 1);
        let hub = IngestionHub::new();
        hub.register(pipeline.clone());
        let before = cache.list().len();

        pipeline.ingest(&hub, vec![raw("testing 123")]).await.unwrap();

        assert_eq!(cache.list().len(), before);
        assert_eq!(adaptor.received_count(), 0);
    }

    #[tokio::test]
    async fn s5_lql_routing_delivers_to_both_sources() {
        let sink = Source::new(2, 200, "t");
        let (sink_pipeline, sink_cache, sink_registry) = make_pipeline(2, 200, sink);
        let sink_adaptor = attach_memory_adaptor(&sink_registry, 2);

        let rule = Rule::new(Matcher::compile_query("testing"), 200);
        let source = Source::new(1, 100, "s").with_rules(vec![rule]);
        let (pipeline, _cache, registry) = make_pipeline(1, 100, source);
        let source_adaptor = attach_memory_adaptor(&registry, 1);

        let hub = IngestionHub::new();
        hub.register(pipeline.clone());
        hub.register(sink_pipeline.clone());

        pipeline
            .ingest(&hub, vec![raw("not routed"), raw("testing 123")])
            .await
            .unwrap();

        assert_eq!(source_adaptor.received_count(), 2);
        assert_eq!(sink_adaptor.received_count(), 1);
        assert_eq!(sink_cache.list().iter().filter(|e| !e.is_system_log_event()).count(), 1);
    }

    #[tokio::test]
    async fn s6_routing_depth_is_bounded_to_one_hop() {
        let u = Source::new(3, 300, "u");
        let (u_pipeline, _u_cache, u_registry) = make_pipeline(3, 300, u);
        let u_adaptor = attach_memory_adaptor(&u_registry, 3);

        let t_rule = Rule::new(Matcher::compile_query("testing"), 300);
        let t = Source::new(2, 200, "t").with_rules(vec![t_rule]);
        let (t_pipeline, _t_cache, t_registry) = make_pipeline(2, 200, t);
        let t_adaptor = attach_memory_adaptor(&t_registry, 2);

        let s_rule = Rule::new(Matcher::compile_query("testing"), 200);
        let s = Source::new(1, 100, "s").with_rules(vec![s_rule]);
        let (s_pipeline, _s_cache, s_registry) = make_pipeline(1, 100, s);
        let s_adaptor = attach_memory_adaptor(&s_registry, 1);

        let hub = IngestionHub::new();
        hub.register(s_pipeline.clone());
        hub.register(t_pipeline.clone());
        hub.register(u_pipeline.clone());

        s_pipeline
            .ingest(&hub, vec![raw("testing 123")])
            .await
            .unwrap();

        assert_eq!(s_adaptor.received_count(), 1);
        assert_eq!(t_adaptor.received_count(), 1);
        assert_eq!(u_adaptor.received_count(), 0);
    }
}
