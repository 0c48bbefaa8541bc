//! In-process pub/sub: a registry of `tokio::sync::broadcast` channels
//! keyed by topic string, one per insert-count shard plus one per source
//! for channel topics.
//!
//! This is an in-process analogue of a topic-based broker; it makes no
//! claim to be a distributed message bus.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum Message {
    /// `{inserts, source_id, {node -> {node_inserts, bq_inserts}}}`.
    Inserts {
        source_id: u64,
        node_inserts: u64,
        bq_inserts: u64,
    },
    /// A `log_count` event published when the cluster-wide cached total
    /// grows.
    LogCount { source_id: u64, total: u64 },
    /// A `new_event` notification for a source's channel topic.
    NewEvent { source_id: u64, event_id: u64 },
}

/// Computes the shard topic for a source: `inserts:shard-<hash(source_id)
/// mod pool_size>`.
pub fn insert_shard_topic(source_id: u64, pool_size: u32) -> String {
    let shard = source_id % pool_size.max(1) as u64;
    format!("inserts:shard-{shard}")
}

pub fn source_channel_topic(source_id: u64) -> String {
    format!("source:{source_id}")
}

pub struct PubSub {
    topics: DashMap<String, broadcast::Sender<Arc<Message>>>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<Arc<Message>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Publishes `message` on `topic`. A no-op (no error) when there are no
    /// subscribers, matching a fire-and-forget broadcast.
    pub fn publish(&self, topic: &str, message: Message) {
        let sender = self.sender_for(topic);
        let _ = sender.send(Arc::new(message));
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Arc<Message>> {
        self.sender_for(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_topic_is_stable_for_a_source() {
        let a = insert_shard_topic(42, 4);
        let b = insert_shard_topic(42, 4);
        assert_eq!(a, b);
        assert!(a.starts_with("inserts:shard-"));
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let pubsub = PubSub::new();
        let mut rx = pubsub.subscribe("inserts:shard-0");
        pubsub.publish(
            "inserts:shard-0",
            Message::Inserts {
                source_id: 1,
                node_inserts: 1,
                bq_inserts: 1,
            },
        );
        let msg = rx.recv().await.unwrap();
        assert!(matches!(*msg, Message::Inserts { source_id: 1, .. }));
    }
}
