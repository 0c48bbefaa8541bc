//! The per-source memory buffer (C3): a bounded FIFO that feeds the
//! pipeline's downstream consumer.
//!
//! Overflow policy is drop-oldest: `add_many` never blocks or fails, and an
//! overflow just evicts the oldest buffered events, logging a
//! `buffer_overflows_total` warning.

use crate::event::{LogEvent, SourceId};
use crate::internal_events;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

pub struct MemoryBuffer {
    source_id: SourceId,
    capacity: usize,
    queue: Mutex<VecDeque<LogEvent>>,
}

impl MemoryBuffer {
    pub fn new(source_id: SourceId, capacity: usize) -> Self {
        Self {
            source_id,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Non-blocking; always succeeds. Drops the oldest buffered events
    /// first when `capacity` would be exceeded.
    pub fn add_many(&self, events: impl IntoIterator<Item = LogEvent>) {
        let mut queue = self.queue.lock();
        let mut dropped = 0u64;
        for event in events {
            if queue.len() >= self.capacity {
                queue.pop_front();
                dropped += 1;
            }
            queue.push_back(event);
        }
        if dropped > 0 {
            warn!(
                source_id = self.source_id,
                dropped,
                message = %internal_events::BUFFER_OVERFLOWS_TOTAL
            );
        }
    }

    pub fn drain(&self) -> Vec<LogEvent> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn dummy_event(id: u64) -> LogEvent {
        LogEvent {
            id,
            source_token: 0,
            ingested_at: id,
            body: Map::new(),
            params: Map::new(),
        }
    }

    #[test]
    fn add_many_never_exceeds_capacity() {
        let buffer = MemoryBuffer::new(1, 2);
        buffer.add_many(vec![dummy_event(1), dummy_event(2), dummy_event(3)]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn drop_oldest_keeps_newest_events() {
        let buffer = MemoryBuffer::new(1, 2);
        buffer.add_many(vec![dummy_event(1), dummy_event(2), dummy_event(3)]);
        let remaining: Vec<_> = buffer.drain().into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![2, 3]);
    }
}
