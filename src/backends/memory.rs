//! The in-process "memory" adaptor: appends ingested batches to a bounded
//! in-memory buffer instead of performing any I/O. A reference/test
//! adaptor, the equivalent of a `blackhole`-style sink used for testing
//! the dispatcher's multi-adaptor fan-out without a live server.

use super::{Adaptor, AdaptorFactory};
use crate::config::SourceBackend;
use crate::error::{AdaptorError, ConfigError};
use crate::event::LogEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct MemoryFactory;

impl AdaptorFactory for MemoryFactory {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    fn cast_and_validate_config(
        &self,
        _raw: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<ConfigError>> {
        // No required fields; the memory adaptor accepts any config.
        Ok(Map::new())
    }

    fn start(&self, _backend: &SourceBackend) -> Arc<dyn Adaptor> {
        MemoryAdaptor::start()
    }
}

/// Retains every batch it has ever ingested, for inspection in tests.
pub struct MemoryAdaptor {
    received: Mutex<Vec<LogEvent>>,
}

impl MemoryAdaptor {
    pub fn start() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<LogEvent> {
        self.received.lock().clone()
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl Adaptor for MemoryAdaptor {
    async fn ingest(&self, events: Vec<LogEvent>) -> Result<(), AdaptorError> {
        self.received.lock().extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn accumulates_every_ingested_batch() {
        let adaptor = MemoryAdaptor::start();
        let event = LogEvent {
            id: 1,
            source_token: 0,
            ingested_at: 0,
            body: Map::new(),
            params: Map::new(),
        };
        adaptor.ingest(vec![event.clone()]).await.unwrap();
        adaptor.ingest(vec![event]).await.unwrap();
        assert_eq!(adaptor.received_count(), 2);
    }
}
