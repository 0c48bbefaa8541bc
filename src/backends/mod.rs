//! Backend adaptors (C4): polymorphic sinks that validate their own
//! config and ingest event batches.
//!
//! Modeled without inheritance: a tagged registry from type string to an
//! [`AdaptorFactory`], and a capability interface (`validate_config`,
//! `start`, `ingest`) every concrete adaptor implements.

pub mod memory;
pub mod webhook;

use crate::config::SourceBackend;
use crate::error::{AdaptorError, ConfigError};
use crate::event::LogEvent;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A started adaptor instance. `ingest` must return quickly — adaptors
/// hand batches off to their own worker/retry machinery internally.
#[async_trait]
pub trait Adaptor: Send + Sync {
    async fn ingest(&self, events: Vec<LogEvent>) -> Result<(), AdaptorError>;
}

/// A sized wrapper around `Arc<dyn Adaptor>` so it can be stored in the
/// registry's type-erased `Entry::handle` (which requires `Sized` values)
/// and downcast back out by [`crate::dispatcher`].
#[derive(Clone)]
pub struct AdaptorHandle(pub Arc<dyn Adaptor>);

/// The per-type factory: validates raw config and starts instances.
/// `backend_type` is the tag looked up in the [`AdaptorRegistry`].
pub trait AdaptorFactory: Send + Sync {
    fn backend_type(&self) -> &'static str;

    /// Coerces and fully validates a raw config mapping. Errors are
    /// `(field, message)` pairs surfaced with the `config.<field>` prefix
    /// when bubbled up to the outer `SourceBackend` changeset.
    fn cast_and_validate_config(
        &self,
        raw: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<ConfigError>>;

    /// Coerces a raw config mapping into a changeset without validating
    /// it — e.g. stringifying a non-string field. Distinct from
    /// `cast_and_validate_config`, which additionally enforces
    /// business-rule validity; callers that only need type coercion (for
    /// display, or to normalize a partial edit before the user finishes
    /// filling in required fields) use this instead.
    fn cast_config(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        raw.clone()
    }

    /// Starts a worker for an already-validated backend and returns its
    /// ingest handle.
    fn start(&self, backend: &SourceBackend) -> Arc<dyn Adaptor>;
}

/// The compile-time-equivalent mapping from backend type tag to adaptor
/// implementation. Populated once at startup; `cast_and_validate_config`
/// on an unregistered type tag rejects configuration outright.
#[derive(Default)]
pub struct AdaptorRegistry {
    factories: HashMap<&'static str, Arc<dyn AdaptorFactory>>,
}

impl AdaptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with the two built-in adaptors registered: `webhook`
    /// and `memory` (the latter a reference/test adaptor).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(webhook::WebhookFactory));
        registry.register(Arc::new(memory::MemoryFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn AdaptorFactory>) {
        self.factories.insert(factory.backend_type(), factory);
    }

    pub fn get(&self, backend_type: &str) -> Option<Arc<dyn AdaptorFactory>> {
        self.factories.get(backend_type).cloned()
    }

    pub fn validate(
        &self,
        backend_type: &str,
        raw: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<ConfigError>> {
        match self.get(backend_type) {
            Some(factory) => factory.cast_and_validate_config(raw),
            None => Err(vec![ConfigError::new(
                "type",
                format!("unknown backend type {backend_type:?}"),
            )]),
        }
    }

    pub fn start(&self, backend: &SourceBackend) -> Option<Arc<dyn Adaptor>> {
        self.get(&backend.backend_type)
            .map(|factory| factory.start(backend))
    }

    /// Coercion-only pass over a raw config mapping; `None` if
    /// `backend_type` isn't registered.
    pub fn cast(&self, backend_type: &str, raw: &Map<String, Value>) -> Option<Map<String, Value>> {
        self.get(backend_type).map(|factory| factory.cast_config(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_type_is_rejected() {
        let registry = AdaptorRegistry::with_builtins();
        let errors = registry.validate("carrier_pigeon", &Map::new()).unwrap_err();
        assert_eq!(errors[0].field, "type");
    }

    #[test]
    fn cast_on_unknown_backend_type_is_none() {
        let registry = AdaptorRegistry::with_builtins();
        assert!(registry.cast("carrier_pigeon", &Map::new()).is_none());
    }

    #[test]
    fn cast_on_known_backend_type_is_coercion_only() {
        let registry = AdaptorRegistry::with_builtins();
        // memory accepts any config, so cast_config and validate both pass
        // an empty mapping through untouched.
        assert_eq!(registry.cast("memory", &Map::new()), Some(Map::new()));
    }
}
