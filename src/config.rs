//! Typed configuration: per-source definitions and the crate-wide
//! [`RuntimeConfig`] tunables.
//!
//! Every config struct here follows a strict `#[serde(default)]` plus
//! explicit `Default` impl discipline for every tunable, so a
//! partially-specified TOML document still produces a fully valid config.

use crate::event::{SourceId, SourceToken};
use crate::rules::Rule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A log source: the unit of ingestion, caching, and routing.
///
/// Immutable from the core's perspective — mutating a source's rules or
/// backends means restarting its supervisor.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub token: SourceToken,
    pub owner_id: u64,
    pub name: String,
    pub notification_cadence_ms: u64,
    pub rules: Vec<Rule>,
    pub drop_filter: Option<crate::rules::Matcher>,
}

impl Source {
    pub fn new(id: SourceId, token: SourceToken, name: impl Into<String>) -> Self {
        Self {
            id,
            token,
            owner_id: 0,
            name: name.into(),
            notification_cadence_ms: 0,
            rules: Vec::new(),
            drop_filter: None,
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_drop_filter(mut self, matcher: crate::rules::Matcher) -> Self {
        self.drop_filter = Some(matcher);
        self
    }
}

/// The adaptor type tag. Looked up in the compile-time adaptor
/// registration table; an unregistered tag cannot be stored as a
/// [`SourceBackend`].
pub type BackendType = String;

/// `(id, source_id, type, config)` — the persisted shape of a backend
/// attached to a source. `config` is validated by the adaptor before this
/// value is constructed; see [`crate::backends::Adaptor::cast_and_validate_config`].
#[derive(Debug, Clone)]
pub struct SourceBackend {
    pub id: u64,
    pub source_id: SourceId,
    pub backend_type: BackendType,
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// Crate-wide tunables, deserializable from TOML
/// (`RuntimeConfig::from_toml_str`), with defaults matching a single-node
/// development deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pub/sub shard fan-out. Must be >= 1.
    pub pool_size: u32,
    /// Recent-logs cache capacity per source.
    pub cache_capacity: usize,
    /// Broadcast tick interval, in milliseconds.
    pub broadcast_interval_ms: u64,
    /// Touch tick base interval, in milliseconds (before jitter).
    pub touch_interval_base_ms: u64,
    /// Touch tick jitter upper bound, in milliseconds.
    pub touch_interval_jitter_ms: u64,
    /// Cluster `list_for_cluster` hard deadline, in milliseconds.
    pub cluster_deadline_ms: u64,
    /// Per-source in-memory buffer capacity (C3).
    pub buffer_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            cache_capacity: 100,
            broadcast_interval_ms: 500,
            touch_interval_base_ms: 45 * 60 * 1000,
            touch_interval_jitter_ms: 30 * 60 * 1000,
            cluster_deadline_ms: 5_000,
            buffer_capacity: 1_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn cluster_deadline(&self) -> Duration {
        Duration::from_millis(self.cluster_deadline_ms)
    }

    /// Samples a touch interval: base + uniform jitter in `[0, jitter]`.
    pub fn touch_interval(&self) -> Duration {
        use rand::Rng;
        let jitter = if self.touch_interval_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.touch_interval_jitter_ms)
        };
        Duration::from_millis(self.touch_interval_base_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.cache_capacity, 100);
        assert_eq!(cfg.broadcast_interval_ms, 500);
        assert_eq!(cfg.cluster_deadline_ms, 5_000);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg = RuntimeConfig::from_toml_str("pool_size = 8\n").unwrap();
        assert_eq!(cfg.pool_size, 8);
        assert_eq!(cfg.cache_capacity, 100);
    }
}
