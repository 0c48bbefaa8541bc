//! Typed errors for the lifecycle, configuration, transport, and adaptor
//! boundaries. The ingestion pipeline itself never returns `Err` for
//! malformed input; only these boundary operations do.

use thiserror::Error;

/// Errors surfaced from [`crate::supervisor::SourceSupervisor`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("source {0} is already started")]
    AlreadyStarted(u64),

    #[error("source {0} is not started")]
    NotStarted(u64),
}

/// A single field-level configuration error, surfaced with the
/// `config.<field>` prefix when bubbled up to an outer changeset.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("config.{field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors from the cluster aggregator's peer transport. Always absorbed by
/// falling back to the local recent-logs list; never propagated to callers
/// of `list_for_cluster`.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("peer {peer} timed out after {elapsed_ms}ms")]
    Timeout { peer: String, elapsed_ms: u64 },

    #[error("peer {peer} transport error: {source}")]
    Transport {
        peer: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors owned entirely by a backend adaptor. The dispatcher only logs
/// that a dispatch returned one of these; it never retries on the
/// adaptor's behalf.
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error("adaptor {adaptor} rejected config: {0:?}", .errors)]
    InvalidConfig {
        adaptor: String,
        errors: Vec<ConfigError>,
    },

    #[error("adaptor {adaptor} delivery failed: {source}")]
    Delivery {
        adaptor: String,
        #[source]
        source: anyhow::Error,
    },
}
