//! Per-source log ingestion, routing, and live-tail core.
//!
//! This crate implements the hardest part of a log management service: the
//! per-source runtime that ingests raw log parameters, normalizes them into
//! [`event::LogEvent`]s, applies drop/route rules, fans events out to
//! pluggable backend adaptors, and keeps a bounded recent-logs window that
//! can be queried locally or aggregated across a cluster of nodes.
//!
//! Persistent storage of log bodies, auth, the web UI, and analytics are
//! explicitly out of scope; those are modeled as opaque collaborators
//! reached through the [`store::StoreClient`] and [`backends::Adaptor`]
//! traits.

pub mod backends;
pub mod buffer;
pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod internal_events;
pub mod peer_registry;
pub mod pipeline;
pub mod pubsub;
pub mod recent_logs;
pub mod registry;
pub mod rules;
pub mod store;
pub mod supervise;
pub mod supervisor;

pub use error::{AdaptorError, ClusterError, ConfigError, LifecycleError};
pub use event::LogEvent;

/// Crate-wide result type for operations whose failure is a genuine
/// programmer/contract violation rather than a domain-level outcome.
pub type Result<T> = anyhow::Result<T>;

/// Installs a JSON-formatted `tracing` subscriber reading its filter from
/// `RUST_LOG` (default `info`). Safe to call more than once; later calls
/// are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).json().try_init();
}
