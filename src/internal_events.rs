//! Named tracing events: every lifecycle, ingestion, and cluster event
//! this crate logs does so under one of these names (via `message = %...`)
//! rather than an ad hoc interpolated string, so a log aggregator can
//! reliably group and alert on them. Adaptor-internal diagnostics (e.g.
//! webhook delivery attempts) are narrower in scope and keep their own
//! literal event names.
//!
//! This module exists as the single place the event names are declared;
//! call sites pass one of these as `message = %internal_events::NAME`.

/// `C3` dropped the oldest buffered events to stay within capacity.
pub const BUFFER_OVERFLOWS_TOTAL: &str = "buffer_overflows_total";

/// `C6` received an `ingest` call for a source with no running pipeline.
pub const INGEST_UNKNOWN_SOURCE: &str = "ingest_unknown_source";

/// A rule's sink token did not resolve to any registered source.
pub const RULE_SINK_NOT_FOUND: &str = "rule_sink_not_found";

/// A backend adaptor's `ingest` call returned an error; owned entirely by
/// the adaptor, never retried by the dispatcher.
pub const ADAPTOR_DISPATCH_FAILED: &str = "adaptor_dispatch_failed";

/// `C7` finished starting every worker for a source.
pub const SOURCE_STARTED: &str = "source_started";

/// `C7` finished tearing down every worker for a source.
pub const SOURCE_STOPPED: &str = "source_stopped";

/// `C8` could not reach a peer within the cluster list deadline, or the
/// peer returned an error.
pub const CLUSTER_PEER_LIST_FAILED: &str = "cluster_peer_list_failed";

/// `C2`'s touch timer updated a source's `log_events_updated_at` field.
pub const LOG_EVENTS_UPDATED_AT_TOUCHED: &str = "log_events_updated_at_touched";

/// A supervised background task panicked and was respawned in place.
pub const SUPERVISED_TASK_RESTARTED: &str = "supervised_task_restarted";

/// A new event was ingested and broadcast on a source's channel topic.
pub const NEW_EVENT_PUBLISHED: &str = "new_event_published";
