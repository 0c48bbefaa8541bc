//! The normalized event record and the normalization step of the
//! ingestion pipeline.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 128-bit opaque source token. Sources are otherwise identified by a
/// numeric id; the token is the stable external handle.
pub type SourceToken = u128;
pub type SourceId = u64;

/// Raw, untyped log parameters as received from a caller, before
/// normalization. Keys and values are arbitrary JSON.
pub type RawEvent = Map<String, Value>;

/// A normalized log event. Every event downstream of normalization
/// carries a non-empty `event_message` in `body` and a monotonically
/// non-decreasing `ingested_at` per source.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub id: u64,
    pub source_token: SourceToken,
    pub ingested_at: u64,
    pub body: Map<String, Value>,
    pub params: RawEvent,
}

impl LogEvent {
    /// `true` when this event was synthesized by the core itself (e.g. the
    /// recent-logs cache's boot marker) rather than received from a caller.
    pub fn is_system_log_event(&self) -> bool {
        matches!(self.params.get("is_system_log_event?"), Some(Value::Bool(true)))
    }

    pub fn event_message(&self) -> Option<&str> {
        self.body.get("event_message").and_then(Value::as_str)
    }
}

/// Per-source id/clock state used to assign monotonic `id`s and
/// `ingested_at` timestamps during normalization.
///
/// `id` is a per-source atomic counter, `ingested_at` a monotonic clock
/// sample taken once per event in batch order. Both are individually
/// non-decreasing per source even though two concurrent `ingest` calls may
/// interleave.
#[derive(Debug, Default)]
pub struct EventClock {
    next_id: AtomicU64,
}

impl EventClock {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Normalizes one raw event into a [`LogEvent`]. Pure with respect to
    /// its input except for the id/clock side effects above; never fails,
    /// since normalization is total over any well-formed JSON object.
    pub fn normalize(&self, raw: RawEvent, source_token: SourceToken) -> LogEvent {
        let mut body = raw.clone();

        if let Some(message) = body.remove("message") {
            body.entry("event_message".to_string()).or_insert(message);
        }
        // metadata, if present and not an object, is left untouched verbatim.

        LogEvent {
            id: self.next_id(),
            source_token,
            ingested_at: self.now_millis(),
            body,
            params: raw,
        }
    }
}
