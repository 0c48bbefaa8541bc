//! The webhook adaptor: POSTs a JSON array of events to a configured URL.
//!
//! Config validation happens up front, delivery happens on a dedicated
//! background task so `ingest` never blocks the dispatcher, and transient
//! failures are retried with backoff rather than surfaced to the caller.

use super::{Adaptor, AdaptorFactory};
use crate::config::SourceBackend;
use crate::error::{AdaptorError, ConfigError};
use crate::event::LogEvent;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
}

pub struct WebhookFactory;

impl AdaptorFactory for WebhookFactory {
    fn backend_type(&self) -> &'static str {
        "webhook"
    }

    fn cast_and_validate_config(
        &self,
        raw: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let url = match raw.get("url").and_then(Value::as_str) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Some(url.to_string())
            }
            Some(_) => {
                errors.push(ConfigError::new("url", "must start with http:// or https://"));
                None
            }
            None => {
                errors.push(ConfigError::new("url", "is required"));
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut validated = Map::new();
        validated.insert("url".to_string(), Value::String(url.unwrap()));
        Ok(validated)
    }

    fn cast_config(&self, raw: &Map<String, Value>) -> Map<String, Value> {
        let mut changeset = raw.clone();
        if let Some(url) = changeset.get("url").cloned() {
            if !url.is_string() {
                changeset.insert("url".to_string(), Value::String(url.to_string()));
            }
        }
        changeset
    }

    fn start(&self, backend: &SourceBackend) -> Arc<dyn Adaptor> {
        let url = backend
            .config
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        WebhookAdaptor::start(WebhookConfig { url })
    }
}

pub struct WebhookAdaptor {
    tx: mpsc::UnboundedSender<Vec<LogEvent>>,
    worker: tokio::task::JoinHandle<()>,
}

impl WebhookAdaptor {
    pub fn start(config: WebhookConfig) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(config, rx));
        Arc::new(Self { tx, worker })
    }
}

impl Drop for WebhookAdaptor {
    // `run_worker` owns the only receiver for `tx`, so a crash here can't
    // be recovered by respawning with a fresh channel; just stop leaking
    // the task once nothing can reach it anymore.
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[async_trait]
impl Adaptor for WebhookAdaptor {
    async fn ingest(&self, events: Vec<LogEvent>) -> Result<(), AdaptorError> {
        self.tx.send(events).map_err(|err| AdaptorError::Delivery {
            adaptor: "webhook".to_string(),
            source: anyhow::anyhow!("worker channel closed: {err}"),
        })
    }
}

async fn run_worker(config: WebhookConfig, mut rx: mpsc::UnboundedReceiver<Vec<LogEvent>>) {
    let client = reqwest::Client::new();
    while let Some(events) = rx.recv().await {
        let bodies: Vec<&Map<String, Value>> = events.iter().map(|e| &e.body).collect();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.post(&config.url).json(&bodies).send().await {
                Ok(resp) if resp.status().is_success() => break,
                Ok(resp) => {
                    warn!(status = %resp.status(), url = %config.url, attempt, "webhook_non_success_status");
                }
                Err(err) => {
                    warn!(error = %err, url = %config.url, attempt, "webhook_delivery_error");
                }
            }
            if attempt >= MAX_ATTEMPTS {
                error!(url = %config.url, attempts = attempt, "webhook_delivery_exhausted");
                break;
            }
            tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_url() {
        let errors = WebhookFactory.cast_and_validate_config(&Map::new()).unwrap_err();
        assert_eq!(errors[0].field, "url");
    }

    #[test]
    fn rejects_non_http_url() {
        let mut raw = Map::new();
        raw.insert("url".to_string(), Value::String("ftp://example.com".into()));
        let errors = WebhookFactory.cast_and_validate_config(&raw).unwrap_err();
        assert_eq!(errors[0].field, "url");
    }

    #[test]
    fn cast_config_stringifies_non_string_url_without_validating() {
        let mut raw = Map::new();
        raw.insert("url".to_string(), Value::Number(1.into()));
        let changeset = WebhookFactory.cast_config(&raw);
        assert_eq!(changeset.get("url"), Some(&Value::String("1".to_string())));
    }

    #[test]
    fn accepts_valid_https_url() {
        let mut raw = Map::new();
        raw.insert(
            "url".to_string(),
            Value::String("https://example.com/hook".into()),
        );
        let validated = WebhookFactory.cast_and_validate_config(&raw).unwrap();
        assert_eq!(
            validated.get("url"),
            Some(&Value::String("https://example.com/hook".into()))
        );
    }
}
