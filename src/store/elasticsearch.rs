//! Elasticsearch 8 sink
//!
//! Documents go through the `_bulk` API in fixed-size chunks, keyed by
//! transaction id so a re-run overwrites instead of duplicating.

use super::ResultSink;
use crate::error::BeancounterError;
use crate::models::Transaction;
use crate::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

pub const INDEX: &str = "beancounter";
pub const DEFAULT_BATCH_SIZE: usize = 500;
const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Node address from the service env vars, or the local default.
pub fn address_from_env() -> String {
    address_from_lookup(|key| std::env::var(key).ok())
}

fn address_from_lookup<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("ELASTICSEARCH_SERVICE_HOST").unwrap_or_else(|| "localhost".to_string());
    let port = lookup("ELASTICSEARCH_SERVICE_PORT").unwrap_or_else(|| "9200".to_string());
    format!("http://{}:{}", host, port)
}

#[derive(Debug, Deserialize)]
struct BulkReply {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl BulkReply {
    fn failed(&self) -> usize {
        if !self.errors {
            return 0;
        }
        self.items
            .iter()
            .filter_map(|item| item.as_object().and_then(|actions| actions.values().next()))
            .filter(|result| {
                result.get("error").is_some()
                    || result
                        .get("status")
                        .and_then(Value::as_u64)
                        .map_or(false, |status| status >= 300)
            })
            .count()
    }
}

pub struct ElasticsearchSink {
    client: Client,
    address: String,
    batch_size: usize,
    backoff: Duration,
}

impl ElasticsearchSink {
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            address: address.into().trim_end_matches('/').to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            backoff: INITIAL_BACKOFF,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Delay before the first retry of a chunk; doubles on each further retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Create the index. Failing here is only logged, the bulk call will
    /// create it on demand anyway.
    async fn ensure_index(&self) {
        let url = format!("{}/{}", self.address, INDEX);
        match self.client.put(&url).send().await {
            Ok(resp) if resp.status().is_success() => info!(index = INDEX, "Created index"),
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                if body.contains("resource_already_exists_exception") {
                    info!(index = INDEX, "Index already exists");
                } else {
                    warn!(index = INDEX, status = status.as_u16(), body = %body, "Could not create index");
                }
            }
            Err(e) => warn!(index = INDEX, error = %e, "Could not create index"),
        }
    }

    /// Send one chunk, returning how many of its documents were rejected.
    async fn send_chunk(&self, chunk: &[Transaction]) -> Result<usize> {
        let body = bulk_body(chunk)?;
        let url = format!("{}/_bulk", self.address);
        let mut delay = self.backoff;
        let mut last_failure = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let sent = self
                .client
                .post(&url)
                .header("Content-Type", "application/x-ndjson")
                .body(body.clone())
                .send()
                .await;

            match sent {
                Ok(resp) if resp.status().is_success() => {
                    let reply: BulkReply = resp.json().await?;
                    return Ok(reply.failed());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if !is_retryable(status) {
                        return Err(BeancounterError::Store(format!(
                            "bulk request rejected with status {}: {}",
                            status.as_u16(),
                            text
                        )));
                    }
                    last_failure = format!("status {}", status.as_u16());
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_failure = e.to_string();
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < MAX_ATTEMPTS {
                warn!(
                    attempt,
                    failure = %last_failure,
                    delay_ms = delay.as_millis() as u64,
                    "Bulk request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(BeancounterError::Store(format!(
            "bulk request still failing after {} attempts: {}",
            MAX_ATTEMPTS, last_failure
        )))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

fn bulk_body(chunk: &[Transaction]) -> Result<String> {
    let mut body = String::new();
    for txn in chunk {
        let action = json!({ "index": { "_index": INDEX, "_id": txn.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(txn)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait::async_trait]
impl ResultSink for ElasticsearchSink {
    async fn write(&self, batch: &[Transaction]) -> Result<()> {
        self.ensure_index().await;

        let mut failed = 0;
        for chunk in batch.chunks(self.batch_size) {
            failed += self.send_chunk(chunk).await?;
        }

        if failed > 0 {
            return Err(BeancounterError::Store(format!("failed indexing {} docs", failed)));
        }

        info!(
            address = %self.address,
            index = INDEX,
            count = batch.len(),
            "Indexed transactions"
        );
        Ok(())
    }
}
