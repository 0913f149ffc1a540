//! Async job poller
//!
//! Submitted -> Polling -> Ready | Failed.
//!
//! A submission answers with a `results_uri` instead of data. We sleep a
//! fixed, generous interval before each check rather than hammering a
//! rate-limited API, and give up with `PollTimeout` after `max_polls`.

use crate::config::PollConfig;
use crate::error::BeancounterError;
use crate::models::AsyncJob;
use crate::transport::{HttpTransport, Reply};
use crate::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(String),
    NotReady,
}

/// Submission reply envelope.
#[derive(Debug, Deserialize)]
struct JobEnvelope {
    #[serde(default)]
    results_uri: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

pub(crate) fn parse_async_job(body: &str) -> Result<AsyncJob> {
    let envelope: JobEnvelope = serde_json::from_str(body).map_err(|e| {
        BeancounterError::MalformedReply(format!("unparsable job submission reply: {}", e))
    })?;

    if envelope.results_uri.trim().is_empty() {
        return Err(BeancounterError::MalformedReply(format!(
            "job submission reply has no results_uri (status: {})",
            envelope.status.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(AsyncJob {
        status_url: envelope.results_uri,
        task_id: envelope.task_id,
    })
}

pub struct JobPoller {
    transport: HttpTransport,
    config: PollConfig,
}

impl JobPoller {
    pub fn new(transport: HttpTransport, config: PollConfig) -> Self {
        Self { transport, config }
    }

    pub async fn submit(&self, endpoint: &str, bearer: &str) -> Result<AsyncJob> {
        match self.transport.get(endpoint, Some(bearer)).await? {
            Reply::Body(body) => {
                let job = parse_async_job(&body)?;
                debug!(endpoint, task_id = ?job.task_id, "Job submitted");
                Ok(job)
            }
            Reply::NotReady => Err(BeancounterError::MalformedReply(format!(
                "job submission to {} returned no content",
                endpoint
            ))),
        }
    }

    /// One wait-then-check cycle.
    pub async fn poll_once(&self, job: &AsyncJob, bearer: &str) -> Result<PollOutcome> {
        self.wait(self.config.interval, "giving the aggregator time to finish the job")
            .await;
        self.check(job, bearer).await
    }

    /// Poll until the job is ready, fails, or runs out of polls.
    pub async fn poll_until_ready(&self, job: &AsyncJob, bearer: &str) -> Result<String> {
        let max_polls = self.config.max_polls.max(1);

        for poll in 1..=max_polls {
            let outcome = if poll == 1 {
                self.poll_once(job, bearer).await?
            } else {
                self.wait(self.config.retry_interval, "aggregator returned no content")
                    .await;
                self.check(job, bearer).await?
            };

            match outcome {
                PollOutcome::Ready(body) => return Ok(body),
                PollOutcome::NotReady => {
                    debug!(location = %job.status_url, poll, max_polls, "Job not ready yet");
                }
            }
        }

        Err(BeancounterError::PollTimeout {
            attempts: max_polls,
            location: job.status_url.clone(),
        })
    }

    /// Submit then poll to completion.
    pub async fn run(&self, endpoint: &str, bearer: &str) -> Result<String> {
        let job = self.submit(endpoint, bearer).await?;
        self.poll_until_ready(&job, bearer).await
    }

    async fn check(&self, job: &AsyncJob, bearer: &str) -> Result<PollOutcome> {
        match self.transport.get(&job.status_url, Some(bearer)).await? {
            Reply::Body(body) => Ok(PollOutcome::Ready(body)),
            Reply::NotReady => Ok(PollOutcome::NotReady),
        }
    }

    async fn wait(&self, duration: Duration, reason: &str) {
        if duration.is_zero() {
            return;
        }
        info!(seconds = duration.as_secs(), reason, "Sleeping");
        tokio::time::sleep(duration).await;
    }
}
