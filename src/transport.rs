//! Resilient HTTP transport
//!
//! One long-lived reqwest::Client for connection pooling. Network failures
//! and 5xx are retried up to `max_attempts`; a 204 on a GET means the
//! aggregator is still working and is handed back as `Reply::NotReady`
//! without spending retries on it.

use crate::config::TransportConfig;
use crate::error::BeancounterError;
use crate::Result;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Body(String),
    /// 204 on a GET: the job behind this URL has not finished.
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Transient,
    Fatal,
}

pub(crate) fn classify(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=399 => StatusClass::Success,
        500..=599 => StatusClass::Transient,
        _ => StatusClass::Fatal,
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Reply> {
        self.request(Method::GET, url, bearer, None).await
    }

    pub async fn post(&self, url: &str, bearer: Option<&str>, body: Vec<u8>) -> Result<Reply> {
        self.request(Method::POST, url, bearer, Some(body)).await
    }

    /// Issue a request, retrying transient failures.
    ///
    /// Exhausting every attempt returns the last transient error seen.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<Reply> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay * (attempt - 1)).await;
            }

            debug!(%method, url, attempt, "Sending request");

            let mut request = self
                .client
                .request(method.clone(), url)
                .header(CONTENT_TYPE, "application/json");
            if let Some(token) = bearer {
                request = request.header(AUTHORIZATION, format!("bearer {}", token));
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%method, url, attempt, error = %e, "Request failed, retrying");
                    last_error = Some(BeancounterError::Transport {
                        status: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::NO_CONTENT && method == Method::GET {
                debug!(url, "Aggregator has no content yet");
                return Ok(Reply::NotReady);
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(%method, url, attempt, error = %e, "Failed reading body, retrying");
                    last_error = Some(BeancounterError::Transport {
                        status: Some(status.as_u16()),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            match classify(status) {
                StatusClass::Success => return Ok(Reply::Body(text)),
                StatusClass::Transient => {
                    warn!(%method, url, attempt, status = status.as_u16(), "Server error, retrying");
                    last_error = Some(BeancounterError::Transport {
                        status: Some(status.as_u16()),
                        message: format!("got status code: {} ({})", status.as_u16(), text),
                    });
                }
                StatusClass::Fatal => {
                    return Err(BeancounterError::FatalStatus {
                        status: status.as_u16(),
                        body: text,
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BeancounterError::Transport {
            status: None,
            message: format!("no attempt made for {}", url),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, MockServer};
    use rstest::rstest;
    use std::time::Duration;

    fn transport(max_attempts: u32) -> HttpTransport {
        HttpTransport::new(TransportConfig {
            max_attempts,
            retry_delay: Duration::ZERO,
            ..TransportConfig::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case::ok(200, StatusClass::Success)]
    #[case::created(201, StatusClass::Success)]
    #[case::redirect(302, StatusClass::Success)]
    #[case::bad_request(400, StatusClass::Fatal)]
    #[case::unauthorized(401, StatusClass::Fatal)]
    #[case::not_found(404, StatusClass::Fatal)]
    #[case::too_many(429, StatusClass::Fatal)]
    #[case::internal(500, StatusClass::Transient)]
    #[case::unavailable(503, StatusClass::Transient)]
    fn test_status_classification(#[case] code: u16, #[case] expected: StatusClass) {
        assert_eq!(classify(StatusCode::from_u16(code).unwrap()), expected);
    }

    #[tokio::test]
    async fn test_always_503_uses_every_attempt() {
        let server = MockServer::start().await;
        server.respond("/flaky", 503, "down for maintenance");

        let err = transport(5)
            .get(&server.url("/flaky"), None)
            .await
            .unwrap_err();

        assert_eq!(server.hits("/flaky"), 5);
        match err {
            BeancounterError::Transport { status, message } => {
                assert_eq!(status, Some(503));
                assert!(message.contains("down for maintenance"));
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_404_short_circuits() {
        let server = MockServer::start().await;
        server.respond("/missing", 404, "nope");

        let err = transport(5)
            .get(&server.url("/missing"), None)
            .await
            .unwrap_err();

        assert_eq!(server.hits("/missing"), 1);
        assert!(matches!(err, BeancounterError::FatalStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        server.respond("/eventually", 502, "bad gateway");
        server.respond("/eventually", 200, r#"{"ok":true}"#);

        let reply = transport(5)
            .get(&server.url("/eventually"), None)
            .await
            .unwrap();

        assert_eq!(reply, Reply::Body(r#"{"ok":true}"#.to_string()));
        assert_eq!(server.hits("/eventually"), 2);
    }

    #[tokio::test]
    async fn test_204_on_get_is_not_ready() {
        let server = MockServer::start().await;
        server.respond("/pending", 204, "");

        let reply = transport(5).get(&server.url("/pending"), None).await;

        tokio_test::assert_ok!(&reply);
        assert_eq!(reply.unwrap(), Reply::NotReady);
        assert_eq!(server.hits("/pending"), 1);
    }

    #[tokio::test]
    async fn test_204_on_post_is_success() {
        let server = MockServer::start().await;
        server.respond("/accept", 204, "");

        let reply = transport(5)
            .post(&server.url("/accept"), None, b"{}".to_vec())
            .await
            .unwrap();

        assert_eq!(reply, Reply::Body(String::new()));
    }

    #[tokio::test]
    async fn test_bearer_and_body_sent() {
        let server = MockServer::start().await;
        server.respond("/secure", 200, "{}");

        transport(1)
            .post(&server.url("/secure"), Some("tok-123"), br#"{"a":1}"#.to_vec())
            .await
            .unwrap();

        let recorded = server.requests_to("/secure");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, "POST");
        assert_eq!(recorded[0].authorization.as_deref(), Some("bearer tok-123"));
        assert_eq!(recorded[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(recorded[0].body, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient_after_retries() {
        let url = closed_port_url().await;

        let result = transport(3).get(&url, None).await;

        tokio_test::assert_err!(&result);
        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, BeancounterError::Transport { status: None, .. }));
    }
}
