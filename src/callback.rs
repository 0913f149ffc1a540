//! Redirect listener
//!
//! A short-lived local HTTP server that catches the browser redirect at the
//! end of the authorization flow. It settles exactly once: with the code,
//! with the reason the redirect was unusable, or with a timeout.

use crate::crypto::OAuthState;
use crate::error::BeancounterError;
use crate::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// =============================
/// Redirect Checks
/// =============================

/// Pull the code out of the redirect's query, after checking its `state`.
pub fn check_redirect(state: &OAuthState, params: &HashMap<String, String>) -> Result<String> {
    let sealed = params
        .get("state")
        .ok_or_else(|| BeancounterError::Callback("state not returned".to_string()))?;

    if !state.verify(sealed) {
        return Err(BeancounterError::StateVerification);
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| BeancounterError::Callback("code not returned".to_string()))
}

/// Whether a request is the authorization redirect rather than a stray
/// browser fetch such as `/robots.txt`.
fn is_redirect(params: &HashMap<String, String>) -> bool {
    ["state", "code", "error"]
        .iter()
        .any(|key| params.contains_key(*key))
}

/// =============================
/// Listener
/// =============================

#[derive(Clone)]
struct ListenerState {
    oauth: Arc<OAuthState>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

pub struct RedirectListener {
    addr: SocketAddr,
    outcome: oneshot::Receiver<Result<String>>,
    // Dropping this stops the server.
    _shutdown: oneshot::Sender<()>,
}

impl RedirectListener {
    pub async fn bind(addr: SocketAddr, oauth: OAuthState) -> Result<Self> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = ListenerState {
            oauth: Arc::new(oauth),
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        };

        let router = Router::new()
            .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
            .fallback(handle_redirect)
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "Waiting for authorization redirect");

        tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Redirect listener stopped with an error");
            }
        });

        Ok(Self {
            addr,
            outcome: outcome_rx,
            _shutdown: shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the first redirect. The server is stopped when this returns.
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, self.outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BeancounterError::Callback(
                "listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => Err(BeancounterError::CallbackTimeout),
        }
    }
}

async fn handle_redirect(
    State(state): State<ListenerState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    if !is_redirect(&params) {
        return (StatusCode::NOT_FOUND, "Not found.\n");
    }

    let sender = state.outcome.lock().ok().and_then(|mut slot| slot.take());
    let Some(sender) = sender else {
        return (StatusCode::GONE, "This authorization link has already been used.\n");
    };

    let outcome = check_redirect(&state.oauth, &params);
    let reply = match &outcome {
        Ok(_) => (StatusCode::OK, "Account linked. You can close this window.\n"),
        Err(e) => {
            warn!(error = %e, "Unusable authorization redirect");
            (StatusCode::BAD_REQUEST, "Linking failed. Check the terminal for details.\n")
        }
    };

    let _ = sender.send(outcome);
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn listener() -> (RedirectListener, String, String) {
        let state = OAuthState::new().unwrap();
        let sealed = state.seal().unwrap();
        let listener = RedirectListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)), state)
            .await
            .unwrap();
        let base = format!("http://{}", listener.local_addr());
        (listener, base, sealed)
    }

    fn redirect_url(base: &str, pairs: &[(&str, &str)]) -> String {
        let mut url = reqwest::Url::parse(base).unwrap();
        url.query_pairs_mut().extend_pairs(pairs);
        url.into()
    }

    #[tokio::test]
    async fn test_valid_redirect_yields_code() {
        let (listener, base, sealed) = listener().await;

        let favicon = reqwest::get(format!("{}/favicon.ico", base)).await.unwrap();
        assert_eq!(favicon.status(), reqwest::StatusCode::NO_CONTENT);

        let reply = reqwest::get(redirect_url(&base, &[("code", "abc123"), ("state", sealed.as_str())]))
            .await
            .unwrap();
        assert_eq!(reply.status(), reqwest::StatusCode::OK);

        let code = listener.wait_for_code(Duration::from_secs(5)).await.unwrap();
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn test_stray_requests_do_not_settle() {
        let (listener, base, sealed) = listener().await;

        for path in ["/robots.txt", "/apple-touch-icon.png", "/"] {
            let reply = reqwest::get(format!("{}{}", base, path)).await.unwrap();
            assert_eq!(reply.status(), reqwest::StatusCode::NOT_FOUND);
        }

        let reply = reqwest::get(redirect_url(&base, &[("code", "abc123"), ("state", sealed.as_str())]))
            .await
            .unwrap();
        assert_eq!(reply.status(), reqwest::StatusCode::OK);

        assert_eq!(listener.wait_for_code(Duration::from_secs(5)).await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_denied_consent_settles_without_state() {
        let (listener, base, _) = listener().await;

        let reply = reqwest::get(redirect_url(&base, &[("error", "access_denied")]))
            .await
            .unwrap();
        assert_eq!(reply.status(), reqwest::StatusCode::BAD_REQUEST);

        let err = listener.wait_for_code(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BeancounterError::Callback(msg) if msg == "state not returned"));
    }

    #[tokio::test]
    async fn test_second_redirect_is_gone() {
        let (listener, base, sealed) = listener().await;
        let url = redirect_url(&base, &[("code", "abc123"), ("state", sealed.as_str())]);

        reqwest::get(&url).await.unwrap();
        let again = reqwest::get(&url).await.unwrap();
        assert_eq!(again.status(), reqwest::StatusCode::GONE);

        assert_eq!(listener.wait_for_code(Duration::from_secs(5)).await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_forged_state_rejected() {
        let (listener, base, _) = listener().await;

        let reply = reqwest::get(redirect_url(&base, &[("code", "abc123"), ("state", "forged.state")]))
            .await
            .unwrap();
        assert_eq!(reply.status(), reqwest::StatusCode::BAD_REQUEST);

        let err = listener.wait_for_code(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BeancounterError::StateVerification));
    }

    #[tokio::test]
    async fn test_missing_state() {
        let (listener, base, _) = listener().await;

        reqwest::get(redirect_url(&base, &[("code", "abc123")])).await.unwrap();

        let err = listener.wait_for_code(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BeancounterError::Callback(msg) if msg == "state not returned"));
    }

    #[tokio::test]
    async fn test_missing_code() {
        let (listener, base, sealed) = listener().await;

        reqwest::get(redirect_url(&base, &[("state", sealed.as_str()), ("error", "access_denied")]))
            .await
            .unwrap();

        let err = listener.wait_for_code(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, BeancounterError::Callback(msg) if msg == "code not returned"));
    }

    #[tokio::test]
    async fn test_no_redirect_times_out() {
        let (listener, _, _) = listener().await;

        let err = listener.wait_for_code(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, BeancounterError::CallbackTimeout));
    }

    #[test]
    fn test_check_redirect_order() {
        let state = OAuthState::new().unwrap();
        let mut params = HashMap::new();
        params.insert("state".to_string(), "garbage".to_string());

        // Verification is checked before the code.
        assert!(matches!(
            check_redirect(&state, &params),
            Err(BeancounterError::StateVerification)
        ));

        params.insert("state".to_string(), state.seal().unwrap());
        params.insert("code".to_string(), "c".to_string());
        assert_eq!(check_redirect(&state, &params).unwrap(), "c");
    }
}
