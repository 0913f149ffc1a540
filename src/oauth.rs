//! OAuth exchange
//!
//! Builds the authorize URL the user visits, and trades the code that comes
//! back on the redirect for a token.

use crate::error::BeancounterError;
use crate::models::Token;
use crate::transport::{HttpTransport, Reply};
use crate::Result;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt;
use tracing::info;

/// Ask for accounts, transactions and balances.
pub const SCOPES: &str = "balance transactions accounts";
/// Every institution type the aggregator supports.
pub const PROVIDERS: &str = "uk-oauth-all uk-ob-all";

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Only scheme, host and port of a redirect mean anything to the remote party.
pub fn redirect_origin(redirect: &str) -> Result<String> {
    let url = Url::parse(redirect)
        .map_err(|e| BeancounterError::Config(format!("invalid redirect url {:?}: {}", redirect, e)))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(BeancounterError::Config(format!(
            "redirect url {:?} has no host",
            redirect
        )));
    }
    Ok(origin.ascii_serialization())
}

pub fn build_authorization_url(
    auth_base: &str,
    client_id: &str,
    redirect_base: &str,
    sealed_state: &str,
) -> Result<String> {
    let mut url = Url::parse(auth_base)
        .map_err(|e| BeancounterError::Config(format!("invalid auth base url: {}", e)))?;
    url.set_path("/");

    let redirect = redirect_origin(redirect_base)?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &redirect)
        .append_pair("state", sealed_state)
        .append_pair("providers", PROVIDERS)
        .append_pair("scope", SCOPES);

    Ok(url.into())
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
    #[serde(deserialize_with = "seconds_from_number_or_string")]
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: String,
}

/// `expires_in` has been seen both as a number and as a numeric string.
fn seconds_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expires_in out of range: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| D::Error::custom(format!("expires_in {:?}: {}", s, e))),
        other => Err(D::Error::custom(format!("unexpected expires_in: {}", other))),
    }
}

pub fn parse_token(body: &str) -> Result<Token> {
    let reply: TokenReply = serde_json::from_str(body)
        .map_err(|e| BeancounterError::MalformedReply(format!("unparsable token reply: {}", e)))?;

    if reply.access_token.is_empty() {
        return Err(BeancounterError::MalformedReply(
            "token reply has an empty access_token".to_string(),
        ));
    }
    if let Some(kind) = reply.token_type.as_deref() {
        if !kind.eq_ignore_ascii_case("bearer") {
            info!(token_type = kind, "Unexpected token type, using it as bearer anyway");
        }
    }

    Ok(Token::new(reply.access_token, reply.refresh_token, reply.expires_in))
}

/// POST the authorization-code grant and parse the reply.
pub async fn exchange_code_for_token(
    transport: &HttpTransport,
    auth_base: &str,
    credentials: &Credentials,
    redirect: &str,
    code: &str,
) -> Result<Token> {
    let mut url = Url::parse(auth_base)
        .map_err(|e| BeancounterError::Config(format!("invalid auth base url: {}", e)))?;
    url.set_path("/connect/token");

    let body = json!({
        "grant_type": "authorization_code",
        "client_id": credentials.client_id,
        "client_secret": credentials.client_secret,
        "redirect_uri": redirect,
        "code": code,
    });

    info!("Exchanging authorization code for token");

    match transport
        .post(url.as_str(), None, serde_json::to_vec(&body)?)
        .await?
    {
        Reply::Body(reply) => parse_token(&reply),
        Reply::NotReady => Err(BeancounterError::MalformedReply(
            "token endpoint returned no content".to_string(),
        )),
    }
}
