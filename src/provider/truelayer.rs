//! Truelayer data API client
//!
//! https://docs.truelayer.com/
//!
//! Every data call is asynchronous: the accounts list is one job, and each
//! account's transactions for the date range is another, run concurrently.

use super::{wire, BankDataProvider};
use crate::config::{Config, Endpoints};
use crate::error::BeancounterError;
use crate::models::{FetchReport, Token};
use crate::oauth::{self, Credentials};
use crate::orchestrator::AccountFanOut;
use crate::poller::JobPoller;
use crate::transport::HttpTransport;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::sync::Arc;
use tracing::info;

pub struct Truelayer {
    credentials: Credentials,
    endpoints: Endpoints,
    transport: HttpTransport,
    poller: Arc<JobPoller>,
    fan_out: AccountFanOut,
}

impl Truelayer {
    pub fn new(credentials: Credentials, config: Config) -> Result<Self> {
        let transport = HttpTransport::new(config.transport)?;
        let poller = Arc::new(JobPoller::new(transport.clone(), config.poll));

        Ok(Self {
            credentials,
            endpoints: config.endpoints,
            transport,
            poller,
            fan_out: AccountFanOut::new(config.fan_out),
        })
    }

    /// URL the user visits to grant access. `redirect` is reduced to its origin.
    pub fn authorization_url(&self, redirect: &str, sealed_state: &str) -> Result<String> {
        oauth::build_authorization_url(
            &self.endpoints.auth_base,
            &self.credentials.client_id,
            redirect,
            sealed_state,
        )
    }

    pub async fn exchange_code(&self, redirect: &str, code: &str) -> Result<Token> {
        oauth::exchange_code_for_token(
            &self.transport,
            &self.endpoints.auth_base,
            &self.credentials,
            redirect,
            code,
        )
        .await
    }
}

#[async_trait]
impl BankDataProvider for Truelayer {
    fn name(&self) -> &'static str {
        "truelayer"
    }

    async fn transactions(
        &self,
        token: &Token,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchReport> {
        let accounts_url = data_url(
            &self.endpoints.api_base,
            &["data", "v1", "accounts"],
            &[("async", "true".to_string())],
        )?;

        let raw = self.poller.run(&accounts_url, &token.value).await?;
        let accounts = wire::parse_accounts(&raw)?;
        info!(count = accounts.len(), "Discovered accounts");

        let poller = Arc::clone(&self.poller);
        let bearer = token.value.clone();
        let api_base = self.endpoints.api_base.clone();
        let (from, to) = (date(from), date(to));

        let report = self
            .fan_out
            .run(accounts, move |account| {
                let poller = Arc::clone(&poller);
                let bearer = bearer.clone();
                let url = transactions_url(&api_base, &account.id, &from, &to);
                async move {
                    let raw = poller.run(&url?, &bearer).await?;
                    wire::parse_transactions(&account, &raw)
                }
            })
            .await;

        Ok(report)
    }
}

/// Calendar date only; the time of day is dropped.
pub(crate) fn date(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

fn transactions_url(api_base: &str, account_id: &str, from: &str, to: &str) -> Result<String> {
    data_url(
        api_base,
        &["data", "v1", "accounts", account_id, "transactions"],
        &[
            ("async", "true".to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ],
    )
}

fn data_url(api_base: &str, segments: &[&str], query: &[(&str, String)]) -> Result<String> {
    let mut url = Url::parse(api_base)
        .map_err(|e| BeancounterError::Config(format!("invalid api base url: {}", e)))?;

    url.path_segments_mut()
        .map_err(|_| BeancounterError::Config(format!("api base {} cannot take a path", api_base)))?
        .pop_if_empty()
        .extend(segments);

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.into())
}
