//! Core data models for beancounter

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Token =================
//

/// OAuth access token plus the refresh value handed out alongside it.
///
/// Replaced wholesale after each exchange; nothing refreshes it in place.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    #[serde(rename = "refresh")]
    pub refresh_value: String,
    /// Expiry as unix seconds.
    #[serde(rename = "expires")]
    pub expires_at: i64,
}

impl Token {
    /// Build a token whose expiry is `ttl_secs` from now.
    pub fn new(value: String, refresh_value: String, ttl_secs: i64) -> Self {
        Self {
            value,
            refresh_value,
            expires_at: Utc::now().timestamp().saturating_add(ttl_secs),
        }
    }

    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Utc::now())
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("refresh_value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

//
// ================= Accounts & Jobs =================
//

/// A linked bank account, discovered per token and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub provider_name: String,
}

/// Poll location handed back by an asynchronous submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncJob {
    pub status_url: String,
    pub task_id: Option<String>,
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Upsert key for downstream stores; unique within a bank + account.
    pub id: String,
    #[serde(rename = "bank")]
    pub bank_name: String,
    #[serde(rename = "account")]
    pub account_name: String,
    pub currency: String,
    pub timestamp: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub category: String,
    pub merchant: String,
    pub tags: Vec<String>,
}

pub type TransactionBatch = Vec<Transaction>;

//
// ================= Fetch Result =================
//

/// One account whose task did not make it into the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountFailure {
    pub account_id: String,
    pub account_name: String,
    pub error: String,
}

impl AccountFailure {
    pub fn new(account: &Account, error: impl fmt::Display) -> Self {
        Self {
            account_id: account.id.clone(),
            account_name: account.display_name.clone(),
            error: error.to_string(),
        }
    }
}

/// Aggregated outcome of a fan-out fetch.
///
/// `failures` lists every account that contributed nothing, so callers that
/// need completeness can check it instead of trusting a bare `Ok`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchReport {
    pub transactions: TransactionBatch,
    pub failures: Vec<AccountFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
