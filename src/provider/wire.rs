//! Truelayer reply bodies. Only the fields we keep are parsed.

use crate::error::BeancounterError;
use crate::models::{Account, Transaction};
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
struct AccountsReply {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<TlAccount>,
}

#[derive(Debug, Deserialize)]
struct TlAccount {
    account_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    provider: TlProvider,
}

#[derive(Debug, Default, Deserialize)]
struct TlProvider {
    #[serde(default, deserialize_with = "null_as_default")]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsReply {
    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<TlTransaction>,
}

#[derive(Debug, Deserialize)]
struct TlTransaction {
    transaction_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    description: String,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    #[serde(default, deserialize_with = "null_as_default")]
    currency: String,
    #[serde(default, deserialize_with = "null_as_default")]
    transaction_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    transaction_category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    transaction_classification: Vec<String>,
    #[serde(default)]
    merchant_name: Option<String>,
}

/// A JSON `null` reads the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn parse_accounts(body: &str) -> Result<Vec<Account>> {
    let reply: AccountsReply = serde_json::from_str(body)
        .map_err(|e| BeancounterError::MalformedReply(format!("unparsable accounts reply: {}", e)))?;

    Ok(reply
        .results
        .into_iter()
        .map(|a| Account {
            id: a.account_id,
            display_name: a.display_name,
            provider_name: a.provider.display_name,
        })
        .collect())
}

/// Tag every transaction with the account it came from.
pub(crate) fn parse_transactions(account: &Account, body: &str) -> Result<Vec<Transaction>> {
    let reply: TransactionsReply = serde_json::from_str(body).map_err(|e| {
        BeancounterError::MalformedReply(format!(
            "unparsable transactions reply for account {}: {}",
            account.id, e
        ))
    })?;

    Ok(reply
        .results
        .into_iter()
        .map(|t| Transaction {
            id: t.transaction_id,
            bank_name: account.provider_name.clone(),
            account_name: account.display_name.clone(),
            currency: t.currency,
            timestamp: t.timestamp,
            description: t.description,
            amount: t.amount,
            transaction_type: t.transaction_type,
            category: t.transaction_category,
            merchant: t.merchant_name.unwrap_or_default(),
            tags: t.transaction_classification,
        })
        .collect())
}
