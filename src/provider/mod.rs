//! Bank data providers
//!
//! A provider turns a token and a date range into a `FetchReport`.
//! Which one runs is picked explicitly by the CLI, never inferred.

use crate::models::{FetchReport, Token};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod truelayer;
mod wire;

pub use truelayer::Truelayer;

#[async_trait]
pub trait BankDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transactions across every linked account between `from` and `to`.
    async fn transactions(
        &self,
        token: &Token,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Truelayer,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Truelayer => "truelayer",
        }
    }
}
