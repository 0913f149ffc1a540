//! Transaction fetch facade
//!
//! The single entry point the CLI uses: refuse expired tokens up front,
//! then hand the range to whichever provider was configured.

use crate::error::BeancounterError;
use crate::models::{FetchReport, Token};
use crate::provider::BankDataProvider;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;

pub struct TransactionFetcher {
    provider: Arc<dyn BankDataProvider>,
}

impl TransactionFetcher {
    pub fn new(provider: Arc<dyn BankDataProvider>) -> Self {
        Self { provider }
    }

    pub async fn transactions(
        &self,
        token: &Token,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<FetchReport> {
        if token.has_expired() {
            return Err(BeancounterError::TokenExpired {
                expired_at: token.expires_at,
            });
        }
        if from > to {
            return Err(BeancounterError::Config(format!(
                "date range starts after it ends ({} > {})",
                from, to
            )));
        }

        info!(
            provider = self.provider.name(),
            from = %from.date_naive(),
            to = %to.date_naive(),
            "Fetching transactions"
        );

        self.provider.transactions(token, from, to).await
    }

    /// Everything from `days` ago until now.
    pub async fn lookback(&self, token: &Token, days: i64) -> Result<FetchReport> {
        let to = Utc::now();
        let from = Duration::try_days(days.max(0))
            .and_then(|window| to.checked_sub_signed(window))
            .ok_or_else(|| {
                BeancounterError::Config(format!("lookback of {} days is out of range", days))
            })?;
        self.transactions(token, from, to).await
    }
}
