//! Account fan-out / fan-in
//!
//! One task per account, optionally capped by a semaphore. Successes flow
//! into a single collector task, failures into a single failure sink, and
//! the batch is only assembled after every task has been joined.
//!
//! A failing account never cancels its siblings; it shows up in
//! `FetchReport::failures` instead.

use crate::config::FanOutConfig;
use crate::models::{Account, AccountFailure, FetchReport, Transaction};
use crate::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct AccountFanOut {
    config: FanOutConfig,
}

impl AccountFanOut {
    pub fn new(config: FanOutConfig) -> Self {
        Self { config }
    }

    /// Run `fetch` for every account and merge the results.
    ///
    /// Transaction order is preserved within an account; across accounts it
    /// follows completion order.
    pub async fn run<F, Fut>(&self, accounts: Vec<Account>, fetch: F) -> FetchReport
    where
        F: Fn(Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Transaction>>> + Send + 'static,
    {
        if accounts.is_empty() {
            return FetchReport::default();
        }

        let width = self
            .config
            .max_concurrency
            .unwrap_or(accounts.len())
            .max(1);
        debug!(accounts = accounts.len(), width, "Fanning out account fetches");

        let permits = Arc::new(Semaphore::new(width));
        let fetch = Arc::new(fetch);

        let (success_tx, mut success_rx) = mpsc::unbounded_channel::<(Account, Vec<Transaction>)>();
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel::<AccountFailure>();

        let collector = tokio::spawn(async move {
            let mut transactions = Vec::new();
            let mut finished = HashSet::new();
            while let Some((account, batch)) = success_rx.recv().await {
                info!(
                    account_id = %account.id,
                    bank = %account.provider_name,
                    count = batch.len(),
                    "Got transactions"
                );
                transactions.extend(batch);
                finished.insert(account.id);
            }
            (transactions, finished)
        });

        let failure_sink = tokio::spawn(async move {
            let mut failures = Vec::new();
            while let Some(failure) = failure_rx.recv().await {
                warn!(
                    account_id = %failure.account_id,
                    error = %failure.error,
                    "Error fetching transactions"
                );
                failures.push(failure);
            }
            failures
        });

        let mut tasks = JoinSet::new();
        for account in accounts.iter().cloned() {
            let permits = Arc::clone(&permits);
            let fetch = Arc::clone(&fetch);
            let success_tx = success_tx.clone();
            let failure_tx = failure_tx.clone();

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let _ = failure_tx.send(AccountFailure::new(&account, e));
                        return;
                    }
                };

                match fetch(account.clone()).await {
                    Ok(batch) => {
                        let _ = success_tx.send((account, batch));
                    }
                    Err(e) => {
                        let _ = failure_tx.send(AccountFailure::new(&account, e));
                    }
                }
            });
        }

        // Sinks finish once the last task drops its senders.
        drop(success_tx);
        drop(failure_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Account task did not finish");
            }
        }

        let (transactions, finished) = collector.await.unwrap_or_else(|e| {
            error!(error = %e, "Transaction collector failed");
            (Vec::new(), HashSet::new())
        });
        let mut failures = failure_sink.await.unwrap_or_else(|e| {
            error!(error = %e, "Failure sink failed");
            Vec::new()
        });

        // Tasks that panicked reported nothing to either sink.
        let reported: HashSet<&str> = failures.iter().map(|f| f.account_id.as_str()).collect();
        let silent: Vec<AccountFailure> = accounts
            .iter()
            .filter(|a| !finished.contains(&a.id) && !reported.contains(a.id.as_str()))
            .map(|a| AccountFailure::new(a, "task aborted before reporting a result"))
            .collect();
        failures.extend(silent);

        info!(
            transactions = transactions.len(),
            failed_accounts = failures.len(),
            "Fan-in complete"
        );

        FetchReport {
            transactions,
            failures,
        }
    }
}
