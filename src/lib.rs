//! Beancounter
//!
//! Pulls transaction history out of a bank-data aggregator:
//! - Authorizes through a browser redirect carrying a sealed `state`
//! - Runs the aggregator's asynchronous jobs to completion
//! - Fetches every linked account concurrently, tolerating per-account failures
//! - Writes the result to a JSON file or an Elasticsearch index
//!
//! FLOW:
//! AUTHORIZE → EXCHANGE → LIST ACCOUNTS → FAN OUT → STORE

pub mod callback;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod oauth;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{BeancounterError, Result};

// Re-export common types
pub use models::*;
