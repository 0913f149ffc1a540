//! Runtime tunables for the transport, poller and fan-out.
//!
//! Every struct has a `Default` matching the aggregator's expected latency.
//! `Config::from_env` layers `BEANCOUNTER_*` / `TRUELAYER_*` overrides on top.

use crate::error::BeancounterError;
use crate::Result;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_AUTH_BASE: &str = "https://auth.truelayer.com";
pub const DEFAULT_API_BASE: &str = "https://api.truelayer.com";

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total attempts per request, first try included.
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_delay * n`.
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(250),
            request_timeout: Duration::from_secs(60),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait before the first check of a freshly submitted job.
    pub interval: Duration,
    /// Wait before each re-check after a "not ready" reply.
    pub retry_interval: Duration,
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            retry_interval: Duration::from_secs(30),
            max_polls: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanOutConfig {
    /// `None` runs one task per account at once.
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_base: String,
    pub api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub transport: TransportConfig,
    pub poll: PollConfig,
    pub fan_out: FanOutConfig,
    pub endpoints: Endpoints,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = parse_var::<u32, _>(&lookup, "BEANCOUNTER_MAX_ATTEMPTS")? {
            config.transport.max_attempts = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BEANCOUNTER_RETRY_DELAY_MS")? {
            config.transport.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BEANCOUNTER_REQUEST_TIMEOUT_SECS")? {
            config.transport.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BEANCOUNTER_POLL_INTERVAL_SECS")? {
            config.poll.interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "BEANCOUNTER_POLL_RETRY_INTERVAL_SECS")? {
            config.poll.retry_interval = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "BEANCOUNTER_MAX_POLLS")? {
            config.poll.max_polls = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "BEANCOUNTER_MAX_CONCURRENCY")? {
            config.fan_out.max_concurrency = (v > 0).then_some(v);
        }
        if let Some(v) = lookup("TRUELAYER_AUTH_URL").filter(|v| !v.trim().is_empty()) {
            config.endpoints.auth_base = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("TRUELAYER_API_URL").filter(|v| !v.trim().is_empty()) {
            config.endpoints.api_base = v.trim().trim_end_matches('/').to_string();
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            BeancounterError::Config(format!("invalid {}={:?}: {}", key, raw, e))
        }),
    }
}
