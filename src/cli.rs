//! Command-line interface
//!
//! `beancounter link <provider>` walks the user through authorization, pulls
//! the transaction history and writes it to the chosen output.

use crate::callback::RedirectListener;
use crate::config::Config;
use crate::crypto::OAuthState;
use crate::fetcher::TransactionFetcher;
use crate::oauth::Credentials;
use crate::provider::{ProviderKind, Truelayer};
use crate::store::SinkKind;
use crate::Result;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pull bank transactions from an aggregator into a local store.
#[derive(Parser, Debug)]
#[command(name = "beancounter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Link bank accounts through a provider and download their transactions.
    Link {
        #[command(subcommand)]
        provider: LinkProvider,
    },
}

#[derive(Subcommand, Debug)]
pub enum LinkProvider {
    /// Link through Truelayer.
    Truelayer(TruelayerArgs),
}

impl LinkProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            LinkProvider::Truelayer(_) => ProviderKind::Truelayer,
        }
    }
}

#[derive(Args, Debug)]
pub struct TruelayerArgs {
    /// Redirect URL registered with the provider (e.g. "http://localhost:8500").
    #[arg(long, env = "BEANCOUNTER_REDIRECT")]
    pub redirect: String,

    #[arg(long, env = "TRUELAYER_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "TRUELAYER_CLIENT_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Local port the redirect listener binds.
    #[arg(long, default_value = "8500")]
    pub port: u16,

    /// How many days of history to fetch.
    #[arg(long, default_value = "1095")]
    pub days: i64,

    /// Output as <kind>:<target>, either jsonfile:<path> or es8:<url>.
    #[arg(long, default_value = "jsonfile:out.json")]
    pub out: String,

    /// Give up waiting for the browser redirect after this many seconds.
    #[arg(long, default_value = "600")]
    pub callback_timeout_secs: u64,
}

pub async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Link { provider } => {
            info!(provider = provider.kind().as_str(), "Linking accounts");
            match provider {
                LinkProvider::Truelayer(args) => link_truelayer(args).await,
            }
        }
    }
}

async fn link_truelayer(args: TruelayerArgs) -> Result<()> {
    // Fail on a bad output before the user goes through the browser flow.
    let sink = SinkKind::parse(&args.out)?.into_sink()?;
    let config = Config::from_env()?;

    let truelayer = Arc::new(Truelayer::new(
        Credentials::new(args.client_id, args.secret),
        config,
    )?);

    let state = OAuthState::new()?;
    let auth_url = truelayer.authorization_url(&args.redirect, &state.seal()?)?;

    let listener = RedirectListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port)), state).await?;
    println!("Go to: {}", auth_url);

    let code = listener
        .wait_for_code(Duration::from_secs(args.callback_timeout_secs))
        .await?;
    let token = truelayer.exchange_code(&args.redirect, &code).await?;

    let fetcher = TransactionFetcher::new(truelayer);
    let report = fetcher.lookback(&token, args.days).await?;

    for failure in &report.failures {
        warn!(
            account_id = %failure.account_id,
            account = %failure.account_name,
            error = %failure.error,
            "Skipped account"
        );
    }

    sink.write(&report.transactions).await?;

    info!(
        transactions = report.transactions.len(),
        failed_accounts = report.failures.len(),
        "Done"
    );
    Ok(())
}
