//! `transfer` - send SOL with a priced, budgeted and confirmed transaction
//!
//! Loads the node and fee-service endpoints from a TOML file (with `.env`
//! and environment overrides), then runs one transfer through
//! [`TransferPipeline`] and exits non-zero unless it is confirmed.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use priority_transfer::config::{Config, ENV_SECRET_KEY};
use priority_transfer::fee_estimator::JsonRpcFeeEstimator;
use priority_transfer::rpc_manager::SolanaNodeClient;
use priority_transfer::submit::{PubsubSignatureSubscriber, SubmissionEngine};
use priority_transfer::wallet::WalletManager;
use priority_transfer::{
    ConfirmationLevel, ConfirmationMode, Pubkey, SubmissionOutcome, TransferPipeline,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Destination address (base-58)
    #[arg(long)]
    to: String,

    /// Amount to send, in lamports
    #[arg(long)]
    lamports: u64,

    /// Skip node-side preflight simulation on broadcast
    #[arg(long)]
    skip_preflight: bool,

    /// Override the confirmation level (processed, confirmed, finalized)
    #[arg(long)]
    commitment: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    let wallet = load_wallet(&config)?;
    info!("Source wallet: {}", wallet.pubkey());

    let destination = Pubkey::from_str(&args.to)
        .with_context(|| format!("Invalid destination address: {}", args.to))?;

    let mut policy = config.to_submit_policy();
    if args.skip_preflight {
        policy.skip_preflight = true;
    }
    if let Some(level) = &args.commitment {
        policy.commitment = ConfirmationLevel::from_str(level)
            .map_err(|e| anyhow::anyhow!("Invalid --commitment '{}': {}", level, e))?;
    }

    let node = Arc::new(SolanaNodeClient::new(
        config.rpc.url.clone(),
        config.rpc_timeout(),
    ));
    let fees = JsonRpcFeeEstimator::new(config.fee_url(), config.fee_timeout())
        .context("Failed to create fee estimator")?
        .with_priority_level(config.fee.priority_level);

    let mut engine = SubmissionEngine::new(node.clone());
    if policy.confirmation == ConfirmationMode::Subscription {
        let ws_url = config
            .rpc
            .ws_url
            .as_deref()
            .context("Subscription confirmation requires rpc.ws_url")?;
        let subscriber = PubsubSignatureSubscriber::connect(ws_url)
            .await
            .context("Failed to connect signature subscriber")?;
        engine = engine.with_subscriber(Arc::new(subscriber));
    }

    let pipeline = TransferPipeline::new(node, Arc::new(fees)).with_engine(engine);

    info!(
        "Sending {} lamports to {} (commitment: {}, max_retries: {})",
        args.lamports, destination, policy.commitment, policy.max_retries
    );

    let report = pipeline
        .transfer(wallet.signer(), &destination, args.lamports, &policy)
        .await
        .context("Transfer aborted before submission")?;

    info!(
        "Compute budget: limit {} units, price {} micro-lamports ({} units simulated)",
        report.budget.unit_limit, report.budget.unit_price_micro_lamports, report.units_consumed
    );

    match &report.outcome {
        SubmissionOutcome::Confirmed { signature, slot, level } => {
            info!("✅ Confirmed {} at slot {} ({})", signature, slot, level);
            Ok(())
        }
        SubmissionOutcome::TimedOut { signature } => {
            warn!(
                "⏱ Timed out waiting for {}; it may still land, check before retrying",
                signature
            );
            bail!("transfer {} timed out", signature)
        }
        SubmissionOutcome::Expired { signature, .. } => {
            warn!(
                "⌛ Blockhash expired before {} landed; safe to rebuild and resend",
                signature
            );
            bail!("transfer {} expired", signature)
        }
        outcome => {
            error!("❌ {}", outcome);
            bail!("transfer failed: {}", outcome)
        }
    }
}

/// Initialize logging
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "priority_transfer=debug,transfer=debug,info"
    } else {
        "priority_transfer=info,transfer=info,warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        dotenvy::dotenv().ok();
        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }
}

/// Secret from the environment wins over the keypair file
fn load_wallet(config: &Config) -> Result<WalletManager> {
    if let Ok(secret) = std::env::var(ENV_SECRET_KEY) {
        let secret = zeroize::Zeroizing::new(secret);
        return WalletManager::from_base58_secret(&secret)
            .with_context(|| format!("Failed to load wallet from {}", ENV_SECRET_KEY));
    }

    let path = config.wallet.keypair_path.as_deref().with_context(|| {
        format!(
            "No wallet configured: set wallet.keypair_path or {}",
            ENV_SECRET_KEY
        )
    })?;
    info!("Loading wallet from: {}", path);
    WalletManager::from_file(path).context("Failed to load wallet")
}
