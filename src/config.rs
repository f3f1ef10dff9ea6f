//! Configuration module for the transfer tool
//!
//! This module handles configuration loading from TOML files and
//! environment variables, and converts it into runtime types.

use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::fee_estimator::PriorityLevel;
use crate::rpc_manager::ConfirmationLevel;
use crate::submit::{ConfirmationMode, SubmitPolicy};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node endpoints
    pub rpc: RpcConfig,

    /// Priority fee service
    #[serde(default)]
    pub fee: FeeConfig,

    /// Source wallet
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Broadcast and confirmation
    #[serde(default)]
    pub submission: SubmissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub url: String,

    /// Websocket endpoint, required for subscription confirmation
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// `getPriorityFeeEstimate` endpoint; defaults to the RPC url
    #[serde(default)]
    pub url: Option<String>,

    /// Preset level instead of the recommended estimate
    #[serde(default)]
    pub priority_level: Option<PriorityLevel>,

    #[serde(default = "default_fee_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file (JSON array or raw 64 bytes)
    #[serde(default)]
    pub keypair_path: Option<String>,
}

/// How confirmation is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationKind {
    Polling,
    Subscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default)]
    pub skip_preflight: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default)]
    pub commitment: ConfirmationLevel,

    /// Confirmation wait budget in seconds
    #[serde(default = "default_confirm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_confirmation")]
    pub confirmation: ConfirmationKind,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_rebroadcast_interval")]
    pub rebroadcast_interval_ms: u64,
}

// Default value functions
fn default_rpc_timeout() -> u64 { 30 }
fn default_fee_timeout() -> u64 { 10 }
fn default_max_retries() -> usize { 3 }
fn default_confirm_timeout() -> u64 { 60 }
fn default_confirmation() -> ConfirmationKind { ConfirmationKind::Polling }
fn default_poll_interval() -> u64 { 500 }
fn default_rebroadcast_interval() -> u64 { 2_000 }

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            url: None,
            priority_level: None,
            timeout_secs: default_fee_timeout(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            max_retries: default_max_retries(),
            commitment: ConfirmationLevel::Confirmed,
            timeout_secs: default_confirm_timeout(),
            confirmation: default_confirmation(),
            poll_interval_ms: default_poll_interval(),
            rebroadcast_interval_ms: default_rebroadcast_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                ws_url: None,
                timeout_secs: default_rpc_timeout(),
            },
            fee: FeeConfig::default(),
            wallet: WalletConfig::default(),
            submission: SubmissionConfig::default(),
        }
    }
}

/// Environment variables that override file values
pub const ENV_RPC_URL: &str = "TRANSFER_RPC_URL";
pub const ENV_WS_URL: &str = "TRANSFER_WS_URL";
pub const ENV_FEE_URL: &str = "TRANSFER_FEE_URL";
pub const ENV_KEYPAIR: &str = "TRANSFER_KEYPAIR";
/// Base-58 secret key; read by the binary, never stored in `Config`
pub const ENV_SECRET_KEY: &str = "TRANSFER_SECRET_KEY";

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config TOML")?;
        Ok(config)
    }

    /// Load configuration with `.env` support and environment overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc.url = url;
        }
        if let Some(ws_url) = lookup(ENV_WS_URL) {
            self.rpc.ws_url = Some(ws_url);
        }
        if let Some(fee_url) = lookup(ENV_FEE_URL) {
            self.fee.url = Some(fee_url);
        }
        if let Some(keypair) = lookup(ENV_KEYPAIR) {
            self.wallet.keypair_path = Some(keypair);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        check_url("rpc.url", &self.rpc.url, &["http://", "https://"])?;
        if let Some(ws_url) = &self.rpc.ws_url {
            check_url("rpc.ws_url", ws_url, &["ws://", "wss://"])?;
        }
        if let Some(fee_url) = &self.fee.url {
            check_url("fee.url", fee_url, &["http://", "https://"])?;
        }

        if self.rpc.timeout_secs == 0 {
            bail!("rpc.timeout_secs must be greater than zero");
        }
        if self.fee.timeout_secs == 0 {
            bail!("fee.timeout_secs must be greater than zero");
        }
        if self.submission.timeout_secs == 0 {
            bail!("submission.timeout_secs must be greater than zero");
        }
        if self.submission.poll_interval_ms == 0 {
            bail!("submission.poll_interval_ms must be greater than zero");
        }
        if self.submission.confirmation == ConfirmationKind::Subscription
            && self.rpc.ws_url.is_none()
        {
            bail!("submission.confirmation = \"subscription\" requires rpc.ws_url");
        }
        Ok(())
    }

    /// Fee service endpoint (falls back to the RPC url)
    pub fn fee_url(&self) -> &str {
        self.fee.url.as_deref().unwrap_or(&self.rpc.url)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn fee_timeout(&self) -> Duration {
        Duration::from_secs(self.fee.timeout_secs)
    }

    pub fn to_submit_policy(&self) -> SubmitPolicy {
        let submission = &self.submission;
        let confirmation = match submission.confirmation {
            ConfirmationKind::Polling => ConfirmationMode::Polling {
                interval: Duration::from_millis(submission.poll_interval_ms),
            },
            ConfirmationKind::Subscription => ConfirmationMode::Subscription,
        };

        SubmitPolicy {
            skip_preflight: submission.skip_preflight,
            max_retries: submission.max_retries,
            commitment: submission.commitment,
            timeout: Duration::from_secs(submission.timeout_secs),
            confirmation,
            rebroadcast_interval: Duration::from_millis(submission.rebroadcast_interval_ms),
            ..SubmitPolicy::default()
        }
    }
}

fn check_url(field: &str, url: &str, schemes: &[&str]) -> anyhow::Result<()> {
    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        bail!("{} must start with one of {:?}, got '{}'", field, schemes, url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [rpc]
            url = "https://api.devnet.solana.com"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.fee_url(), "https://api.devnet.solana.com");
        let policy = config.to_submit_policy();
        assert_eq!(policy.commitment, ConfirmationLevel::Confirmed);
        assert_eq!(policy.max_retries, 3);
        assert!(!policy.skip_preflight);
        assert_eq!(
            policy.confirmation,
            ConfirmationMode::Polling {
                interval: Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn test_full_submission_section() {
        let config = Config::from_toml_str(
            r#"
            [rpc]
            url = "https://rpc.example.com/?api-key=k"
            ws_url = "wss://rpc.example.com/?api-key=k"

            [fee]
            priority_level = "High"

            [submission]
            skip_preflight = true
            max_retries = 0
            commitment = "finalized"
            timeout_secs = 90
            confirmation = "subscription"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.fee.priority_level, Some(PriorityLevel::High));
        let policy = config.to_submit_policy();
        assert!(policy.skip_preflight);
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.commitment, ConfirmationLevel::Finalized);
        assert_eq!(policy.timeout, Duration::from_secs(90));
        assert_eq!(policy.confirmation, ConfirmationMode::Subscription);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.rpc.url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.submission.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.submission.confirmation = ConfirmationKind::Subscription;
        assert!(config.validate().is_err());
        config.rpc.ws_url = Some("wss://example.com".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            ENV_RPC_URL => Some("https://override.example.com".to_string()),
            ENV_KEYPAIR => Some("/tmp/id.json".to_string()),
            _ => None,
        });

        assert_eq!(config.rpc.url, "https://override.example.com");
        assert_eq!(config.wallet.keypair_path.as_deref(), Some("/tmp/id.json"));
        assert!(config.rpc.ws_url.is_none());
    }
}
