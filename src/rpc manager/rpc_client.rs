//! `solana-client` backed implementation of [`NodeClient`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use solana_transaction_status::{TransactionConfirmationStatus, UiTransactionEncoding};
use tracing::debug;

use super::{
    BroadcastConfig, ConfirmationLevel, LatestBlockhash, NodeClient, NodeTransactionError,
    RpcManagerError, SignatureStatus, SimulationReport,
};

/// Node client over the nonblocking JSON-RPC client
///
/// Cloning is cheap; the underlying HTTP connection pool is shared.
#[derive(Clone)]
pub struct SolanaNodeClient {
    rpc: Arc<RpcClient>,
    endpoint: String,
}

impl std::fmt::Debug for SolanaNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaNodeClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl SolanaNodeClient {
    /// Create a client for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        let url = url.into();
        Self {
            rpc: Arc::new(RpcClient::new_with_timeout(url.clone(), request_timeout)),
            endpoint: redact_endpoint(&url),
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(&err, &self.endpoint)
    }
}

/// Strip query strings so API keys never reach logs or error messages
pub(crate) fn redact_endpoint(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?<redacted>", base),
        None => url.to_string(),
    }
}

fn level_from_status(status: TransactionConfirmationStatus) -> ConfirmationLevel {
    match status {
        TransactionConfirmationStatus::Processed => ConfirmationLevel::Processed,
        TransactionConfirmationStatus::Confirmed => ConfirmationLevel::Confirmed,
        TransactionConfirmationStatus::Finalized => ConfirmationLevel::Finalized,
    }
}

#[async_trait]
impl NodeClient for SolanaNodeClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn latest_blockhash(
        &self,
        level: ConfirmationLevel,
    ) -> Result<LatestBlockhash, RpcManagerError> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(level.commitment_config())
            .await
            .map_err(|e| self.map_err(e))?;

        debug!(
            endpoint = %self.endpoint,
            blockhash = %blockhash,
            last_valid_block_height,
            "Fetched latest blockhash"
        );

        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn simulate(
        &self,
        tx: &VersionedTransaction,
        level: ConfirmationLevel,
    ) -> Result<SimulationReport, RpcManagerError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(level.commitment_config()),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };

        let response = self
            .rpc
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))?;

        let result = response.value;
        Ok(SimulationReport {
            err: result.err.as_ref().map(NodeTransactionError::decode),
            units_consumed: result.units_consumed,
            logs: result.logs.unwrap_or_default(),
        })
    }

    async fn broadcast(
        &self,
        tx: &VersionedTransaction,
        config: &BroadcastConfig,
    ) -> Result<Signature, RpcManagerError> {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: config.skip_preflight,
            preflight_commitment: Some(config.preflight_commitment.commitment_level()),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: config.max_retries,
            ..RpcSendTransactionConfig::default()
        };

        self.rpc
            .send_transaction_with_config(tx, send_config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;

        let entry = response.value.into_iter().next().ok_or_else(|| {
            RpcManagerError::MalformedResponse(format!(
                "getSignatureStatuses returned no entry for {}",
                signature
            ))
        })?;
        let status = match entry {
            Some(status) => status,
            None => return Ok(None),
        };

        Ok(Some(SignatureStatus {
            slot: status.slot,
            level: level_from_status(status.confirmation_status()),
            err: status.err.as_ref().map(NodeTransactionError::decode),
        }))
    }

    async fn block_height(&self, level: ConfirmationLevel) -> Result<u64, RpcManagerError> {
        self.rpc
            .get_block_height_with_commitment(level.commitment_config())
            .await
            .map_err(|e| self.map_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_endpoint_hides_api_key() {
        assert_eq!(
            redact_endpoint("https://mainnet.example-rpc.com/?api-key=secret"),
            "https://mainnet.example-rpc.com/?<redacted>"
        );
        assert_eq!(
            redact_endpoint("https://api.devnet.solana.com"),
            "https://api.devnet.solana.com"
        );
    }

    #[test]
    fn test_level_from_status() {
        assert_eq!(
            level_from_status(TransactionConfirmationStatus::Finalized),
            ConfirmationLevel::Finalized
        );
        assert_eq!(
            level_from_status(TransactionConfirmationStatus::Processed),
            ConfirmationLevel::Processed
        );
    }

    #[test]
    fn test_client_debug_omits_url_secrets() {
        let client = SolanaNodeClient::new(
            "https://rpc.example.com/?api-key=abc",
            Duration::from_secs(5),
        );
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("abc"));
        assert_eq!(client.endpoint(), "https://rpc.example.com/?<redacted>");
    }
}
