//! RPC Manager Module
//!
//! The node query surface consumed by the transfer pipeline: recent blockhash,
//! simulation, broadcast and signature status lookups. Everything above this
//! module talks to the node through [`NodeClient`] so tests can script the node.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};

// Submodules
pub mod rpc_client;
pub mod rpc_errors;

// Re-exports for convenience
pub use rpc_client::SolanaNodeClient;
pub use rpc_errors::{RetryPolicy, RpcManagerError};

/// How final a piece of ledger state must be before it is trusted.
///
/// Ordered: `Processed < Confirmed < Finalized`, so "reached at least the
/// requested level" is a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationLevel {
    Processed,
    Confirmed,
    Finalized,
}

impl ConfirmationLevel {
    pub fn commitment_config(self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.commitment_level(),
        }
    }

    pub fn commitment_level(self) -> CommitmentLevel {
        match self {
            Self::Processed => CommitmentLevel::Processed,
            Self::Confirmed => CommitmentLevel::Confirmed,
            Self::Finalized => CommitmentLevel::Finalized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl Default for ConfirmationLevel {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl std::fmt::Display for ConfirmationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfirmationLevel {
    type Err = RpcManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(RpcManagerError::Configuration(format!(
                "unknown commitment level '{}'",
                other
            ))),
        }
    }
}

/// Blockhash plus the last block height at which it is still accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// A transaction error as reported by the node
///
/// `decoded` is populated when the node payload maps onto the SDK's
/// [`TransactionError`]; `message` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTransactionError {
    pub message: String,
    pub decoded: Option<TransactionError>,
}

impl NodeTransactionError {
    pub fn from_transaction_error(err: TransactionError) -> Self {
        Self {
            message: err.to_string(),
            decoded: Some(err),
        }
    }

    /// Decode any serializable node error representation.
    ///
    /// RPC response types have changed their error wrapper between releases;
    /// both shapes serialize to the same JSON as `TransactionError`.
    pub fn decode<E>(err: &E) -> Self
    where
        E: Serialize + std::fmt::Debug,
    {
        let decoded = serde_json::to_value(err)
            .ok()
            .and_then(|value| serde_json::from_value::<TransactionError>(value).ok());
        let message = decoded
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("{:?}", err));
        Self { message, decoded }
    }
}

impl std::fmt::Display for NodeTransactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of simulating a transaction on the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub err: Option<NodeTransactionError>,
    pub units_consumed: Option<u64>,
    pub logs: Vec<String>,
}

/// Broadcast options forwarded to `sendTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Skip the node-side dry run when true
    pub skip_preflight: bool,
    /// Commitment the preflight simulation runs against
    pub preflight_commitment: ConfirmationLevel,
    /// Node-side rebroadcast budget for the identical signed bytes
    pub max_retries: Option<usize>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: ConfirmationLevel::Confirmed,
            max_retries: None,
        }
    }
}

/// Status of a signature as seen by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub level: ConfirmationLevel,
    pub err: Option<NodeTransactionError>,
}

/// Node query surface used by the pipeline
///
/// Implementations must be safe to share between concurrent pipelines.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> &str;

    /// Fetch the most recent blockhash at the given commitment
    async fn latest_blockhash(
        &self,
        level: ConfirmationLevel,
    ) -> Result<LatestBlockhash, RpcManagerError>;

    /// Simulate an (unsigned) transaction and report consumption
    async fn simulate(
        &self,
        tx: &VersionedTransaction,
        level: ConfirmationLevel,
    ) -> Result<SimulationReport, RpcManagerError>;

    /// Broadcast signed bytes, returning the node-reported signature
    async fn broadcast(
        &self,
        tx: &VersionedTransaction,
        config: &BroadcastConfig,
    ) -> Result<Signature, RpcManagerError>;

    /// Look up a signature; `None` when the node has not seen it
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError>;

    /// Current block height at the given commitment
    async fn block_height(&self, level: ConfirmationLevel) -> Result<u64, RpcManagerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::InstructionError;

    #[test]
    fn test_confirmation_level_ordering() {
        assert!(ConfirmationLevel::Processed < ConfirmationLevel::Confirmed);
        assert!(ConfirmationLevel::Confirmed < ConfirmationLevel::Finalized);
        assert_eq!(ConfirmationLevel::default(), ConfirmationLevel::Confirmed);
    }

    #[test]
    fn test_confirmation_level_parse() {
        assert_eq!(
            "Finalized".parse::<ConfirmationLevel>().unwrap(),
            ConfirmationLevel::Finalized
        );
        assert!("max".parse::<ConfirmationLevel>().is_err());
        assert_eq!(
            ConfirmationLevel::Processed.commitment_config(),
            CommitmentConfig::processed()
        );
    }

    #[test]
    fn test_node_error_decode_roundtrips_sdk_error() {
        let err = TransactionError::InstructionError(0, InstructionError::Custom(1));
        let node_err = NodeTransactionError::decode(&err);
        assert_eq!(node_err.decoded, Some(err));
    }
}
