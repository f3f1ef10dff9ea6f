//! Error types for the transfer pipeline
//!
//! These are the fail-fast errors: anything raised here aborts the pipeline
//! before a single byte is broadcast. Submission results (rejections,
//! timeouts, transport failures) are not errors of the pipeline and live in
//! [`crate::submit::SubmissionOutcome`].

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::rpc_manager::RpcManagerError;

/// Error type for all pre-submission pipeline stages
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    /// Could not fetch a recent blockhash from the node
    #[error("Anchor fetch failed: {source}")]
    AnchorFetchFailed {
        #[source]
        source: RpcManagerError,
    },

    /// The priority-fee service was unreachable or answered without an estimate
    ///
    /// Never downgraded to a zero fee.
    #[error("Fee estimation failed: {reason}")]
    FeeEstimationFailed { reason: String },

    /// Simulating the draft failed or did not report consumed units
    #[error("Simulation failed: {reason}")]
    SimulationFailed {
        reason: String,
        /// Program logs returned by the node, if any
        logs: Vec<String>,
    },

    /// A required signer has no key material in the provided signer set
    #[error("Missing signer key for {pubkey}")]
    MissingSignerKey { pubkey: Pubkey },

    /// The message could not be assembled or compiled
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Budget instructions are missing, duplicated, or after a primary instruction
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    /// The signer itself failed (remote signer, hardware wallet, ...)
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransferError {
    /// Whether a *fresh* pipeline run (new anchors, new estimates) might succeed
    ///
    /// The pipeline itself never restarts; this is advice for the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AnchorFetchFailed { source } => source.is_retryable(),
            Self::FeeEstimationFailed { .. } => true,

            Self::SimulationFailed { .. } => false,
            Self::MissingSignerKey { .. } => false,
            Self::InvalidMessage(_) => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::Signing(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::AnchorFetchFailed { .. } => "anchor",
            Self::FeeEstimationFailed { .. } => "fee_estimation",
            Self::SimulationFailed { .. } => "simulation",
            Self::MissingSignerKey { .. } => "signer_key",
            Self::InvalidMessage(_) => "message",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Signing(_) => "signing",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransferError {
    pub fn fee_estimation(reason: impl Into<String>) -> Self {
        Self::FeeEstimationFailed {
            reason: reason.into(),
        }
    }

    pub fn simulation(reason: impl Into<String>, logs: Vec<String>) -> Self {
        Self::SimulationFailed {
            reason: reason.into(),
            logs,
        }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage(reason.into())
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransferError::fee_estimation("missing priorityFeeEstimate");
        assert_eq!(
            err.to_string(),
            "Fee estimation failed: missing priorityFeeEstimate"
        );

        let pubkey = Pubkey::new_unique();
        let err = TransferError::MissingSignerKey { pubkey };
        assert_eq!(err.to_string(), format!("Missing signer key for {}", pubkey));
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransferError::fee_estimation("unreachable").is_retryable());
        assert!(TransferError::AnchorFetchFailed {
            source: RpcManagerError::Timeout {
                endpoint: "test".to_string(),
                timeout_ms: 100,
            },
        }
        .is_retryable());

        assert!(!TransferError::simulation("insufficient lamports", vec![]).is_retryable());
        assert!(!TransferError::MissingSignerKey {
            pubkey: Pubkey::new_unique()
        }
        .is_retryable());
        assert!(!TransferError::AnchorFetchFailed {
            source: RpcManagerError::Configuration("bad url".to_string()),
        }
        .is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransferError::fee_estimation("x").category(), "fee_estimation");
        assert_eq!(TransferError::simulation("x", vec![]).category(), "simulation");
        assert_eq!(TransferError::invalid_order("x").category(), "validation");
    }
}
