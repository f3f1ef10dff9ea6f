//! Submission outcomes

use solana_sdk::signature::Signature;

use crate::classify::Diagnosis;
use crate::rpc_manager::ConfirmationLevel;

/// Terminal result of one submission
///
/// Only `Confirmed` means the transfer happened. `TimedOut` is not a
/// failure: the transaction may still land, and the caller should check the
/// signature before resubmitting. `Expired` is definite: the blockhash is
/// past its window and the signed bytes can never land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Reached the requested commitment without an execution error
    Confirmed {
        signature: Signature,
        slot: u64,
        level: ConfirmationLevel,
    },
    /// The node's dry run refused the transaction; nothing was forwarded
    PreflightRejected {
        signature: Signature,
        diagnosis: Diagnosis,
    },
    /// The time budget ran out before the requested commitment was seen
    TimedOut { signature: Signature },
    /// The node could not be reached or kept failing
    TransportFailed {
        signature: Signature,
        diagnosis: Diagnosis,
    },
    /// The block height passed the anchor's window before the signature landed
    Expired {
        signature: Signature,
        last_valid_block_height: u64,
        block_height: u64,
    },
    /// Landed at the requested commitment, but execution failed
    ExecutionFailed {
        signature: Signature,
        slot: u64,
        diagnosis: Diagnosis,
    },
}

impl SubmissionOutcome {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::Confirmed { signature, .. }
            | Self::PreflightRejected { signature, .. }
            | Self::TimedOut { signature }
            | Self::TransportFailed { signature, .. }
            | Self::Expired { signature, .. }
            | Self::ExecutionFailed { signature, .. } => signature,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Stable name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::PreflightRejected { .. } => "preflight_rejected",
            Self::TimedOut { .. } => "timed_out",
            Self::TransportFailed { .. } => "transport_failed",
            Self::Expired { .. } => "expired",
            Self::ExecutionFailed { .. } => "execution_failed",
        }
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match self {
            Self::PreflightRejected { diagnosis, .. }
            | Self::TransportFailed { diagnosis, .. }
            | Self::ExecutionFailed { diagnosis, .. } => Some(diagnosis),
            Self::Confirmed { .. } | Self::TimedOut { .. } | Self::Expired { .. } => None,
        }
    }
}

impl std::fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed {
                signature, level, ..
            } => write!(f, "{} confirmed at {}", signature, level),
            Self::TimedOut { signature } => {
                write!(f, "{} not confirmed before timeout", signature)
            }
            Self::Expired {
                signature,
                last_valid_block_height,
                block_height,
            } => write!(
                f,
                "{} expired: block height {} is past {}",
                signature, block_height, last_valid_block_height
            ),
            other => match other.diagnosis() {
                Some(diagnosis) => write!(f, "{} {}: {}", other.signature(), other.kind(), diagnosis),
                None => write!(f, "{} {}", other.signature(), other.kind()),
            },
        }
    }
}
