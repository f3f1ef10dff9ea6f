//! Signed transaction output
//!
//! [`SignedTransaction`] is what the submission engine broadcasts. It is
//! immutable: every rebroadcast sends exactly these bytes, so the signature
//! (its identifier) never changes for the lifetime of a submission.

use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::tx_builder::budget::ComputeBudget;
use crate::tx_builder::context::RecencyAnchor;
use crate::tx_builder::errors::TransferError;

/// Final message compiled to v0 with one signature per required signer
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: VersionedTransaction,
    anchor: RecencyAnchor,
    budget: ComputeBudget,
    instruction_programs: Vec<Pubkey>,
}

impl SignedTransaction {
    pub(crate) fn new(
        tx: VersionedTransaction,
        anchor: RecencyAnchor,
        budget: ComputeBudget,
        instruction_programs: Vec<Pubkey>,
    ) -> Self {
        Self {
            tx,
            anchor,
            budget,
            instruction_programs,
        }
    }

    /// Primary (fee payer) signature, the transaction's identifier
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.tx.signatures
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn anchor(&self) -> &RecencyAnchor {
        &self.anchor
    }

    pub fn budget(&self) -> ComputeBudget {
        self.budget
    }

    /// Program id per compiled instruction index, for error decoding
    pub fn instruction_programs(&self) -> &[Pubkey] {
        &self.instruction_programs
    }

    /// Serialized bytes as sent on the wire
    pub fn wire_bytes(&self) -> Result<Vec<u8>, TransferError> {
        bincode::serialize(&self.tx).map_err(|e| {
            TransferError::invalid_message(format!("Failed to serialize transaction: {}", e))
        })
    }

    /// Check every signature against the message
    pub fn verify(&self) -> bool {
        self.tx.verify_with_results().iter().all(|ok| *ok)
    }
}
