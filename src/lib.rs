//! Fee-aware, compute-budgeted SOL transfer pipeline
//!
//! Builds a transfer, prices it with an external priority fee estimate,
//! sizes its compute budget from simulation, re-anchors it to a fresh
//! blockhash, signs it and submits it under an explicit
//! retry/confirmation contract. Failures are classified into actionable
//! diagnoses.
//!
//! The entry point is [`pipeline::TransferPipeline::transfer`].

pub mod classify;
pub mod config;
pub mod fee_estimator;
pub mod observability;
pub mod pipeline;
pub mod submit;
pub mod wallet;

// The rpc_manager module lives in a directory with a space in its name
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub mod tx_builder;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use classify::{Diagnosis, ErrorClassifier};
pub use pipeline::{TransferPipeline, TransferReport};
pub use rpc_manager::ConfirmationLevel;
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
pub use submit::{ConfirmationMode, SubmissionOutcome, SubmitPolicy};
pub use tx_builder::TransferError;

#[cfg(test)]
mod tests {
    mod pipeline_scenario_tests;
    mod submission_engine_tests;
}
