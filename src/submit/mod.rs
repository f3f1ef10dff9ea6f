//! Submission and confirmation
//!
//! Broadcasts a [`SignedTransaction`](crate::tx_builder::SignedTransaction)
//! and waits for the requested commitment under a [`SubmitPolicy`]. The
//! engine only ever rebroadcasts the identical signed bytes; building a new
//! transaction (a new signature) is the caller's decision.

use async_trait::async_trait;
use solana_sdk::signature::Signature;

use crate::rpc_manager::{ConfirmationLevel, NodeTransactionError, RpcManagerError};

pub mod engine;
pub mod outcome;
pub mod policy;
pub mod subscribe;

pub use engine::SubmissionEngine;
pub use outcome::SubmissionOutcome;
pub use policy::{ConfirmationMode, SubmitPolicy};
pub use subscribe::PubsubSignatureSubscriber;

/// Push notification that a signature reached a commitment level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureNotification {
    pub slot: u64,
    /// Execution error, if the transaction failed
    pub err: Option<NodeTransactionError>,
}

/// Confirmation push channel
#[async_trait]
pub trait SignatureSubscriber: Send + Sync {
    /// Resolve once `signature` reaches `level`
    ///
    /// Cancelling the returned future must tear the subscription down.
    async fn wait_for_signature(
        &self,
        signature: &Signature,
        level: ConfirmationLevel,
    ) -> Result<SignatureNotification, RpcManagerError>;
}
