//! Recency anchor for transaction building
//!
//! A [`RecencyAnchor`] is a recent blockhash plus the last block height at
//! which it remains valid. The pipeline fetches one for the draft (used only
//! for estimation) and a second, independent one for the final message, so
//! time spent estimating never eats into the final message's validity window.
//!
//! ## Lifecycle
//!
//! 1. Fetched through [`AnchorProvider::fetch`] at a chosen commitment
//! 2. Embedded into exactly one message
//! 3. Never mutated; a new message needs a new fetch

use std::sync::Arc;

use solana_sdk::hash::Hash;
use tracing::debug;

use crate::rpc_manager::{ConfirmationLevel, NodeClient};
use crate::tx_builder::errors::TransferError;

/// Recent blockhash with its validity horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    /// Commitment the blockhash was observed at
    pub level: ConfirmationLevel,
}

impl RecencyAnchor {
    pub fn new(blockhash: Hash, last_valid_block_height: u64, level: ConfirmationLevel) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
            level,
        }
    }

    /// Whether `current_block_height` is still inside the validity window
    pub fn is_valid_at(&self, current_block_height: u64) -> bool {
        current_block_height <= self.last_valid_block_height
    }
}

/// Fetches recency anchors from a node
#[derive(Clone)]
pub struct AnchorProvider {
    node: Arc<dyn NodeClient>,
}

impl AnchorProvider {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self { node }
    }

    /// Fetch a fresh anchor at `level`
    ///
    /// Every call hits the node; anchors are never cached.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::AnchorFetchFailed`] when the node is
    /// unreachable or rejects the request.
    pub async fn fetch(&self, level: ConfirmationLevel) -> Result<RecencyAnchor, TransferError> {
        let latest = self
            .node
            .latest_blockhash(level)
            .await
            .map_err(|source| TransferError::AnchorFetchFailed { source })?;

        debug!(
            endpoint = %self.node.endpoint(),
            blockhash = %latest.blockhash,
            last_valid_block_height = latest.last_valid_block_height,
            level = %level,
            "Recency anchor fetched"
        );

        Ok(RecencyAnchor::new(
            latest.blockhash,
            latest.last_valid_block_height,
            level,
        ))
    }
}

impl std::fmt::Debug for AnchorProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorProvider")
            .field("endpoint", &self.node.endpoint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::RpcManagerError;
    use crate::test_utils::ScriptedNode;

    #[tokio::test]
    async fn test_fetch_returns_node_blockhash() {
        let node = Arc::new(ScriptedNode::new());
        let hash = Hash::new_unique();
        node.push_blockhash(hash, 150);

        let provider = AnchorProvider::new(node.clone());
        let anchor = provider.fetch(ConfirmationLevel::Confirmed).await.unwrap();

        assert_eq!(anchor.blockhash, hash);
        assert_eq!(anchor.last_valid_block_height, 150);
        assert_eq!(anchor.level, ConfirmationLevel::Confirmed);
        assert!(anchor.is_valid_at(150));
        assert!(!anchor.is_valid_at(151));
        assert_eq!(node.blockhash_calls(), 1);
    }

    #[tokio::test]
    async fn test_each_fetch_hits_the_node() {
        let node = Arc::new(ScriptedNode::new());
        let first = Hash::new_unique();
        let second = Hash::new_unique();
        node.push_blockhash(first, 100);
        node.push_blockhash(second, 110);

        let provider = AnchorProvider::new(node.clone());
        let a = provider.fetch(ConfirmationLevel::Confirmed).await.unwrap();
        let b = provider.fetch(ConfirmationLevel::Confirmed).await.unwrap();

        assert_eq!(a.blockhash, first);
        assert_eq!(b.blockhash, second);
        assert_eq!(node.blockhash_calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_maps_to_anchor_error() {
        let node = Arc::new(ScriptedNode::new());
        node.fail_blockhash(RpcManagerError::Transport {
            endpoint: "scripted".to_string(),
            message: "connection refused".to_string(),
        });

        let provider = AnchorProvider::new(node);
        let err = provider
            .fetch(ConfirmationLevel::Finalized)
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::AnchorFetchFailed { .. }));
        assert!(err.is_retryable());
    }
}
