//! Compute estimation through simulation
//!
//! The draft is simulated unsigned (`sigVerify: false`) with
//! `replaceRecentBlockhash: true`, so the draft anchor aging out between
//! fetch and simulation does not matter.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::rpc_manager::{ConfirmationLevel, NodeClient};
use crate::tx_builder::budget::derive_compute_unit_limit;
use crate::tx_builder::builder::DraftMessage;
use crate::tx_builder::errors::TransferError;

/// Simulated consumption and the limit derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeEstimate {
    pub units_consumed: u64,
    pub unit_limit: u32,
}

/// Simulates drafts to size the compute unit limit
#[derive(Clone)]
pub struct ComputeEstimator {
    node: Arc<dyn NodeClient>,
    level: ConfirmationLevel,
}

impl ComputeEstimator {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            node,
            level: ConfirmationLevel::Confirmed,
        }
    }

    /// Commitment the simulation runs against (default `confirmed`)
    pub fn with_level(mut self, level: ConfirmationLevel) -> Self {
        self.level = level;
        self
    }

    /// Simulate `draft` and derive `max(1000, ceil(units * 1.1))`
    ///
    /// # Errors
    ///
    /// `SimulationFailed` when the node call fails, the simulation reports
    /// an execution error, or no consumption figure comes back. Node logs
    /// are attached when available.
    pub async fn estimate(&self, draft: &DraftMessage) -> Result<ComputeEstimate, TransferError> {
        let tx = draft.to_unsigned_transaction()?;

        let report = self
            .node
            .simulate(&tx, self.level)
            .await
            .map_err(|e| TransferError::simulation(e.to_string(), Vec::new()))?;

        if let Some(err) = report.err {
            warn!(
                error = %err,
                log_lines = report.logs.len(),
                "Draft simulation reported an execution error"
            );
            return Err(TransferError::simulation(err.message, report.logs));
        }

        let units_consumed = report.units_consumed.ok_or_else(|| {
            TransferError::simulation("simulation did not report unitsConsumed", report.logs)
        })?;

        let unit_limit = derive_compute_unit_limit(units_consumed);
        debug!(units_consumed, unit_limit, "Compute estimate derived");

        Ok(ComputeEstimate {
            units_consumed,
            unit_limit,
        })
    }
}

impl std::fmt::Debug for ComputeEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEstimator")
            .field("endpoint", &self.node.endpoint())
            .field("level", &self.level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::{NodeTransactionError, SimulationReport};
    use crate::test_utils::{scripted_draft, ScriptedNode};
    use solana_sdk::instruction::InstructionError;
    use solana_sdk::transaction::TransactionError;

    #[tokio::test]
    async fn test_estimate_applies_margin() {
        let node = Arc::new(ScriptedNode::new());
        node.push_simulation(SimulationReport {
            units_consumed: Some(2_000),
            ..SimulationReport::default()
        });

        let estimator = ComputeEstimator::new(node.clone());
        let (draft, _) = scripted_draft(1_000);
        let estimate = estimator.estimate(&draft).await.unwrap();

        assert_eq!(estimate.units_consumed, 2_000);
        assert_eq!(estimate.unit_limit, 2_200);
        assert_eq!(node.simulate_calls(), 1);
    }

    #[tokio::test]
    async fn test_simulation_runs_at_configured_level() {
        let node = Arc::new(ScriptedNode::new());
        let (draft, _) = scripted_draft(1_000);

        ComputeEstimator::new(node.clone()).estimate(&draft).await.unwrap();
        ComputeEstimator::new(node.clone())
            .with_level(ConfirmationLevel::Finalized)
            .estimate(&draft)
            .await
            .unwrap();

        assert_eq!(
            node.simulated_levels(),
            vec![ConfirmationLevel::Confirmed, ConfirmationLevel::Finalized]
        );
    }

    #[tokio::test]
    async fn test_estimate_small_consumption_uses_floor() {
        let node = Arc::new(ScriptedNode::new());
        node.push_simulation(SimulationReport {
            units_consumed: Some(150),
            ..SimulationReport::default()
        });

        let (draft, _) = scripted_draft(1);
        let estimate = ComputeEstimator::new(node).estimate(&draft).await.unwrap();
        assert_eq!(estimate.unit_limit, 1_000);
    }

    #[tokio::test]
    async fn test_execution_error_carries_logs() {
        let node = Arc::new(ScriptedNode::new());
        node.push_simulation(SimulationReport {
            err: Some(NodeTransactionError::from_transaction_error(
                TransactionError::InstructionError(0, InstructionError::Custom(1)),
            )),
            units_consumed: Some(150),
            logs: vec!["Transfer: insufficient lamports 0, need 10".to_string()],
        });

        let (draft, _) = scripted_draft(10);
        let err = ComputeEstimator::new(node).estimate(&draft).await.unwrap_err();

        match err {
            TransferError::SimulationFailed { logs, .. } => {
                assert_eq!(logs.len(), 1);
                assert!(logs[0].contains("insufficient lamports"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_units_is_a_failure() {
        let node = Arc::new(ScriptedNode::new());
        node.push_simulation(SimulationReport::default());

        let (draft, _) = scripted_draft(10);
        let err = ComputeEstimator::new(node).estimate(&draft).await.unwrap_err();
        assert!(matches!(err, TransferError::SimulationFailed { .. }));
    }
}
