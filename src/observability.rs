//! Correlation and structured pipeline logging

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submit::SubmissionOutcome;
use crate::tx_builder::{ComputeBudget, RecencyAnchor, TransferError};

/// Correlation ID for tracking one pipeline run across components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a new correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stage events of one transfer, keyed by correlation id
#[derive(Debug, Clone)]
pub struct TransferLogger {
    correlation_id: CorrelationId,
}

impl TransferLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_draft_built(&self, fee_payer: &str, instructions: usize, anchor: &RecencyAnchor) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            fee_payer = %fee_payer,
            instructions = %instructions,
            blockhash = %anchor.blockhash,
            "Draft message built"
        );
    }

    pub fn log_estimates(&self, budget: &ComputeBudget, units_consumed: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            unit_price_micro_lamports = %budget.unit_price_micro_lamports,
            unit_limit = %budget.unit_limit,
            units_consumed = %units_consumed,
            max_priority_fee_lamports = %budget.max_priority_fee_lamports(),
            "Compute budget derived"
        );
    }

    pub fn log_final_signed(&self, signature: &str, anchor: &RecencyAnchor) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            blockhash = %anchor.blockhash,
            last_valid_block_height = %anchor.last_valid_block_height,
            "Final message signed"
        );
    }

    pub fn log_outcome(&self, outcome: &SubmissionOutcome, latency_ms: u64) {
        match outcome.diagnosis() {
            None if outcome.is_confirmed() => tracing::info!(
                correlation_id = %self.correlation_id,
                signature = %outcome.signature(),
                outcome = %outcome.kind(),
                latency_ms = %latency_ms,
                "Transfer confirmed"
            ),
            None => tracing::warn!(
                correlation_id = %self.correlation_id,
                signature = %outcome.signature(),
                outcome = %outcome.kind(),
                latency_ms = %latency_ms,
                "Transfer not confirmed"
            ),
            Some(diagnosis) => tracing::warn!(
                correlation_id = %self.correlation_id,
                signature = %outcome.signature(),
                outcome = %outcome.kind(),
                diagnosis = %diagnosis,
                latency_ms = %latency_ms,
                "Transfer failed"
            ),
        }
    }

    pub fn log_aborted(&self, error: &TransferError) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            category = %error.category(),
            error = %error,
            retryable = %error.is_retryable(),
            "Transfer aborted before broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert_eq!(CorrelationId::from("fixed").to_string(), "fixed");
    }
}
