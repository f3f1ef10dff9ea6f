//! Priority fee estimation over HTTP JSON-RPC
//!
//! Posts the base64 wire form of the draft to `getPriorityFeeEstimate` and
//! returns the estimate in micro-lamports per compute unit. Any failure is a
//! hard [`TransferError::FeeEstimationFailed`]: a missing estimate is never
//! treated as zero, and the estimator never retries on its own.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tx_builder::{DraftMessage, TransferError};

/// Service-side priority level presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityLevel {
    Min,
    Low,
    Medium,
    High,
    VeryHigh,
    UnsafeMax,
}

/// Source of priority fee estimates
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    /// Estimate the unit price for `draft` in micro-lamports per compute unit
    async fn estimate(&self, draft: &DraftMessage) -> Result<u64, TransferError>;
}

/// `getPriorityFeeEstimate` client
#[derive(Debug, Clone)]
pub struct JsonRpcFeeEstimator {
    /// HTTP client used for estimation calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    url: String,
    /// Preset level; `None` requests the service's recommended value.
    priority_level: Option<PriorityLevel>,
}

impl JsonRpcFeeEstimator {
    /// Create an estimator for `url`
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the HTTP client cannot be created.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            priority_level: None,
        })
    }

    pub fn with_priority_level(mut self, level: Option<PriorityLevel>) -> Self {
        self.priority_level = level;
        self
    }

    fn request_body(&self, encoded_tx: String) -> serde_json::Value {
        let options = match self.priority_level {
            Some(level) => EstimateOptions {
                transaction_encoding: "base64",
                recommended: None,
                priority_level: Some(level),
            },
            None => EstimateOptions {
                transaction_encoding: "base64",
                recommended: Some(true),
                priority_level: None,
            },
        };

        serde_json::json!({
            "jsonrpc": "2.0",
            "id": "priority-transfer",
            "method": "getPriorityFeeEstimate",
            "params": [
                EstimateParams {
                    transaction: encoded_tx,
                    options,
                }
            ]
        })
    }
}

#[derive(Debug, Serialize)]
struct EstimateParams {
    transaction: String,
    options: EstimateOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateOptions {
    transaction_encoding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority_level: Option<PriorityLevel>,
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// Result value for successful calls.
    result: Option<EstimateResult>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResult {
    priority_fee_estimate: Option<f64>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Extract the estimate from a response body
///
/// Fractional estimates round up; negative, non-finite or missing values
/// are errors.
pub fn parse_fee_estimate(body: &[u8]) -> Result<u64, TransferError> {
    let parsed: JsonRpcResponse = serde_json::from_slice(body)
        .map_err(|e| TransferError::fee_estimation(format!("malformed response: {}", e)))?;

    if let Some(error) = parsed.error {
        return Err(TransferError::fee_estimation(format!(
            "rpc error {}: {}",
            error.code, error.message
        )));
    }

    let estimate = parsed
        .result
        .and_then(|r| r.priority_fee_estimate)
        .ok_or_else(|| TransferError::fee_estimation("response has no priorityFeeEstimate"))?;

    if !estimate.is_finite() || estimate < 0.0 {
        return Err(TransferError::fee_estimation(format!(
            "invalid priorityFeeEstimate {}",
            estimate
        )));
    }
    if estimate.ceil() > u64::MAX as f64 {
        return Err(TransferError::fee_estimation(format!(
            "priorityFeeEstimate {} out of range",
            estimate
        )));
    }

    Ok(estimate.ceil() as u64)
}

#[async_trait]
impl FeeEstimator for JsonRpcFeeEstimator {
    async fn estimate(&self, draft: &DraftMessage) -> Result<u64, TransferError> {
        let encoded_tx = BASE64_STANDARD.encode(draft.to_wire_bytes()?);
        let payload = self.request_body(encoded_tx);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransferError::fee_estimation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::fee_estimation(format!(
                "service returned HTTP {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransferError::fee_estimation(format!("failed to read body: {}", e)))?;

        let estimate = parse_fee_estimate(&body)?;
        debug!(
            micro_lamports_per_cu = estimate,
            priority_level = ?self.priority_level,
            "Priority fee estimated"
        );
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_and_fractional_estimates() {
        let body = br#"{"jsonrpc":"2.0","id":"1","result":{"priorityFeeEstimate":5000}}"#;
        assert_eq!(parse_fee_estimate(body).unwrap(), 5_000);

        let body = br#"{"jsonrpc":"2.0","id":"1","result":{"priorityFeeEstimate":1234.2}}"#;
        assert_eq!(parse_fee_estimate(body).unwrap(), 1_235);

        let body = br#"{"jsonrpc":"2.0","id":"1","result":{"priorityFeeEstimate":0}}"#;
        assert_eq!(parse_fee_estimate(body).unwrap(), 0);
    }

    #[test]
    fn test_parse_rejects_missing_and_negative() {
        let body = br#"{"jsonrpc":"2.0","id":"1","result":{}}"#;
        assert!(matches!(
            parse_fee_estimate(body),
            Err(TransferError::FeeEstimationFailed { .. })
        ));

        let body = br#"{"jsonrpc":"2.0","id":"1","result":{"priorityFeeEstimate":-1}}"#;
        assert!(parse_fee_estimate(body).is_err());

        assert!(parse_fee_estimate(b"not json").is_err());
    }

    #[test]
    fn test_parse_surfaces_rpc_error() {
        let body =
            br#"{"jsonrpc":"2.0","id":"1","error":{"code":-32602,"message":"invalid params"}}"#;
        let err = parse_fee_estimate(body).unwrap_err();
        assert!(err.to_string().contains("invalid params"));
    }

    #[test]
    fn test_request_body_recommended_by_default() {
        let estimator =
            JsonRpcFeeEstimator::new("http://localhost:8899", Duration::from_secs(1)).unwrap();
        let body = estimator.request_body("AQID".to_string());

        assert_eq!(body["method"], "getPriorityFeeEstimate");
        let options = &body["params"][0]["options"];
        assert_eq!(options["transactionEncoding"], "base64");
        assert_eq!(options["recommended"], true);
        assert!(options.get("priorityLevel").is_none());
        assert_eq!(body["params"][0]["transaction"], "AQID");
    }

    #[test]
    fn test_request_body_with_priority_level() {
        let estimator = JsonRpcFeeEstimator::new("http://localhost:8899", Duration::from_secs(1))
            .unwrap()
            .with_priority_level(Some(PriorityLevel::VeryHigh));
        let body = estimator.request_body("AQID".to_string());

        let options = &body["params"][0]["options"];
        assert_eq!(options["priorityLevel"], "VeryHigh");
        assert!(options.get("recommended").is_none());
    }
}
