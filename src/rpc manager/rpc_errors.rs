use std::time::Duration;

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

use super::NodeTransactionError;

/// JSON-RPC code the node uses for "node is behind / unhealthy"
const NODE_UNHEALTHY_CODE: i64 = -32005;

/// Comprehensive RPC Manager error types
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// The node dry-ran the transaction and refused to forward it
    #[error("Preflight failure: {message} (endpoint: {endpoint})")]
    PreflightFailure {
        endpoint: String,
        message: String,
        error: Option<NodeTransactionError>,
        logs: Vec<String>,
    },

    /// The node has already processed this exact signature
    #[error("Transaction already processed (endpoint: {endpoint})")]
    AlreadyProcessed { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    /// Response could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,

            // Non-retryable errors
            RpcManagerError::PreflightFailure { .. } => false,
            RpcManagerError::AlreadyProcessed { .. } => false,
            RpcManagerError::BlockhashNotFound { .. } => false,
            RpcManagerError::MalformedResponse(_) => false,
            RpcManagerError::Configuration(_) => false,

            // RPC response errors may or may not be retryable
            RpcManagerError::RpcResponse { code, .. } => match code {
                Some(c) => *c == NODE_UNHEALTHY_CODE || (*c >= 500 && *c < 600),
                None => false,
            },
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: &ClientError, endpoint: &str) -> Self {
        if matches!(
            err.get_transaction_error(),
            Some(TransactionError::AlreadyProcessed)
        ) {
            return RpcManagerError::AlreadyProcessed {
                endpoint: endpoint.to_string(),
            };
        }

        if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message,
            data,
        }) = err.kind()
        {
            if let RpcResponseErrorData::SendTransactionPreflightFailure(result) = data {
                return RpcManagerError::PreflightFailure {
                    endpoint: endpoint.to_string(),
                    message: message.clone(),
                    error: result.err.as_ref().map(NodeTransactionError::decode),
                    logs: result.logs.clone().unwrap_or_default(),
                };
            }
            return Self::from_message(message, Some(*code), endpoint);
        }

        Self::from_message(&err.to_string(), None, endpoint)
    }

    /// Classify based on error message
    pub fn from_message(message: &str, code: Option<i64>, endpoint: &str) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("already been processed") || err_str.contains("alreadyprocessed") {
            RpcManagerError::AlreadyProcessed { endpoint }
        } else if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if err_str.contains("rate limit") || err_str.contains("too many requests") {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint,
                timeout_ms: 0,
            }
        } else if code.is_none()
            && (err_str.contains("connection")
                || err_str.contains("error sending request")
                || err_str.contains("dns")
                || err_str.contains("broken pipe"))
        {
            RpcManagerError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            RpcManagerError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

/// Backoff schedule for rebroadcasting identical signed bytes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    pub jitter_factor: f64,

    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter_factor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for a given (zero-based) retry number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        // Add jitter to prevent thundering herd
        let jitter = if self.jitter_factor > 0.0 {
            (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor
        } else {
            0.0
        };
        let jittered_delay = (delay_ms * (1.0 + jitter)).max(0.0) as u64;

        Duration::from_millis(jittered_delay)
    }

    /// Deterministic schedule without jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_retryable());

        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_retryable());

        assert!(RpcManagerError::RpcResponse {
            endpoint: "test".to_string(),
            message: "node is behind".to_string(),
            code: Some(-32005),
        }
        .is_retryable());

        assert!(!RpcManagerError::PreflightFailure {
            endpoint: "test".to_string(),
            message: "simulation failed".to_string(),
            error: None,
            logs: vec![],
        }
        .is_retryable());
        assert!(!RpcManagerError::AlreadyProcessed {
            endpoint: "test".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_from_message_classification() {
        let err = RpcManagerError::from_message(
            "Transaction simulation failed: This transaction has already been processed",
            Some(-32002),
            "https://rpc.test",
        );
        assert!(matches!(err, RpcManagerError::AlreadyProcessed { .. }));

        let err = RpcManagerError::from_message("429 Too Many Requests", None, "https://rpc.test");
        assert!(matches!(err, RpcManagerError::RateLimitExceeded { .. }));

        let err = RpcManagerError::from_message(
            "error sending request for url (https://rpc.test/)",
            None,
            "https://rpc.test",
        );
        assert!(matches!(err, RpcManagerError::Transport { .. }));

        let err = RpcManagerError::from_message("Invalid params", Some(-32602), "https://rpc.test");
        assert!(matches!(
            err,
            RpcManagerError::RpcResponse {
                code: Some(-32602),
                ..
            }
        ));
    }

    #[test]
    fn test_digits_in_message_are_not_a_rate_limit() {
        let err = RpcManagerError::from_message(
            "Invalid param: account not found at slot 284290",
            Some(-32602),
            "https://rpc.test",
        );
        assert!(matches!(err, RpcManagerError::RpcResponse { .. }));
        assert!(!err.is_retryable());

        let err = RpcManagerError::from_message(
            "HTTP status client error (429 Too Many Requests) for url (https://rpc.test/)",
            None,
            "https://rpc.test",
        );
        assert!(matches!(err, RpcManagerError::RateLimitExceeded { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_policy_delay_grows_and_caps() {
        let policy = RetryPolicy::default().without_jitter();

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(20), Duration::from_millis(5000));
    }
}
