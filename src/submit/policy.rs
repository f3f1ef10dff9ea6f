//! Submission policy

use std::time::Duration;

use crate::rpc_manager::{BroadcastConfig, ConfirmationLevel};

/// How the engine learns that a signature reached the requested commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    /// `getSignatureStatuses` every `interval`
    Polling { interval: Duration },
    /// `signatureSubscribe` push notifications
    Subscription,
}

impl Default for ConfirmationMode {
    fn default() -> Self {
        Self::Polling {
            interval: Duration::from_millis(500),
        }
    }
}

/// Broadcast and confirmation contract of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPolicy {
    /// Skip the node-side dry run
    pub skip_preflight: bool,
    /// Node-side `maxRetries` and the client-side rebroadcast budget
    pub max_retries: usize,
    /// Level at which the transfer counts as confirmed
    pub commitment: ConfirmationLevel,
    /// Total time budget from first broadcast to confirmation
    pub timeout: Duration,
    pub confirmation: ConfirmationMode,
    /// Minimum gap between rebroadcasts while the signature is unknown
    pub rebroadcast_interval: Duration,
    /// Status lookups that may fail in a row before giving up
    pub max_consecutive_status_errors: u32,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            max_retries: 3,
            commitment: ConfirmationLevel::Confirmed,
            timeout: Duration::from_secs(60),
            confirmation: ConfirmationMode::default(),
            rebroadcast_interval: Duration::from_secs(2),
            max_consecutive_status_errors: 5,
        }
    }
}

impl SubmitPolicy {
    /// Options forwarded to `sendTransaction`
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            skip_preflight: self.skip_preflight,
            preflight_commitment: self.commitment,
            max_retries: Some(self.max_retries),
        }
    }

    pub fn with_skip_preflight(mut self, skip: bool) -> Self {
        self.skip_preflight = skip;
        self
    }

    pub fn with_commitment(mut self, commitment: ConfirmationLevel) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationMode) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_rebroadcast_interval(mut self, interval: Duration) -> Self {
        self.rebroadcast_interval = interval;
        self
    }
}
