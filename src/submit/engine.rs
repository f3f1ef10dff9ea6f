//! Broadcast and confirmation engine
//!
//! ## Contract
//!
//! - The signed bytes are broadcast with the policy's `skipPreflight`,
//!   `preflightCommitment` and node-side `maxRetries`
//! - A preflight failure ends the submission as `PreflightRejected`; it is
//!   never retried
//! - Retryable transport errors on the initial broadcast are retried with
//!   exponential backoff, bounded by `max_retries`
//! - "Already processed" counts as an accepted broadcast
//! - While the signature is unknown to the node the identical bytes are
//!   rebroadcast every `rebroadcast_interval`, within the same budget
//! - Once the block height passes the anchor's `last_valid_block_height`
//!   and the signature is still unknown, the submission ends as `Expired`:
//!   those bytes can no longer land
//! - The whole submission runs under `timeout`; running out yields
//!   `TimedOut`, which leaves any accepted broadcast untouched

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Signature;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::outcome::SubmissionOutcome;
use super::policy::{ConfirmationMode, SubmitPolicy};
use super::{SignatureNotification, SignatureSubscriber};
use crate::classify::{ClassifyContext, ErrorClassifier};
use crate::rpc_manager::{NodeClient, RetryPolicy, RpcManagerError, SignatureStatus};
use crate::tx_builder::SignedTransaction;

/// Poll interval used when a subscription breaks mid-wait
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How often block height is checked while waiting on a subscription
const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// `tokio::time::interval` panics on a zero period
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Per-submission state shared by the broadcast and confirmation phases
struct Attempt<'a> {
    signed: &'a SignedTransaction,
    signature: Signature,
    policy: &'a SubmitPolicy,
    context: ClassifyContext,
    broadcasts: usize,
    last_broadcast: Instant,
}

impl Attempt<'_> {
    fn retries_left(&self) -> bool {
        // First broadcast is not a retry
        self.broadcasts <= self.policy.max_retries
    }
}

/// Submits signed transactions and waits for confirmation
#[derive(Clone)]
pub struct SubmissionEngine {
    node: Arc<dyn NodeClient>,
    subscriber: Option<Arc<dyn SignatureSubscriber>>,
    classifier: Arc<ErrorClassifier>,
    backoff: RetryPolicy,
}

impl std::fmt::Debug for SubmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionEngine")
            .field("endpoint", &self.node.endpoint())
            .field("subscriber", &self.subscriber.is_some())
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl SubmissionEngine {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            node,
            subscriber: None,
            classifier: Arc::new(ErrorClassifier::new()),
            backoff: RetryPolicy::default(),
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn SignatureSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Broadcast `signed` and wait for `policy.commitment`
    pub async fn submit(
        &self,
        signed: &SignedTransaction,
        policy: &SubmitPolicy,
    ) -> SubmissionOutcome {
        let signature = signed.signature();
        let mut attempt = Attempt {
            signed,
            signature,
            policy,
            context: ClassifyContext::for_transaction(signed),
            broadcasts: 0,
            last_broadcast: Instant::now(),
        };

        info!(
            signature = %signature,
            skip_preflight = policy.skip_preflight,
            commitment = %policy.commitment,
            timeout_ms = policy.timeout.as_millis() as u64,
            "Submitting transaction"
        );

        let run = async {
            if let Err(outcome) = self.initial_broadcast(&mut attempt).await {
                return outcome;
            }
            self.await_confirmation(&mut attempt).await
        };

        match tokio::time::timeout(policy.timeout, run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    signature = %signature,
                    timeout_ms = policy.timeout.as_millis() as u64,
                    "Confirmation wait timed out; transaction may still land"
                );
                SubmissionOutcome::TimedOut { signature }
            }
        }
    }

    async fn send(&self, attempt: &mut Attempt<'_>) -> Result<(), RpcManagerError> {
        attempt.broadcasts += 1;
        attempt.last_broadcast = Instant::now();

        let config = attempt.policy.broadcast_config();
        let reported = self
            .node
            .broadcast(attempt.signed.transaction(), &config)
            .await?;

        if reported != attempt.signature {
            warn!(
                expected = %attempt.signature,
                reported = %reported,
                "Node reported a different signature"
            );
        }
        Ok(())
    }

    /// Initial broadcast with backoff on retryable errors
    async fn initial_broadcast(&self, attempt: &mut Attempt<'_>) -> Result<(), SubmissionOutcome> {
        let mut retry = 0u32;

        loop {
            match self.send(attempt).await {
                Ok(()) => {
                    debug!(signature = %attempt.signature, broadcasts = attempt.broadcasts, "Broadcast accepted");
                    return Ok(());
                }
                Err(RpcManagerError::AlreadyProcessed { .. }) => {
                    info!(signature = %attempt.signature, "Node already processed this signature");
                    return Ok(());
                }
                Err(
                    err @ (RpcManagerError::PreflightFailure { .. }
                    | RpcManagerError::BlockhashNotFound { .. }),
                ) => {
                    let diagnosis = self.classifier.classify(&err, &attempt.context);
                    warn!(
                        signature = %attempt.signature,
                        diagnosis = %diagnosis,
                        "Preflight rejected transaction"
                    );
                    return Err(SubmissionOutcome::PreflightRejected {
                        signature: attempt.signature,
                        diagnosis,
                    });
                }
                Err(err) if err.is_retryable() && attempt.retries_left() => {
                    let delay = self.backoff.calculate_delay(retry);
                    retry += 1;
                    warn!(
                        signature = %attempt.signature,
                        error = %err,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "Broadcast failed, retrying identical bytes"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let diagnosis = self.classifier.classify(&err, &attempt.context);
                    warn!(
                        signature = %attempt.signature,
                        error = %err,
                        broadcasts = attempt.broadcasts,
                        "Broadcast failed"
                    );
                    return Err(SubmissionOutcome::TransportFailed {
                        signature: attempt.signature,
                        diagnosis,
                    });
                }
            }
        }
    }

    async fn await_confirmation(&self, attempt: &mut Attempt<'_>) -> SubmissionOutcome {
        match (attempt.policy.confirmation, &self.subscriber) {
            (ConfirmationMode::Polling { interval }, _) => self.poll(attempt, interval).await,
            (ConfirmationMode::Subscription, Some(subscriber)) => {
                let subscriber = Arc::clone(subscriber);
                match self.wait_pushed(attempt, subscriber.as_ref()).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(
                            signature = %attempt.signature,
                            error = %err,
                            "Signature subscription failed, falling back to polling"
                        );
                        self.poll(attempt, FALLBACK_POLL_INTERVAL).await
                    }
                }
            }
            (ConfirmationMode::Subscription, None) => {
                warn!("Subscription confirmation requested without a subscriber, polling instead");
                self.poll(attempt, FALLBACK_POLL_INTERVAL).await
            }
        }
    }

    /// Wait on the push channel, with one status probe for signatures that
    /// landed before the subscription was established
    async fn wait_pushed(
        &self,
        attempt: &Attempt<'_>,
        subscriber: &dyn SignatureSubscriber,
    ) -> Result<SubmissionOutcome, RpcManagerError> {
        let commitment = attempt.policy.commitment;
        let pushed = subscriber.wait_for_signature(&attempt.signature, commitment);
        let probe = async {
            match self.node.signature_status(&attempt.signature).await {
                Ok(Some(status)) if status.level >= commitment => Some(status),
                _ => None,
            }
        };
        tokio::pin!(pushed);

        tokio::select! {
            notification = &mut pushed => {
                let SignatureNotification { slot, err } = notification?;
                Ok(self.landed(attempt, SignatureStatus { slot, level: commitment, err }))
            }
            Some(status) = probe => Ok(self.landed(attempt, status)),
            outcome = self.watch_expiry(attempt) => Ok(outcome),
        }
    }

    /// Resolves only once the anchor has expired without the signature landing
    async fn watch_expiry(&self, attempt: &Attempt<'_>) -> SubmissionOutcome {
        let mut ticker = tokio::time::interval(EXPIRY_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Some(outcome) = self.check_expiry(attempt).await {
                return outcome;
            }
        }
    }

    /// `Some` when the anchor's window has closed; the signature status is
    /// looked up once more since it may have landed right before the end
    async fn check_expiry(&self, attempt: &Attempt<'_>) -> Option<SubmissionOutcome> {
        let anchor = attempt.signed.anchor();
        let block_height = match self.node.block_height(anchor.level).await {
            Ok(height) if !anchor.is_valid_at(height) => height,
            Ok(_) => return None,
            Err(err) => {
                debug!(signature = %attempt.signature, error = %err, "Block height lookup failed");
                return None;
            }
        };

        match self.node.signature_status(&attempt.signature).await {
            Ok(Some(status)) if status.level >= attempt.policy.commitment => {
                Some(self.landed(attempt, status))
            }
            // Landed below the requested level; keep waiting
            Ok(Some(_)) => None,
            Ok(None) => {
                warn!(
                    signature = %attempt.signature,
                    block_height,
                    last_valid_block_height = anchor.last_valid_block_height,
                    broadcasts = attempt.broadcasts,
                    "Blockhash expired before the transaction landed"
                );
                Some(SubmissionOutcome::Expired {
                    signature: attempt.signature,
                    last_valid_block_height: anchor.last_valid_block_height,
                    block_height,
                })
            }
            Err(err) => {
                debug!(signature = %attempt.signature, error = %err, "Status recheck failed");
                None
            }
        }
    }

    async fn poll(&self, attempt: &mut Attempt<'_>, interval: Duration) -> SubmissionOutcome {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_errors = 0u32;

        loop {
            ticker.tick().await;

            match self.node.signature_status(&attempt.signature).await {
                Ok(Some(status)) if status.level >= attempt.policy.commitment => {
                    return self.landed(attempt, status);
                }
                Ok(Some(status)) => {
                    consecutive_errors = 0;
                    debug!(
                        signature = %attempt.signature,
                        level = %status.level,
                        slot = status.slot,
                        "Waiting for commitment"
                    );
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    if let Some(outcome) = self.check_expiry(attempt).await {
                        return outcome;
                    }
                    self.maybe_rebroadcast(attempt).await;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    let exhausted =
                        consecutive_errors >= attempt.policy.max_consecutive_status_errors;
                    if !err.is_retryable() || exhausted {
                        warn!(
                            signature = %attempt.signature,
                            error = %err,
                            consecutive_errors,
                            "Status lookups failed, giving up"
                        );
                        return SubmissionOutcome::TransportFailed {
                            signature: attempt.signature,
                            diagnosis: self.classifier.classify(&err, &attempt.context),
                        };
                    }
                    debug!(signature = %attempt.signature, error = %err, consecutive_errors, "Status lookup failed");
                }
            }
        }
    }

    async fn maybe_rebroadcast(&self, attempt: &mut Attempt<'_>) {
        if !attempt.retries_left()
            || attempt.last_broadcast.elapsed() < attempt.policy.rebroadcast_interval
        {
            return;
        }

        match self.send(attempt).await {
            Ok(()) => {
                debug!(signature = %attempt.signature, broadcasts = attempt.broadcasts, "Rebroadcast identical bytes");
            }
            Err(RpcManagerError::AlreadyProcessed { .. }) => {
                debug!(signature = %attempt.signature, "Rebroadcast: already processed");
            }
            Err(err) => {
                // Status polling decides the outcome
                debug!(signature = %attempt.signature, error = %err, "Rebroadcast failed");
            }
        }
    }

    fn landed(&self, attempt: &Attempt<'_>, status: SignatureStatus) -> SubmissionOutcome {
        match status.err {
            None => {
                info!(
                    signature = %attempt.signature,
                    slot = status.slot,
                    level = %status.level,
                    "Transaction confirmed"
                );
                SubmissionOutcome::Confirmed {
                    signature: attempt.signature,
                    slot: status.slot,
                    level: status.level,
                }
            }
            Some(err) => {
                let diagnosis = self
                    .classifier
                    .classify_transaction_error(&err, &attempt.context);
                warn!(
                    signature = %attempt.signature,
                    slot = status.slot,
                    diagnosis = %diagnosis,
                    "Transaction landed but failed"
                );
                SubmissionOutcome::ExecutionFailed {
                    signature: attempt.signature,
                    slot: status.slot,
                    diagnosis,
                }
            }
        }
    }
}
