//! Test Utilities Module
//!
//! Scripted stand-ins for the node, the fee service and the confirmation
//! push channel, so pipeline scenarios run deterministically without a
//! cluster.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};

use crate::fee_estimator::FeeEstimator;
use crate::rpc_manager::{
    BroadcastConfig, ConfirmationLevel, LatestBlockhash, NodeClient, NodeTransactionError,
    RpcManagerError, SignatureStatus, SimulationReport,
};
use crate::submit::{SignatureNotification, SignatureSubscriber};
use crate::tx_builder::instructions::transfer_instruction;
use crate::tx_builder::{DraftMessage, MessageBuilder, RecencyAnchor, TransferError};

/// Units reported by simulation when nothing is scripted (a SOL transfer)
pub const DEFAULT_SIMULATED_UNITS: u64 = 150;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct NodeScript {
    blockhashes: VecDeque<Result<LatestBlockhash, RpcManagerError>>,
    simulations: VecDeque<Result<SimulationReport, RpcManagerError>>,
    broadcasts: VecDeque<Result<(), RpcManagerError>>,
    statuses: VecDeque<Result<Option<SignatureStatus>, RpcManagerError>>,
    /// Returned once `statuses` runs dry
    steady_status: Option<SignatureStatus>,
    block_heights: VecDeque<Result<u64, RpcManagerError>>,
    /// Returned once `block_heights` runs dry
    steady_block_height: u64,
}

#[derive(Default)]
struct NodeLog {
    events: Vec<&'static str>,
    blockhashes_served: Vec<Hash>,
    simulated: Vec<VersionedTransaction>,
    simulated_levels: Vec<ConfirmationLevel>,
    broadcast_bytes: Vec<Vec<u8>>,
    broadcast_configs: Vec<BroadcastConfig>,
    status_calls: usize,
    block_height_calls: usize,
}

/// Node whose every answer is scripted up front
///
/// Unscripted calls succeed: a fresh blockhash, a simulation consuming
/// [`DEFAULT_SIMULATED_UNITS`], an accepted broadcast, an unknown signature
/// and block height 0.
#[derive(Default)]
pub struct ScriptedNode {
    script: Mutex<NodeScript>,
    log: Mutex<NodeLog>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_blockhash(&self, blockhash: Hash, last_valid_block_height: u64) {
        lock(&self.script).blockhashes.push_back(Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        }));
    }

    pub fn fail_blockhash(&self, err: RpcManagerError) {
        lock(&self.script).blockhashes.push_back(Err(err));
    }

    pub fn push_simulation(&self, report: SimulationReport) {
        lock(&self.script).simulations.push_back(Ok(report));
    }

    pub fn fail_simulation(&self, err: RpcManagerError) {
        lock(&self.script).simulations.push_back(Err(err));
    }

    /// Outcome of the next broadcast; `Ok(())` accepts it
    pub fn push_broadcast(&self, result: Result<(), RpcManagerError>) {
        lock(&self.script).broadcasts.push_back(result);
    }

    pub fn push_status(&self, result: Result<Option<SignatureStatus>, RpcManagerError>) {
        lock(&self.script).statuses.push_back(result);
    }

    /// Status returned after the scripted ones are used up
    pub fn set_steady_status(&self, status: Option<SignatureStatus>) {
        lock(&self.script).steady_status = status;
    }

    pub fn push_block_height(&self, result: Result<u64, RpcManagerError>) {
        lock(&self.script).block_heights.push_back(result);
    }

    /// Block height returned after the scripted ones are used up
    pub fn set_steady_block_height(&self, height: u64) {
        lock(&self.script).steady_block_height = height;
    }

    pub fn events(&self) -> Vec<&'static str> {
        lock(&self.log).events.clone()
    }

    pub fn blockhash_calls(&self) -> usize {
        lock(&self.log).blockhashes_served.len()
    }

    pub fn blockhashes_served(&self) -> Vec<Hash> {
        lock(&self.log).blockhashes_served.clone()
    }

    pub fn simulate_calls(&self) -> usize {
        lock(&self.log).simulated.len()
    }

    pub fn simulated(&self) -> Vec<VersionedTransaction> {
        lock(&self.log).simulated.clone()
    }

    /// Commitment each simulation ran against
    pub fn simulated_levels(&self) -> Vec<ConfirmationLevel> {
        lock(&self.log).simulated_levels.clone()
    }

    pub fn broadcast_calls(&self) -> usize {
        lock(&self.log).broadcast_bytes.len()
    }

    pub fn broadcast_bytes(&self) -> Vec<Vec<u8>> {
        lock(&self.log).broadcast_bytes.clone()
    }

    pub fn broadcast_configs(&self) -> Vec<BroadcastConfig> {
        lock(&self.log).broadcast_configs.clone()
    }

    pub fn status_calls(&self) -> usize {
        lock(&self.log).status_calls
    }

    pub fn block_height_calls(&self) -> usize {
        lock(&self.log).block_height_calls
    }
}

#[async_trait]
impl NodeClient for ScriptedNode {
    fn endpoint(&self) -> &str {
        "scripted"
    }

    async fn latest_blockhash(
        &self,
        _level: ConfirmationLevel,
    ) -> Result<LatestBlockhash, RpcManagerError> {
        let scripted = lock(&self.script).blockhashes.pop_front();
        let mut log = lock(&self.log);
        log.events.push("blockhash");
        let result = scripted.unwrap_or_else(|| {
            Ok(LatestBlockhash {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 1_000 + log.blockhashes_served.len() as u64,
            })
        });
        if let Ok(latest) = &result {
            log.blockhashes_served.push(latest.blockhash);
        }
        result
    }

    async fn simulate(
        &self,
        tx: &VersionedTransaction,
        level: ConfirmationLevel,
    ) -> Result<SimulationReport, RpcManagerError> {
        let scripted = lock(&self.script).simulations.pop_front();
        let mut log = lock(&self.log);
        log.events.push("simulate");
        log.simulated.push(tx.clone());
        log.simulated_levels.push(level);
        scripted.unwrap_or_else(|| {
            Ok(SimulationReport {
                err: None,
                units_consumed: Some(DEFAULT_SIMULATED_UNITS),
                logs: Vec::new(),
            })
        })
    }

    async fn broadcast(
        &self,
        tx: &VersionedTransaction,
        config: &BroadcastConfig,
    ) -> Result<Signature, RpcManagerError> {
        let scripted = lock(&self.script).broadcasts.pop_front();
        let mut log = lock(&self.log);
        log.events.push("broadcast");
        log.broadcast_bytes
            .push(bincode::serialize(tx).unwrap_or_default());
        log.broadcast_configs.push(config.clone());
        scripted
            .unwrap_or(Ok(()))
            .map(|()| tx.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError> {
        let mut script = lock(&self.script);
        let result = script
            .statuses
            .pop_front()
            .unwrap_or_else(|| Ok(script.steady_status.clone()));
        drop(script);
        let mut log = lock(&self.log);
        log.events.push("status");
        log.status_calls += 1;
        result
    }

    async fn block_height(&self, _level: ConfirmationLevel) -> Result<u64, RpcManagerError> {
        let mut script = lock(&self.script);
        let result = script
            .block_heights
            .pop_front()
            .unwrap_or(Ok(script.steady_block_height));
        drop(script);
        let mut log = lock(&self.log);
        log.events.push("block_height");
        log.block_height_calls += 1;
        result
    }
}

/// Status at `level` without an execution error
pub fn landed_status(slot: u64, level: ConfirmationLevel) -> SignatureStatus {
    SignatureStatus {
        slot,
        level,
        err: None,
    }
}

pub fn transport_error(message: &str) -> RpcManagerError {
    RpcManagerError::Transport {
        endpoint: "scripted".to_string(),
        message: message.to_string(),
    }
}

pub fn blockhash_not_found() -> RpcManagerError {
    RpcManagerError::BlockhashNotFound {
        endpoint: "scripted".to_string(),
    }
}

pub fn already_processed() -> RpcManagerError {
    RpcManagerError::AlreadyProcessed {
        endpoint: "scripted".to_string(),
    }
}

pub fn preflight_failure(
    error: Option<NodeTransactionError>,
    message: &str,
    logs: Vec<String>,
) -> RpcManagerError {
    RpcManagerError::PreflightFailure {
        endpoint: "scripted".to_string(),
        message: message.to_string(),
        error,
        logs,
    }
}

/// Fee estimator returning a fixed answer and recording what it saw
pub struct MockFeeEstimator {
    result: Result<u64, TransferError>,
    seen_anchors: Mutex<Vec<Hash>>,
    seen_instruction_counts: Mutex<Vec<usize>>,
}

impl MockFeeEstimator {
    pub fn returning(micro_lamports: u64) -> Self {
        Self {
            result: Ok(micro_lamports),
            seen_anchors: Mutex::new(Vec::new()),
            seen_instruction_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(TransferError::fee_estimation(reason)),
            seen_anchors: Mutex::new(Vec::new()),
            seen_instruction_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.seen_anchors).len()
    }

    /// Blockhash of every draft this estimator was asked about
    pub fn seen_anchors(&self) -> Vec<Hash> {
        lock(&self.seen_anchors).clone()
    }

    pub fn seen_instruction_counts(&self) -> Vec<usize> {
        lock(&self.seen_instruction_counts).clone()
    }
}

#[async_trait]
impl FeeEstimator for MockFeeEstimator {
    async fn estimate(&self, draft: &DraftMessage) -> Result<u64, TransferError> {
        lock(&self.seen_anchors).push(draft.anchor().blockhash);
        lock(&self.seen_instruction_counts).push(draft.instructions().len());
        self.result.clone()
    }
}

/// Push channel with a scripted answer and optional delay
pub struct ScriptedSubscriber {
    result: Option<Result<SignatureNotification, RpcManagerError>>,
    delay: Duration,
    calls: Mutex<usize>,
}

impl ScriptedSubscriber {
    pub fn notifying(slot: u64, delay: Duration) -> Self {
        Self {
            result: Some(Ok(SignatureNotification { slot, err: None })),
            delay,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(err: RpcManagerError) -> Self {
        Self {
            result: Some(Err(err)),
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    /// Never notifies
    pub fn silent() -> Self {
        Self {
            result: None,
            delay: Duration::ZERO,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl SignatureSubscriber for ScriptedSubscriber {
    async fn wait_for_signature(
        &self,
        _signature: &Signature,
        _level: ConfirmationLevel,
    ) -> Result<SignatureNotification, RpcManagerError> {
        *lock(&self.calls) += 1;
        match &self.result {
            Some(result) => {
                tokio::time::sleep(self.delay).await;
                result.clone()
            }
            None => std::future::pending().await,
        }
    }
}

/// Draft of a `lamports` transfer from a fresh keypair to a random account
pub fn scripted_draft(lamports: u64) -> (DraftMessage, Keypair) {
    let payer = Keypair::new();
    let anchor = RecencyAnchor::new(Hash::new_unique(), 1_000, ConfirmationLevel::Confirmed);
    let draft = MessageBuilder::build(
        vec![transfer_instruction(
            &payer.pubkey(),
            &Pubkey::new_unique(),
            lamports,
        )],
        payer.pubkey(),
        anchor,
    )
    .expect("transfer draft builds");
    (draft, payer)
}
