//! Fee-aware, compute-budgeted transfer pipeline
//!
//! One run:
//! 1. check that every required signer has a key
//! 2. fetch the draft anchor and build the draft
//! 3. estimate priority fee and compute units concurrently
//! 4. fetch a fresh anchor and finalize the message
//! 5. sign
//! 6. submit and wait for the requested commitment
//!
//! Steps 1 to 5 fail fast with a [`TransferError`]; nothing is broadcast
//! unless all of them succeed. Step 6 always yields a
//! [`SubmissionOutcome`]. The pipeline never restarts itself.

use std::sync::Arc;
use std::time::Instant;

use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signer};

use crate::fee_estimator::FeeEstimator;
use crate::observability::{CorrelationId, TransferLogger};
use crate::rpc_manager::{ConfirmationLevel, NodeClient};
use crate::submit::{SubmissionEngine, SubmissionOutcome, SubmitPolicy};
use crate::tx_builder::instructions::transfer_instruction;
use crate::tx_builder::signing::{required_signers_for, resolve_signers, sign};
use crate::tx_builder::{
    AnchorProvider, ComputeBudget, ComputeEstimator, MessageBuilder, RecencyAnchor, TransferError,
};

/// Everything a caller needs to know about one run
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub outcome: SubmissionOutcome,
    pub budget: ComputeBudget,
    /// Units the draft consumed in simulation
    pub units_consumed: u64,
    /// Anchor of the draft, used only for estimation
    pub draft_anchor: RecencyAnchor,
    /// Anchor the signed transaction is bound to
    pub final_anchor: RecencyAnchor,
    pub correlation_id: CorrelationId,
}

/// Wires estimators, anchor provider and submission engine together
#[derive(Clone)]
pub struct TransferPipeline {
    anchors: AnchorProvider,
    fees: Arc<dyn FeeEstimator>,
    compute: ComputeEstimator,
    engine: SubmissionEngine,
    anchor_level: ConfirmationLevel,
}

impl std::fmt::Debug for TransferPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferPipeline")
            .field("anchors", &self.anchors)
            .field("compute", &self.compute)
            .field("engine", &self.engine)
            .field("anchor_level", &self.anchor_level)
            .finish()
    }
}

impl TransferPipeline {
    /// Pipeline over one node with polling confirmation
    pub fn new(node: Arc<dyn NodeClient>, fees: Arc<dyn FeeEstimator>) -> Self {
        let anchor_level = ConfirmationLevel::Confirmed;
        Self {
            anchors: AnchorProvider::new(Arc::clone(&node)),
            fees,
            // Simulate against the same view of the ledger the anchors come from
            compute: ComputeEstimator::new(Arc::clone(&node)).with_level(anchor_level),
            engine: SubmissionEngine::new(node),
            anchor_level,
        }
    }

    /// Replace the submission engine (subscriber, backoff, classifier)
    pub fn with_engine(mut self, engine: SubmissionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Transfer `lamports` from `source` to `destination`; `source` pays the fee
    pub async fn transfer(
        &self,
        source: &dyn Signer,
        destination: &Pubkey,
        lamports: u64,
        policy: &SubmitPolicy,
    ) -> Result<TransferReport, TransferError> {
        let from = source
            .try_pubkey()
            .map_err(|e| TransferError::Signing(format!("Source signer has no pubkey: {}", e)))?;
        let instruction = transfer_instruction(&from, destination, lamports);
        self.execute(vec![instruction], from, &[source], policy)
            .await
    }

    /// Run the pipeline for arbitrary primary instructions
    pub async fn execute(
        &self,
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        signers: &[&dyn Signer],
        policy: &SubmitPolicy,
    ) -> Result<TransferReport, TransferError> {
        let logger = TransferLogger::new(CorrelationId::new());
        let started = Instant::now();

        let result = self
            .run(instructions, fee_payer, signers, policy, &logger, started)
            .await;
        if let Err(err) = &result {
            logger.log_aborted(err);
        }
        result
    }

    async fn run(
        &self,
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        signers: &[&dyn Signer],
        policy: &SubmitPolicy,
        logger: &TransferLogger,
        started: Instant,
    ) -> Result<TransferReport, TransferError> {
        // Key coverage is checked before any network call
        let required = required_signers_for(&fee_payer, &instructions)?;
        resolve_signers(&required, signers)?;

        let draft_anchor = self.anchors.fetch(self.anchor_level).await?;
        let draft = MessageBuilder::build(instructions, fee_payer, draft_anchor)?;
        logger.log_draft_built(
            &fee_payer.to_string(),
            draft.instructions().len(),
            &draft_anchor,
        );

        let (unit_price, compute) =
            tokio::try_join!(self.fees.estimate(&draft), self.compute.estimate(&draft))?;
        let budget = ComputeBudget::from_estimates(unit_price, compute.units_consumed);
        logger.log_estimates(&budget, compute.units_consumed);

        let final_anchor = self.anchors.fetch(self.anchor_level).await?;
        let finalized = MessageBuilder::finalize(&draft, budget, final_anchor)?;
        let signed = sign(&finalized, signers)?;
        logger.log_final_signed(&signed.signature().to_string(), &final_anchor);

        let outcome = self.engine.submit(&signed, policy).await;
        logger.log_outcome(&outcome, started.elapsed().as_millis() as u64);

        Ok(TransferReport {
            outcome,
            budget,
            units_consumed: compute.units_consumed,
            draft_anchor,
            final_anchor,
            correlation_id: logger.correlation_id().clone(),
        })
    }
}
