//! Two-stage message construction
//!
//! [`MessageBuilder::build`] produces a [`DraftMessage`]: the caller's
//! primary instructions bound to a fee payer and an anchor, used only for
//! estimation. [`MessageBuilder::finalize`] produces a [`FinalMessage`]
//! carrying the derived compute budget and a fresh anchor. Only final
//! messages can be signed; the stage lives in the type.

use std::marker::PhantomData;
use std::sync::Arc;

use solana_sdk::{
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

use crate::tx_builder::budget::ComputeBudget;
use crate::tx_builder::context::RecencyAnchor;
use crate::tx_builder::errors::TransferError;
use crate::tx_builder::instructions::{
    is_compute_budget_instruction, plan_final_instructions, sanity_check_ix_order,
};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Draft {}
    impl Sealed for super::Final {}
}

/// Lifecycle stage of a [`TransactionMessage`]
pub trait Stage: sealed::Sealed + Send + Sync + 'static {}

/// Estimation-only stage; never signed
#[derive(Debug, Clone, Copy)]
pub struct Draft;

/// Budgeted, freshly anchored stage accepted by the signer
#[derive(Debug, Clone, Copy)]
pub struct Final;

impl Stage for Draft {}
impl Stage for Final {}

/// Ordered instructions, fee payer and anchor
///
/// Instructions are held in an `Arc<[Instruction]>`: re-anchoring shares
/// them, it never copies or mutates them.
#[derive(Debug)]
pub struct TransactionMessage<S: Stage> {
    fee_payer: Pubkey,
    instructions: Arc<[Instruction]>,
    primary_start: usize,
    anchor: RecencyAnchor,
    budget: Option<ComputeBudget>,
    _stage: PhantomData<S>,
}

pub type DraftMessage = TransactionMessage<Draft>;
pub type FinalMessage = TransactionMessage<Final>;

impl<S: Stage> Clone for TransactionMessage<S> {
    fn clone(&self) -> Self {
        Self {
            fee_payer: self.fee_payer,
            instructions: Arc::clone(&self.instructions),
            primary_start: self.primary_start,
            anchor: self.anchor,
            budget: self.budget,
            _stage: PhantomData,
        }
    }
}

impl<S: Stage> TransactionMessage<S> {
    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    pub fn anchor(&self) -> &RecencyAnchor {
        &self.anchor
    }

    /// All instructions in message order
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The caller's instructions, without budget instructions
    pub fn primary_instructions(&self) -> &[Instruction] {
        &self.instructions[self.primary_start..]
    }

    /// Program id per compiled instruction index
    pub fn program_ids(&self) -> Vec<Pubkey> {
        self.instructions.iter().map(|ix| ix.program_id).collect()
    }

    /// Same instructions bound to another anchor; `self` is untouched
    pub fn with_anchor(&self, anchor: RecencyAnchor) -> Self {
        Self {
            anchor,
            ..self.clone()
        }
    }

    /// Whether both messages share the same instruction allocation
    pub fn shares_instructions_with<T: Stage>(&self, other: &TransactionMessage<T>) -> bool {
        Arc::ptr_eq(&self.instructions, &other.instructions)
    }

    /// Compile to a v0 message
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if compilation fails or the fee payer does
    /// not end up as the first required signer.
    pub fn compile(&self) -> Result<VersionedMessage, TransferError> {
        let compiled = v0::Message::try_compile(
            &self.fee_payer,
            &self.instructions,
            &[],
            self.anchor.blockhash,
        )
        .map_err(|e| TransferError::invalid_message(format!("Failed to compile message: {}", e)))?;

        if compiled.header.num_required_signatures == 0
            || compiled.account_keys.first() != Some(&self.fee_payer)
        {
            return Err(TransferError::invalid_message(format!(
                "Fee payer {} is not the first required signer",
                self.fee_payer
            )));
        }

        Ok(VersionedMessage::V0(compiled))
    }

    /// Accounts that must sign the compiled message, in header order
    pub fn required_signers(&self) -> Result<Vec<Pubkey>, TransferError> {
        let message = self.compile()?;
        let count = message.header().num_required_signatures as usize;
        Ok(message.static_account_keys()[..count].to_vec())
    }
}

impl DraftMessage {
    /// Placeholder-signed transaction for simulation and fee estimation
    pub fn to_unsigned_transaction(&self) -> Result<VersionedTransaction, TransferError> {
        let message = self.compile()?;
        let signatures =
            vec![Signature::default(); message.header().num_required_signatures as usize];
        Ok(VersionedTransaction {
            signatures,
            message,
        })
    }

    /// Wire bytes of the unsigned transaction
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, TransferError> {
        let tx = self.to_unsigned_transaction()?;
        bincode::serialize(&tx)
            .map_err(|e| TransferError::invalid_message(format!("Failed to serialize draft: {}", e)))
    }
}

impl FinalMessage {
    pub fn budget(&self) -> ComputeBudget {
        // Final messages are only created through `finalize`, which always
        // sets a budget.
        self.budget.unwrap_or(ComputeBudget {
            unit_price_micro_lamports: 0,
            unit_limit: 0,
        })
    }
}

/// Builds draft and final messages
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageBuilder;

impl MessageBuilder {
    /// Bind primary instructions to a fee payer and anchor
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` when `instructions` is empty, already contains a
    ///   compute budget instruction, or does not compile with `fee_payer`
    ///   as the first signer
    pub fn build(
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        anchor: RecencyAnchor,
    ) -> Result<DraftMessage, TransferError> {
        if instructions.is_empty() {
            return Err(TransferError::invalid_message(
                "A message needs at least one instruction",
            ));
        }
        if let Some(idx) = instructions.iter().position(is_compute_budget_instruction) {
            return Err(TransferError::invalid_message(format!(
                "Draft instructions must not contain compute budget instructions (position {})",
                idx
            )));
        }

        let draft = TransactionMessage {
            fee_payer,
            instructions: Arc::from(instructions),
            primary_start: 0,
            anchor,
            budget: None,
            _stage: PhantomData,
        };
        // Surface compile errors here rather than at estimation time
        draft.compile()?;
        Ok(draft)
    }

    /// Derive the final message from a draft
    ///
    /// Budget instructions go first (price, then limit), followed by the
    /// draft's instructions in their original order.
    pub fn finalize(
        draft: &DraftMessage,
        budget: ComputeBudget,
        anchor: RecencyAnchor,
    ) -> Result<FinalMessage, TransferError> {
        let plan = plan_final_instructions(&budget, draft.primary_instructions())?;
        sanity_check_ix_order(&plan.instructions)?;

        let finalized = TransactionMessage {
            fee_payer: draft.fee_payer,
            instructions: Arc::from(plan.instructions),
            primary_start: plan.primary_start,
            anchor,
            budget: Some(budget),
            _stage: PhantomData,
        };
        finalized.compile()?;
        Ok(finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::ConfirmationLevel;
    use crate::tx_builder::instructions::{
        compute_unit_limit_instruction, decode_budget_directive, sanity_check_ix_order,
        transfer_instruction, BudgetDirective,
    };
    use proptest::prelude::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::instruction::AccountMeta;

    const PAYER: Pubkey = Pubkey::new_from_array([7; 32]);

    fn anchor() -> RecencyAnchor {
        RecencyAnchor::new(Hash::new_unique(), 1_000, ConfirmationLevel::Confirmed)
    }

    fn budget() -> ComputeBudget {
        ComputeBudget {
            unit_price_micro_lamports: 5_000,
            unit_limit: 2_200,
        }
    }

    #[test]
    fn test_build_rejects_empty_instructions() {
        let err = MessageBuilder::build(vec![], Pubkey::new_unique(), anchor()).unwrap_err();
        assert!(matches!(err, TransferError::InvalidMessage(_)));
    }

    #[test]
    fn test_build_rejects_budget_instructions_in_draft() {
        let payer = Pubkey::new_unique();
        let err = MessageBuilder::build(
            vec![
                compute_unit_limit_instruction(1_000),
                transfer_instruction(&payer, &Pubkey::new_unique(), 1),
            ],
            payer,
            anchor(),
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::InvalidMessage(_)));
    }

    #[test]
    fn test_fee_payer_is_first_required_signer() {
        let payer = Pubkey::new_unique();
        let source = Pubkey::new_unique();
        let draft = MessageBuilder::build(
            vec![transfer_instruction(&source, &Pubkey::new_unique(), 10)],
            payer,
            anchor(),
        )
        .unwrap();

        let signers = draft.required_signers().unwrap();
        assert_eq!(signers, vec![payer, source]);
    }

    #[test]
    fn test_finalize_preserves_order_and_places_budget_first() {
        let payer = Pubkey::new_unique();
        let a = transfer_instruction(&payer, &Pubkey::new_unique(), 1);
        let b = Instruction {
            program_id: Pubkey::new_unique(),
            accounts: vec![AccountMeta::new_readonly(Pubkey::new_unique(), false)],
            data: vec![7],
        };
        let draft = MessageBuilder::build(vec![a.clone(), b.clone()], payer, anchor()).unwrap();
        let finalized = MessageBuilder::finalize(&draft, budget(), anchor()).unwrap();

        let ixs = finalized.instructions();
        assert_eq!(ixs.len(), 4);
        assert_eq!(
            decode_budget_directive(&ixs[0]),
            Some(BudgetDirective::UnitPrice(5_000))
        );
        assert_eq!(
            decode_budget_directive(&ixs[1]),
            Some(BudgetDirective::UnitLimit(2_200))
        );
        assert_eq!(finalized.primary_instructions(), &[a, b][..]);
        assert_eq!(finalized.budget(), budget());

        // Draft stays budget-free
        assert_eq!(draft.instructions().len(), 2);
        assert!(!draft.shares_instructions_with(&finalized));
    }

    #[test]
    fn test_with_anchor_leaves_original_untouched() {
        let payer = Pubkey::new_unique();
        let first = anchor();
        let second = anchor();
        let draft = MessageBuilder::build(
            vec![transfer_instruction(&payer, &Pubkey::new_unique(), 1)],
            payer,
            first,
        )
        .unwrap();

        let moved = draft.with_anchor(second);

        assert_eq!(draft.anchor().blockhash, first.blockhash);
        assert_eq!(moved.anchor().blockhash, second.blockhash);
        assert!(moved.shares_instructions_with(&draft));
        assert_eq!(moved.instructions(), draft.instructions());
    }

    #[test]
    fn test_unsigned_transaction_has_placeholder_signatures() {
        let payer = Pubkey::new_unique();
        let draft = MessageBuilder::build(
            vec![transfer_instruction(&payer, &Pubkey::new_unique(), 1)],
            payer,
            anchor(),
        )
        .unwrap();

        let tx = draft.to_unsigned_transaction().unwrap();
        assert_eq!(tx.signatures, vec![Signature::default()]);
        assert_eq!(tx.message.recent_blockhash(), &draft.anchor().blockhash);
        assert!(!draft.to_wire_bytes().unwrap().is_empty());
    }

    fn arb_primary_instruction() -> impl Strategy<Value = Instruction> {
        prop_oneof![
            (any::<[u8; 32]>(), any::<u64>()).prop_map(|(to, lamports)| {
                transfer_instruction(&PAYER, &Pubkey::new_from_array(to), lamports)
            }),
            (
                any::<[u8; 32]>(),
                prop::collection::vec(any::<[u8; 32]>(), 0..3),
                prop::collection::vec(any::<u8>(), 0..16),
            )
                .prop_map(|(program, accounts, data)| Instruction {
                    program_id: Pubkey::new_from_array(program),
                    accounts: accounts
                        .into_iter()
                        .map(|key| AccountMeta::new_readonly(Pubkey::new_from_array(key), false))
                        .collect(),
                    data,
                }),
        ]
    }

    proptest! {
        #[test]
        fn prop_finalize_keeps_primary_order_after_budget(
            primary in prop::collection::vec(arb_primary_instruction(), 1..8),
            unit_price in any::<u64>(),
            unit_limit in 1_000u32..1_400_000,
        ) {
            let draft = MessageBuilder::build(primary.clone(), PAYER, anchor()).unwrap();
            let budget = ComputeBudget { unit_price_micro_lamports: unit_price, unit_limit };
            let finalized = MessageBuilder::finalize(&draft, budget, anchor()).unwrap();

            let ixs = finalized.instructions();
            prop_assert_eq!(ixs.len(), primary.len() + 2);
            prop_assert_eq!(
                decode_budget_directive(&ixs[0]),
                Some(BudgetDirective::UnitPrice(unit_price))
            );
            prop_assert_eq!(
                decode_budget_directive(&ixs[1]),
                Some(BudgetDirective::UnitLimit(unit_limit))
            );
            prop_assert_eq!(&ixs[2..], &primary[..]);
            prop_assert_eq!(finalized.primary_instructions(), &primary[..]);
            prop_assert!(sanity_check_ix_order(ixs).is_ok());
            prop_assert_eq!(draft.instructions(), &primary[..]);
        }
    }
}
