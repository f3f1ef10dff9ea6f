//! Instruction factory and ordering validation
//!
//! Final messages are laid out as:
//! 1. `set_compute_unit_price`
//! 2. `set_compute_unit_limit`
//! 3. primary instructions, in caller order
//!
//! The runtime reads compute-budget instructions wherever they appear, but
//! keeping them first makes the layout checkable and matches how wallets
//! and explorers present priced transactions.

use crate::tx_builder::budget::ComputeBudget;
use crate::tx_builder::errors::TransferError;
use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    instruction::Instruction,
    pubkey::Pubkey,
};

#[allow(deprecated)]
use solana_sdk::system_instruction;

/// Borsh discriminators of the compute budget program
const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;

/// Decoded compute budget instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDirective {
    UnitLimit(u32),
    UnitPrice(u64),
    /// Any other compute budget instruction (heap frame, loaded data size)
    Other,
}

/// Ordered instructions of a final message plus where the primary ones start
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    pub primary_start: usize,
}

/// Native SOL transfer from `from` to `to`
#[allow(deprecated)]
pub fn transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(from, to, lamports)
}

pub fn compute_unit_price_instruction(micro_lamports: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(micro_lamports)
}

pub fn compute_unit_limit_instruction(units: u32) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_limit(units)
}

pub fn is_compute_budget_instruction(ix: &Instruction) -> bool {
    ix.program_id == compute_budget::id()
}

/// Decode a compute budget instruction; `None` for other programs
pub fn decode_budget_directive(ix: &Instruction) -> Option<BudgetDirective> {
    if !is_compute_budget_instruction(ix) {
        return None;
    }

    match ix.data.split_first() {
        Some((&SET_COMPUTE_UNIT_LIMIT_TAG, rest)) if rest.len() == 4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(rest);
            Some(BudgetDirective::UnitLimit(u32::from_le_bytes(bytes)))
        }
        Some((&SET_COMPUTE_UNIT_PRICE_TAG, rest)) if rest.len() == 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(rest);
            Some(BudgetDirective::UnitPrice(u64::from_le_bytes(bytes)))
        }
        _ => Some(BudgetDirective::Other),
    }
}

/// Prepend the budget instructions to the primary instructions
///
/// # Errors
///
/// Returns `InvalidMessage` when `primary` is empty or already carries
/// compute budget instructions.
pub fn plan_final_instructions(
    budget: &ComputeBudget,
    primary: &[Instruction],
) -> Result<InstructionPlan, TransferError> {
    if primary.is_empty() {
        return Err(TransferError::invalid_message(
            "Final message needs at least one primary instruction",
        ));
    }
    if let Some(idx) = primary.iter().position(is_compute_budget_instruction) {
        return Err(TransferError::invalid_message(format!(
            "Primary instructions already contain a compute budget instruction (position {})",
            idx
        )));
    }

    // price + limit + primary
    let mut instructions = Vec::with_capacity(primary.len() + 2);
    instructions.push(compute_unit_price_instruction(
        budget.unit_price_micro_lamports,
    ));
    instructions.push(compute_unit_limit_instruction(budget.unit_limit));
    instructions.extend_from_slice(primary);

    let plan = InstructionPlan {
        instructions,
        primary_start: 2,
    };

    #[cfg(debug_assertions)]
    sanity_check_ix_order(&plan.instructions)?;

    Ok(plan)
}

/// Validate that compute budget instructions lead the message
///
/// Checks:
/// - the list is non-empty
/// - at most one unit price and one unit limit
/// - no compute budget instruction after the first primary instruction
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TransferError> {
    if instructions.is_empty() {
        return Err(TransferError::invalid_order("Instruction list is empty"));
    }

    let mut seen_limit = false;
    let mut seen_price = false;
    let mut first_primary: Option<usize> = None;

    for (idx, ix) in instructions.iter().enumerate() {
        match decode_budget_directive(ix) {
            Some(directive) => {
                if let Some(primary_idx) = first_primary {
                    return Err(TransferError::invalid_order(format!(
                        "Compute budget instruction at position {} follows primary instruction at position {}",
                        idx, primary_idx
                    )));
                }
                match directive {
                    BudgetDirective::UnitLimit(_) if seen_limit => {
                        return Err(TransferError::invalid_order(format!(
                            "Duplicate set_compute_unit_limit at position {}",
                            idx
                        )));
                    }
                    BudgetDirective::UnitPrice(_) if seen_price => {
                        return Err(TransferError::invalid_order(format!(
                            "Duplicate set_compute_unit_price at position {}",
                            idx
                        )));
                    }
                    BudgetDirective::UnitLimit(_) => seen_limit = true,
                    BudgetDirective::UnitPrice(_) => seen_price = true,
                    BudgetDirective::Other => {}
                }
            }
            None => {
                first_primary.get_or_insert(idx);
            }
        }
    }

    if first_primary.is_none() {
        return Err(TransferError::invalid_order(
            "Message has compute budget instructions but no primary instruction",
        ));
    }

    Ok(())
}
