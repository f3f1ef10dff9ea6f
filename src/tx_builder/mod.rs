//! Transaction construction for the transfer pipeline
//!
//! ## Architecture
//!
//! The builder is split into focused modules:
//! - **errors**: fail-fast error taxonomy of the pre-submission stages
//! - **context**: recency anchors and the provider that fetches them
//! - **instructions**: instruction factory and ordering validation
//! - **budget**: compute budget derivation from the two estimates
//! - **builder**: typestate draft/final messages
//! - **simulate**: compute estimation through simulation
//! - **signing**: signer resolution and signing of final messages
//! - **output**: the immutable signed transaction
//!
//! ## Two-pass construction
//!
//! A draft message exists only to be estimated. The final message is
//! derived from it with the compute budget instructions placed first and a
//! freshly fetched anchor. The draft is never signed:
//!
//! ```rust,no_run
//! use priority_transfer::tx_builder::{ComputeBudget, MessageBuilder, RecencyAnchor};
//! use priority_transfer::tx_builder::instructions::transfer_instruction;
//! # fn example(payer: solana_sdk::pubkey::Pubkey, to: solana_sdk::pubkey::Pubkey,
//! #            draft_anchor: RecencyAnchor, final_anchor: RecencyAnchor)
//! #     -> Result<(), priority_transfer::tx_builder::TransferError> {
//! let draft = MessageBuilder::build(
//!     vec![transfer_instruction(&payer, &to, 1_000)],
//!     payer,
//!     draft_anchor,
//! )?;
//! let budget = ComputeBudget::from_estimates(5_000, 150);
//! let finalized = MessageBuilder::finalize(&draft, budget, final_anchor)?;
//! # let _ = finalized;
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod builder;
pub mod context;
pub mod errors;
pub mod instructions;
pub mod output;
pub mod signing;
pub mod simulate;

pub use budget::{derive_compute_unit_limit, ComputeBudget, MIN_COMPUTE_UNIT_LIMIT};
pub use builder::{
    Draft, DraftMessage, Final, FinalMessage, MessageBuilder, Stage, TransactionMessage,
};
pub use context::{AnchorProvider, RecencyAnchor};
pub use errors::TransferError;
pub use instructions::{sanity_check_ix_order, BudgetDirective};
pub use output::SignedTransaction;
pub use signing::sign;
pub use simulate::{ComputeEstimate, ComputeEstimator};
