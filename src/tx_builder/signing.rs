//! Signing of final messages
//!
//! Only [`FinalMessage`] can be signed. All required signers are resolved
//! against the provided key set before any signature is produced, so a
//! missing key surfaces as [`TransferError::MissingSignerKey`] with nothing
//! signed and nothing sent.

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::v0,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::debug;

use crate::tx_builder::builder::FinalMessage;
use crate::tx_builder::errors::TransferError;
use crate::tx_builder::output::SignedTransaction;

/// Accounts that must sign a message built from `instructions`, in header order
///
/// Compute budget instructions carry no accounts, so the result is the same
/// for the draft and the final message.
pub fn required_signers_for(
    fee_payer: &Pubkey,
    instructions: &[Instruction],
) -> Result<Vec<Pubkey>, TransferError> {
    let message = v0::Message::try_compile(fee_payer, instructions, &[], Hash::default())
        .map_err(|e| TransferError::invalid_message(format!("Failed to compile message: {}", e)))?;
    let count = message.header.num_required_signatures as usize;
    Ok(message.account_keys[..count].to_vec())
}

/// Pick one signer per required account
///
/// # Errors
///
/// `MissingSignerKey` for the first required account with no matching signer.
pub fn resolve_signers<'a>(
    required: &[Pubkey],
    signers: &[&'a dyn Signer],
) -> Result<Vec<&'a dyn Signer>, TransferError> {
    required
        .iter()
        .map(|pubkey| {
            signers
                .iter()
                .copied()
                .find(|signer| signer.try_pubkey().ok().as_ref() == Some(pubkey))
                .ok_or(TransferError::MissingSignerKey { pubkey: *pubkey })
        })
        .collect()
}

/// Sign a final message
///
/// Produces exactly one signature per required signer in header order.
/// Signers not referenced by the message are ignored.
pub fn sign(
    message: &FinalMessage,
    signers: &[&dyn Signer],
) -> Result<SignedTransaction, TransferError> {
    let compiled = message.compile()?;
    let required_count = compiled.header().num_required_signatures as usize;
    let required = &compiled.static_account_keys()[..required_count];

    let resolved = resolve_signers(required, signers)?;

    let message_bytes = compiled.serialize();
    let signatures = resolved
        .iter()
        .zip(required)
        .map(|(signer, pubkey)| {
            signer.try_sign_message(&message_bytes).map_err(|e| {
                TransferError::Signing(format!("Signer for {} failed: {}", pubkey, e))
            })
        })
        .collect::<Result<Vec<Signature>, _>>()?;

    let tx = VersionedTransaction {
        signatures,
        message: compiled,
    };

    let signed = SignedTransaction::new(
        tx,
        *message.anchor(),
        message.budget(),
        message.program_ids(),
    );

    debug!(
        signature = %signed.signature(),
        signers = required_count,
        blockhash = %message.anchor().blockhash,
        "Final message signed"
    );

    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::ConfirmationLevel;
    use crate::tx_builder::budget::ComputeBudget;
    use crate::tx_builder::builder::MessageBuilder;
    use crate::tx_builder::context::RecencyAnchor;
    use crate::tx_builder::instructions::transfer_instruction;
    use solana_sdk::signature::Keypair;

    fn final_message(payer: &Pubkey, source: &Pubkey) -> FinalMessage {
        let anchor = RecencyAnchor::new(Hash::new_unique(), 500, ConfirmationLevel::Confirmed);
        let draft = MessageBuilder::build(
            vec![transfer_instruction(source, &Pubkey::new_unique(), 42)],
            *payer,
            anchor,
        )
        .unwrap();
        let budget = ComputeBudget {
            unit_price_micro_lamports: 10,
            unit_limit: 1_000,
        };
        let fresh = RecencyAnchor::new(Hash::new_unique(), 510, ConfirmationLevel::Confirmed);
        MessageBuilder::finalize(&draft, budget, fresh).unwrap()
    }

    #[test]
    fn test_sign_single_signer() {
        let payer = Keypair::new();
        let message = final_message(&payer.pubkey(), &payer.pubkey());

        let signed = sign(&message, &[&payer]).unwrap();

        assert_eq!(signed.signatures().len(), 1);
        assert!(signed.verify());
        assert_eq!(signed.budget().unit_limit, 1_000);
        assert_eq!(signed.anchor().blockhash, message.anchor().blockhash);
    }

    #[test]
    fn test_signing_is_deterministic() {
        let payer = Keypair::new();
        let message = final_message(&payer.pubkey(), &payer.pubkey());

        let a = sign(&message, &[&payer]).unwrap();
        let b = sign(&message, &[&payer]).unwrap();
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn test_missing_signer_key() {
        let payer = Keypair::new();
        let source = Keypair::new();
        let message = final_message(&payer.pubkey(), &source.pubkey());

        let err = sign(&message, &[&payer]).unwrap_err();
        match err {
            TransferError::MissingSignerKey { pubkey } => assert_eq!(pubkey, source.pubkey()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_signatures_follow_header_order_and_extras_ignored() {
        let payer = Keypair::new();
        let source = Keypair::new();
        let unrelated = Keypair::new();
        let message = final_message(&payer.pubkey(), &source.pubkey());

        // Supplied out of order, with an extra key
        let signed = sign(&message, &[&unrelated, &source, &payer]).unwrap();

        assert_eq!(signed.signatures().len(), 2);
        assert!(signed.verify());
        let keys = signed.transaction().message.static_account_keys();
        assert_eq!(keys[0], payer.pubkey());
        assert_eq!(keys[1], source.pubkey());
    }

    #[test]
    fn test_required_signers_for_matches_compiled_message() {
        let payer = Pubkey::new_unique();
        let source = Pubkey::new_unique();
        let ixs = vec![transfer_instruction(&source, &Pubkey::new_unique(), 1)];
        assert_eq!(
            required_signers_for(&payer, &ixs).unwrap(),
            vec![payer, source]
        );
    }
}
