//! Wallet management module
//!
//! Loads the source keypair from a file or a base-58 secret. Key material
//! only ever lives inside the `Keypair`; intermediate buffers are zeroized.

use std::sync::Arc;

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use zeroize::Zeroizing;

/// Holds the source keypair used to sign transfers
#[derive(Clone)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file
    ///
    /// Accepts the CLI's JSON array format or raw 64 bytes.
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("Failed to read keypair file: {}", path))?,
        );

        let keypair = if keypair_bytes.len() == 64 {
            keypair_from_bytes(&keypair_bytes).context("Invalid keypair bytes")?
        } else {
            let json: Zeroizing<Vec<u8>> = Zeroizing::new(
                serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?,
            );
            keypair_from_bytes(&json).context("Invalid keypair from JSON")?
        };

        Ok(Self::from_keypair(keypair))
    }

    /// Create a wallet manager from a base-58 encoded 64-byte secret key
    pub fn from_base58_secret(secret: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(secret.trim())
                .into_vec()
                .context("Secret key is not valid base-58")?,
        );
        let keypair = keypair_from_bytes(&bytes).context("Invalid base-58 secret key")?;
        Ok(Self::from_keypair(keypair))
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Signer view for the pipeline
    pub fn signer(&self) -> &dyn Signer {
        &*self.keypair
    }
}

fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair> {
    if bytes.len() != 64 {
        anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Keypair::try_from(bytes).map_err(|e| anyhow::anyhow!("{}", e))
}
