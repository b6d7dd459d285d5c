//! Signing wallet for agent clients
//!
//! A wallet holds a secp256k1 private key and produces EIP-3009
//! authorizations signed under the stablecoin's EIP-712 domain. Keys are
//! expected to come from secure storage; nothing here persists them.

use ethereum_types::Address;

use crate::crypto::{eip712, signature};
use crate::types::{Network, SignedAuthorization, TransferAuthorization};
use crate::{Result, X402Error};

/// Authorization validity window used when the caller does not set one
pub const DEFAULT_VALIDITY_SECS: u64 = 3600;

/// Wallet holding a private key for payment authorization signing
#[derive(Clone)]
pub struct Wallet {
    private_key: String,
    address: Address,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &signature::format_address(self.address))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Wallet {
    /// Create a wallet from a `0x`-prefixed 32-byte private key
    pub fn new(private_key: impl Into<String>) -> Result<Self> {
        let private_key = private_key.into();
        if !private_key.starts_with("0x") || private_key.len() != 66 {
            return Err(X402Error::signing_failed(
                "private key must be 64 hex characters with 0x prefix",
            ));
        }
        let address = signature::address_from_private_key(&private_key)?;
        Ok(Self {
            private_key,
            address,
        })
    }

    /// Create a wallet from an environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        let private_key = std::env::var(var)
            .map_err(|_| X402Error::config(format!("environment variable {var} not found")))?;
        Self::new(private_key)
    }

    /// Generate a throwaway wallet with a fresh random key
    pub fn ephemeral() -> Result<Self> {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::new(format!("0x{}", hex::encode(bytes)))
    }

    /// The address controlled by this wallet, `0x`-prefixed lowercase hex
    pub fn address(&self) -> String {
        signature::format_address(self.address)
    }

    /// Build and sign an authorization paying `value` smallest units to `to`.
    ///
    /// Defaults: `valid_after = 0`, `valid_before = now + 3600`, fresh nonce.
    pub fn authorize_payment(
        &self,
        to: impl Into<String>,
        value: impl Into<String>,
        network: Network,
        now: u64,
    ) -> Result<SignedAuthorization> {
        let authorization = TransferAuthorization {
            from: self.address(),
            to: to.into(),
            value: value.into(),
            valid_after: 0,
            valid_before: now + DEFAULT_VALIDITY_SECS,
            nonce: signature::generate_nonce(),
        };
        self.sign_authorization(authorization, network)
    }

    /// Sign an already-built authorization under the network's stablecoin domain
    pub fn sign_authorization(
        &self,
        authorization: TransferAuthorization,
        network: Network,
    ) -> Result<SignedAuthorization> {
        let domain = eip712::stablecoin_domain(network)?;
        let digest = eip712::transfer_authorization_hash(&domain, &authorization)?;
        let signature = signature::sign_digest(digest, &self.private_key)?;
        Ok(SignedAuthorization {
            signature,
            authorization,
        })
    }
}
