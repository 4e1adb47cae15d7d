//! App signer keys approved for a Farcaster account.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::Error;

/// Fresh ed25519 key for a new signed key request.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// `0x`-prefixed lowercase hex, as the Farcaster APIs expect.
pub fn public_key_hex(key: &VerifyingKey) -> String {
    format!("0x{}", hex::encode(key.as_bytes()))
}

/// A signer the user approved, bound to their FID.
#[derive(Clone)]
pub struct SignerCredential {
    fid: u64,
    signing_key: SigningKey,
}

impl SignerCredential {
    pub fn new(fid: u64, signing_key: SigningKey) -> Self {
        Self { fid, signing_key }
    }

    /// Rebuild from stored hex. Accepts an optional `0x` prefix.
    pub(crate) fn from_secret_hex(fid: u64, secret: &str) -> Result<Self, Error> {
        let bytes = hex::decode(secret.trim_start_matches("0x"))
            .map_err(|e| Error::Store(format!("invalid signer secret hex: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Store(format!("signer secret must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(fid, SigningKey::from_bytes(&bytes)))
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_hex(&self) -> String {
        public_key_hex(&self.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub(crate) fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }
}

impl fmt::Debug for SignerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerCredential")
            .field("fid", &self.fid)
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}
