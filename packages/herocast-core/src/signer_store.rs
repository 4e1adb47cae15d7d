//! Approved signer persistence (AES-256-GCM) so a restart skips the handshake.

use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::signer::SignerCredential;
use crate::Error;

/// Signer store: encrypted (AES-256-GCM) for production, plaintext for dev.
pub struct SignerStore {
    path: PathBuf,
    encryption_key: Option<[u8; 32]>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredSigners {
    signers: Vec<StoredSigner>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct StoredSigner {
    fid: u64,
    public_key: String,
    secret_key: String,
}

impl SignerStore {
    pub fn new_plaintext(path: PathBuf) -> Self {
        Self {
            path,
            encryption_key: None,
        }
    }

    pub fn new_encrypted(path: PathBuf, key_b64: &str) -> Result<Self, Error> {
        let key_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, key_b64)
            .map_err(|e| Error::Config(format!("Invalid encryption key base64: {e}")))?;

        let key: [u8; 32] = key_bytes.try_into().map_err(|b: Vec<u8>| {
            Error::Config(format!("Encryption key must be 32 bytes, got {}", b.len()))
        })?;

        Ok(Self {
            path,
            encryption_key: Some(key),
        })
    }

    /// Encrypted when `signer_store_key` is set, plaintext otherwise.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let path = PathBuf::from(&config.signer_store_path);
        match config.signer_store_key.as_deref() {
            Some(key) => Self::new_encrypted(path, key),
            None => Ok(Self::new_plaintext(path)),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }

    pub fn save(&self, signers: &[SignerCredential]) -> Result<(), Error> {
        let stored = StoredSigners {
            signers: signers
                .iter()
                .map(|s| StoredSigner {
                    fid: s.fid(),
                    public_key: s.public_key_hex(),
                    secret_key: s.secret_hex(),
                })
                .collect(),
        };

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| Error::Store(format!("Failed to serialize signers: {e}")))?;

        let data = match &self.encryption_key {
            Some(key) => encrypt_aes256gcm(key, json.as_bytes())?,
            None => json.into_bytes(),
        };

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = tmp.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("Failed to create signer store directory: {e}")))?;
        }
        std::fs::write(&tmp, &data)
            .map_err(|e| Error::Store(format!("Failed to write signer store: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Store(format!("Failed to rename signer store: {e}")))?;

        info!(path = %self.path.display(), count = signers.len(), "Signer store saved");
        Ok(())
    }

    /// Empty when the file does not exist yet.
    pub fn load(&self) -> Result<Vec<SignerCredential>, Error> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No signer store found, starting fresh");
            return Ok(vec![]);
        }

        let data = std::fs::read(&self.path)
            .map_err(|e| Error::Store(format!("Failed to read signer store: {e}")))?;

        let json_bytes = match &self.encryption_key {
            Some(key) => decrypt_aes256gcm(key, &data)?,
            None => data,
        };

        let stored: StoredSigners = serde_json::from_slice(&json_bytes)
            .map_err(|e| Error::Store(format!("Failed to parse signer store: {e}")))?;

        let signers = stored
            .signers
            .into_iter()
            .map(|s| {
                let cred = SignerCredential::from_secret_hex(s.fid, &s.secret_key)?;
                if !cred.public_key_hex().eq_ignore_ascii_case(&s.public_key) {
                    return Err(Error::Store(format!(
                        "Stored public key {} does not match its secret (fid {})",
                        s.public_key, s.fid
                    )));
                }
                Ok(cred)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(path = %self.path.display(), count = signers.len(), "Signer store loaded");
        Ok(signers)
    }
}

fn encrypt_aes256gcm(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};
    use rand::RngCore;

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Store(format!("AES init failed: {e}")))?;

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Store(format!("Encryption failed: {e}")))?;

    // nonce || ciphertext
    let mut result = Vec::with_capacity(12 + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

fn decrypt_aes256gcm(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, Error> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};

    if data.len() < 12 {
        return Err(Error::Store("Encrypted data too short (missing nonce)".into()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Store(format!("AES init failed: {e}")))?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| Error::Store(format!("Decryption failed (wrong key?): {e}")))
}
