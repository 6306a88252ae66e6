// Kilo Engine — Credential Vault
// AES-256-GCM encryption for small credential blobs (tool auth secrets).
// Wire format: {iv, authTag, ciphertext}, all lowercase hex; 12-byte IV,
// 16-byte tag. The master key arrives as 64 hex chars (32 bytes) in the
// KILO_CREDENTIAL_KEY environment variable, parsed once at construction.
//
// Every failure on the decrypt path — bad hex, short IV, tag mismatch —
// surfaces as the same coarse `credential` error. Plaintext and key
// material never appear in logs or error messages.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use zeroize::Zeroizing;

use crate::atoms::constants::CREDENTIAL_KEY_ENV;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::EncryptedBlob;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_HEX_LEN: usize = 64;

pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Build a vault from a 64-hex-char master key.
    pub fn from_hex_key(hex_key: &str) -> EngineResult<Self> {
        if hex_key.len() != KEY_HEX_LEN {
            return Err(EngineError::Credential(format!(
                "master key must be {} hex chars",
                KEY_HEX_LEN
            )));
        }
        let key = Zeroizing::new(
            decode_hex(hex_key)
                .ok_or_else(|| EngineError::Credential("master key is not valid hex".into()))?,
        );
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| EngineError::Credential("master key must be 32 bytes".into()))?;
        Ok(Self { cipher })
    }

    /// Build a vault from the KILO_CREDENTIAL_KEY environment variable.
    pub fn from_env() -> EngineResult<Self> {
        let hex_key = Zeroizing::new(std::env::var(CREDENTIAL_KEY_ENV).map_err(|_| {
            EngineError::Config(format!("{} is not set", CREDENTIAL_KEY_ENV))
        })?);
        Self::from_hex_key(&hex_key)
    }

    /// Encrypt a plaintext credential with a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> EngineResult<EncryptedBlob> {
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut iv)
            .map_err(|_| EngineError::Credential("random IV generation failed".into()))?;
        let nonce = Nonce::from_slice(&iv);

        // aes-gcm appends the 16-byte tag to the ciphertext; split it so
        // the wire format carries the tag separately.
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EngineError::Credential("encryption failed".into()))?;
        let split = sealed.len() - TAG_LEN;

        Ok(EncryptedBlob {
            iv: encode_hex(&iv),
            auth_tag: encode_hex(&sealed[split..]),
            ciphertext: encode_hex(&sealed[..split]),
        })
    }

    /// Decrypt a stored blob. Any mutation of iv, tag, or ciphertext
    /// fails with a `credential` error.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> EngineResult<String> {
        let iv = decode_hex(&blob.iv).filter(|b| b.len() == IV_LEN);
        let tag = decode_hex(&blob.auth_tag).filter(|b| b.len() == TAG_LEN);
        let body = decode_hex(&blob.ciphertext);
        let (iv, tag, body) = match (iv, tag, body) {
            (Some(iv), Some(tag), Some(body)) => (iv, tag, body),
            _ => return Err(decrypt_error()),
        };

        let mut sealed = body;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| decrypt_error())?;
        String::from_utf8(plaintext).map_err(|_| decrypt_error())
    }
}

fn decrypt_error() -> EngineError {
    EngineError::Credential("decryption failed".into())
}

// ── Hex helpers ─────────────────────────────────────────────────────────

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────
