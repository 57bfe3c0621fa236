//! Symmetric authenticated encryption for credentials at rest.
//!
//! Envelope: base64(nonce || ciphertext) with a random 96-bit nonce per
//! secret. Key material is 32 bytes, base64-encoded wherever it is
//! configured.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::config::OrchestratorConfig;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher")
    }
}

impl SecretCipher {
    pub fn from_key_bytes(key: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(key.len() == KEY_LEN, "encryption key must be {KEY_LEN} bytes");
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| anyhow::anyhow!("invalid encryption key"))?;
        Ok(Self { cipher })
    }

    pub fn from_key_b64(key_b64: &str) -> anyhow::Result<Self> {
        let bytes = BASE64.decode(key_b64.trim())?;
        Self::from_key_bytes(&bytes)
    }

    /// Resolve key material in order: config setting, environment
    /// variable, key file. Absence is fatal for the orchestrator.
    pub fn load(config: &OrchestratorConfig) -> anyhow::Result<Self> {
        if let Some(key) = &config.encryption_key {
            return Self::from_key_b64(key);
        }
        if let Ok(key) = std::env::var("POSTURE_KEYS_ENCRYPTION_KEY") {
            if !key.trim().is_empty() {
                return Self::from_key_b64(&key);
            }
        }
        if let Some(path) = &config.encryption_key_file {
            let key = std::fs::read_to_string(path)?;
            return Self::from_key_b64(&key);
        }
        anyhow::bail!(
            "credential encryption key not configured: set POSTURE_KEYS_ENCRYPTION_KEY \
             (generate one with `posture keys generate-encryption-key`)"
        )
    }

    pub fn generate_key_b64() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("credential encryption failed"))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    pub fn decrypt(&self, token: &str) -> anyhow::Result<String> {
        let envelope = BASE64.decode(token.trim())?;
        anyhow::ensure!(envelope.len() > NONCE_LEN, "ciphertext too short");
        let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow::anyhow!("credential decryption failed"))?;
        Ok(String::from_utf8(plaintext)?)
    }
}

/// Masked display form: only the last four characters survive.
pub fn mask_key(key: &str) -> String {
    if key.len() < 8 {
        return "****".to_string();
    }
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if key.starts_with("sk-") {
        format!("sk-...{tail}")
    } else {
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::from_key_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let c = cipher();
        let token = c.encrypt("sk-live-abcdef123456").unwrap();
        assert_ne!(token, "sk-live-abcdef123456");
        assert_eq!(c.decrypt(&token).unwrap(), "sk-live-abcdef123456");
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let c = cipher();
        let a = c.encrypt("secret").unwrap();
        let b = c.encrypt("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let token = cipher().encrypt("secret").unwrap();
        let other = SecretCipher::from_key_bytes(&[9u8; 32]).unwrap();
        assert!(other.decrypt(&token).is_err());
    }

    #[test]
    fn generated_keys_are_valid() {
        let key = SecretCipher::generate_key_b64();
        SecretCipher::from_key_b64(&key).unwrap();
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(SecretCipher::from_key_bytes(&[1u8; 16]).is_err());
    }

    #[test]
    fn masking_shows_only_tail() {
        assert_eq!(mask_key("sk-abcdefgh1234"), "sk-...1234");
        assert_eq!(mask_key("plain-secret-xyz9"), "...xyz9");
        assert_eq!(mask_key("short"), "****");
    }
}
