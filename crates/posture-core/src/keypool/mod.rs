//! Credential pool: encrypted storage, LRU-ish round-robin selection with
//! cooldown and auto-quarantine, per-key rate capping, and the masked
//! admin surface.
//!
//! There is no "in use" state: acquisition is instantaneous and accounting
//! is post-hoc, so an abandoned pipeline never wedges a key.

pub mod crypto;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::errors::CallError;
use crate::providers::llm::{ChatClient, ChatRequest};
use crate::storage::{rows::CredentialRow, Store};
use crypto::{mask_key, SecretCipher};

/// A selected credential: id for accounting, plaintext for the one call.
/// The plaintext never goes to logs or back to callers of the admin
/// surface.
#[derive(Debug)]
pub struct AcquiredKey {
    pub id: String,
    pub plaintext: String,
}

/// Masked credential view for administrators.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialInfo {
    pub id: String,
    pub label: String,
    pub masked_key: String,
    pub active: bool,
    pub usage_count: i64,
    pub last_used_at: Option<String>,
    pub cooldown_until: Option<String>,
    pub error_count: i64,
    pub created_at: String,
    pub created_by: String,
}

pub struct KeyPool {
    store: Store,
    cipher: SecretCipher,
    per_key_rps: u32,
    windows: tokio::sync::Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl KeyPool {
    pub fn new(store: Store, cipher: SecretCipher, per_key_rps: u32) -> Self {
        Self {
            store,
            cipher,
            per_key_rps: per_key_rps.max(1),
            windows: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, label: &str, secret: &str, actor: &str) -> anyhow::Result<CredentialInfo> {
        let id = Uuid::new_v4().to_string();
        let encrypted = self.cipher.encrypt(secret)?;
        self.store.insert_credential(&id, label, &encrypted, actor)?;
        tracing::info!(key_id = %id, label, "added credential");

        let row = self
            .store
            .get_credential(&id)?
            .ok_or_else(|| anyhow::anyhow!("credential vanished after insert"))?;
        self.info(row)
    }

    pub fn list(&self, include_inactive: bool) -> anyhow::Result<Vec<CredentialInfo>> {
        self.store
            .list_credentials(include_inactive)?
            .into_iter()
            .map(|row| self.info(row))
            .collect()
    }

    pub fn toggle(&self, id: &str, active: bool) -> anyhow::Result<bool> {
        let changed = self.store.toggle_credential(id, active)?;
        if changed {
            tracing::info!(key_id = %id, active, "toggled credential");
        }
        Ok(changed)
    }

    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let deleted = self.store.delete_credential(id)?;
        if deleted {
            tracing::info!(key_id = %id, "deleted credential");
        }
        Ok(deleted)
    }

    /// Select the next eligible key, deferring while its one-second
    /// request window is full. Fails with `NoCredentialAvailable` when no
    /// active, non-cooling key exists.
    pub async fn acquire(&self) -> Result<AcquiredKey, CallError> {
        let now = crate::storage::format_ts(chrono::Utc::now());
        let row = self
            .store
            .acquire_credential(&now)
            .map_err(|e| CallError::Other(e.to_string()))?
            .ok_or(CallError::NoCredentialAvailable)?;

        self.wait_for_window(&row.id).await;

        let plaintext = self
            .cipher
            .decrypt(&row.encrypted_key)
            .map_err(|e| CallError::Other(format!("credential decrypt failed: {e}")))?;

        tracing::debug!(key_id = %row.id, usage = row.usage_count, "acquired credential");
        Ok(AcquiredKey {
            id: row.id,
            plaintext,
        })
    }

    async fn wait_for_window(&self, key_id: &str) {
        loop {
            let sleep_for = {
                let mut windows = self.windows.lock().await;
                let window = windows.entry(key_id.to_string()).or_default();
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(1))
                {
                    window.pop_front();
                }
                if (window.len() as u32) < self.per_key_rps {
                    window.push_back(now);
                    return;
                }
                let oldest = *window.front().expect("window is non-empty");
                Duration::from_secs(1).saturating_sub(now.duration_since(oldest))
            };
            tokio::time::sleep(sleep_for.max(Duration::from_millis(1))).await;
        }
    }

    pub fn record_success(&self, id: &str) {
        if let Err(e) = self.store.record_credential_success(id) {
            tracing::warn!(key_id = %id, error = %e, "failed to record credential success");
        }
    }

    pub fn record_failure(&self, id: &str, error: &CallError) {
        let is_rate_limit = error.is_rate_limit();
        match self
            .store
            .record_credential_failure(id, is_rate_limit, chrono::Utc::now())
        {
            Ok((count, Some(until))) => {
                tracing::warn!(key_id = %id, error_count = count, cooldown_until = %until,
                    "rate limit hit, key cooling down");
            }
            Ok((count, None)) if count >= 5 => {
                tracing::error!(key_id = %id, error_count = count,
                    "key deactivated after consecutive errors");
            }
            Ok((count, None)) => {
                tracing::warn!(key_id = %id, error_count = count, kind = error.kind().as_str(),
                    "recorded credential failure");
            }
            Err(e) => {
                tracing::warn!(key_id = %id, error = %e, "failed to record credential failure");
            }
        }
    }

    /// Live validity probe with a throwaway five-token completion.
    pub async fn test_secret(
        &self,
        client: &dyn ChatClient,
        model: &str,
        secret: &str,
    ) -> (bool, String) {
        let req = ChatRequest {
            model: model.to_string(),
            prompt: "test".to_string(),
            max_tokens: 5,
            temperature: 0.0,
        };
        match client.complete(secret, &req).await {
            Ok(_) => (true, "API key is valid".to_string()),
            Err(e) => match e.kind() {
                crate::errors::CallErrorKind::Auth => {
                    (false, "API key is invalid or unauthorized".to_string())
                }
                crate::errors::CallErrorKind::RateLimit => {
                    (false, "API key is valid but rate limited".to_string())
                }
                _ => (false, format!("API key test failed: {e}")),
            },
        }
    }

    /// Does the encryption key load and round-trip? Exposed for the admin
    /// diagnostics surface.
    pub fn diagnostics(&self) -> anyhow::Result<()> {
        let probe = self.cipher.encrypt("probe")?;
        anyhow::ensure!(self.cipher.decrypt(&probe)? == "probe", "cipher round-trip failed");
        Ok(())
    }

    fn info(&self, row: CredentialRow) -> anyhow::Result<CredentialInfo> {
        let plaintext = self.cipher.decrypt(&row.encrypted_key)?;
        Ok(CredentialInfo {
            id: row.id,
            label: row.label,
            masked_key: mask_key(&plaintext),
            active: row.active,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            cooldown_until: row.cooldown_until,
            error_count: row.error_count,
            created_at: row.created_at,
            created_by: row.created_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_store;

    fn pool() -> KeyPool {
        let cipher = SecretCipher::from_key_bytes(&[3u8; 32]).unwrap();
        KeyPool::new(test_store(), cipher, 100)
    }

    #[tokio::test]
    async fn acquire_returns_plaintext_and_rotates_fairly() {
        let p = pool();
        p.add("alpha", "sk-alpha-key-0001", "admin").unwrap();
        p.add("beta", "sk-beta-key-00002", "admin").unwrap();

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..6 {
            let k = p.acquire().await.unwrap();
            assert!(k.plaintext.starts_with("sk-"));
            *counts.entry(k.id).or_default() += 1;
        }
        // K credentials, M acquires, no failures: each selected M/K times.
        assert!(counts.values().all(|&c| c == 3), "counts: {counts:?}");
    }

    #[tokio::test]
    async fn empty_pool_surfaces_no_credential() {
        let p = pool();
        let err = p.acquire().await.unwrap_err();
        assert!(matches!(err, CallError::NoCredentialAvailable));
    }

    #[tokio::test]
    async fn listing_masks_secrets() {
        let p = pool();
        p.add("alpha", "sk-secret-abcd-9876", "admin").unwrap();
        let listed = p.list(true).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].masked_key, "sk-...9876");
        assert!(!serde_json::to_string(&listed).unwrap().contains("secret-abcd"));
    }

    #[tokio::test]
    async fn rate_limited_key_is_skipped_until_cooldown_elapses() {
        let p = pool();
        let a = p.add("alpha", "sk-alpha-key-0001", "admin").unwrap();
        p.add("beta", "sk-beta-key-00002", "admin").unwrap();

        let rate_limited = CallError::from_status(429, "slow down");
        p.record_failure(&a.id, &rate_limited);
        p.record_failure(&a.id, &rate_limited);

        for _ in 0..4 {
            let k = p.acquire().await.unwrap();
            assert_ne!(k.id, a.id, "cooling key must not be selected");
        }

        let listed = p.list(true).unwrap();
        let row = listed.iter().find(|c| c.id == a.id).unwrap();
        assert!(row.cooldown_until.is_some());
        assert!(row.active, "rate limits cool down, they do not deactivate");
    }

    #[tokio::test]
    async fn auth_failures_quarantine_after_threshold() {
        let p = pool();
        let a = p.add("alpha", "sk-alpha-key-0001", "admin").unwrap();
        let auth = CallError::from_status(401, "invalid key");
        for _ in 0..5 {
            p.record_failure(&a.id, &auth);
        }
        let err = p.acquire().await.unwrap_err();
        assert!(matches!(err, CallError::NoCredentialAvailable));
    }

    #[tokio::test]
    async fn success_clears_failure_state() {
        let p = pool();
        let a = p.add("alpha", "sk-alpha-key-0001", "admin").unwrap();
        p.record_failure(&a.id, &CallError::from_status(429, "slow down"));
        p.record_success(&a.id);

        let listed = p.list(true).unwrap();
        assert_eq!(listed[0].error_count, 0);
        assert!(listed[0].cooldown_until.is_none());

        let k = p.acquire().await.unwrap();
        assert_eq!(k.id, a.id);
    }

    #[tokio::test]
    async fn per_key_window_defers_acquisition() {
        let cipher = SecretCipher::from_key_bytes(&[3u8; 32]).unwrap();
        let p = KeyPool::new(test_store(), cipher, 2);
        p.add("alpha", "sk-alpha-key-0001", "admin").unwrap();

        let started = Instant::now();
        for _ in 0..3 {
            p.acquire().await.unwrap();
        }
        // Third acquire of the same key must wait out the 1s window.
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn diagnostics_checks_cipher_round_trip() {
        let p = pool();
        p.diagnostics().unwrap();
    }
}
