//! The PII vault: tokenize sensitive values to opaque handles.
//!
//! Plaintext PII never touches the conversation record or logs — only
//! `pii_tok_<uuid>` handles circulate. Values are sealed with
//! AES-256-GCM under a process-derived key and expire by severity.

use std::sync::Arc;
use std::time::Duration;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use rv_domain::{Error, Result};

use crate::kv::KvBackend;

const NAMESPACE: &str = "pii_vault:";
const TAG_LEN: usize = 16;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Severity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How long a tokenized value may live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl PiiSeverity {
    pub fn ttl(&self) -> Duration {
        match self {
            PiiSeverity::Critical => Duration::from_secs(300),
            PiiSeverity::High => Duration::from_secs(7 * 86_400),
            PiiSeverity::Medium => Duration::from_secs(30 * 86_400),
            PiiSeverity::Low => Duration::from_secs(90 * 86_400),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize, Deserialize)]
struct VaultEntry {
    iv: String,
    ciphertext: String,
    tag: String,
    conversation_id: String,
    pii_type: String,
    severity: PiiSeverity,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vault
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PiiVault {
    backend: Arc<dyn KvBackend>,
    cipher: Aes256Gcm,
    /// Serializes index read-modify-write so `purge` is atomic over the
    /// token set of a conversation.
    index_lock: Mutex<()>,
}

impl PiiVault {
    /// Build a vault. The 32-byte AES key is SHA-256 of the configured
    /// key material; when none is configured an ephemeral process key is
    /// derived (tokens die with the process).
    pub fn new(backend: Arc<dyn KvBackend>, key_material: Option<&str>) -> Self {
        let material = match key_material {
            Some(m) => m.to_owned(),
            None => {
                tracing::warn!("PII vault running with an ephemeral process key");
                uuid::Uuid::new_v4().to_string()
            }
        };
        let key_bytes: [u8; 32] = Sha256::digest(material.as_bytes()).into();
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            backend,
            cipher: Aes256Gcm::new(key),
            index_lock: Mutex::new(()),
        }
    }

    fn token_key(token: &str) -> String {
        format!("{NAMESPACE}{token}")
    }

    fn index_key(conversation_id: &str) -> String {
        format!("{NAMESPACE}conv:{conversation_id}")
    }

    /// Encrypt `plaintext` and return the opaque token that now stands
    /// in for it.
    pub async fn tokenize(
        &self,
        conversation_id: &str,
        pii_type: &str,
        severity: PiiSeverity,
        plaintext: &str,
    ) -> Result<String> {
        let token = format!("pii_tok_{}", uuid::Uuid::new_v4());

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Store("PII encryption failed".into()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let entry = VaultEntry {
            iv: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
            tag: hex::encode(tag),
            conversation_id: conversation_id.to_owned(),
            pii_type: pii_type.to_owned(),
            severity,
        };
        let raw = serde_json::to_string(&entry)?;
        self.backend
            .set(&Self::token_key(&token), raw, Some(severity.ttl()))
            .await
            .map_err(|e| Error::Store(format!("vault write: {e}")))?;

        // Index the token under its conversation. The index lives as
        // long as the longest-lived severity class.
        {
            let _guard = self.index_lock.lock().await;
            let index_key = Self::index_key(conversation_id);
            let mut tokens: Vec<String> = match self.backend.get(&index_key).await {
                Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
                _ => Vec::new(),
            };
            tokens.push(token.clone());
            let raw = serde_json::to_string(&tokens)?;
            self.backend
                .set(&index_key, raw, Some(PiiSeverity::Low.ttl()))
                .await
                .map_err(|e| Error::Store(format!("vault index write: {e}")))?;
        }

        Ok(token)
    }

    /// Recover the plaintext for a token. Unknown, expired, and
    /// tampered entries all read as `None`.
    pub async fn detokenize(&self, token: &str) -> Option<String> {
        let raw = self.backend.get(&Self::token_key(token)).await.ok()??;
        let entry: VaultEntry = serde_json::from_str(&raw).ok()?;

        let iv = hex::decode(&entry.iv).ok()?;
        let mut sealed = hex::decode(&entry.ciphertext).ok()?;
        sealed.extend(hex::decode(&entry.tag).ok()?);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Remove every token belonging to a conversation. Returns how many
    /// were purged.
    pub async fn purge(&self, conversation_id: &str) -> usize {
        let _guard = self.index_lock.lock().await;
        let index_key = Self::index_key(conversation_id);
        let tokens: Vec<String> = match self.backend.get(&index_key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => Vec::new(),
        };
        let mut purged = 0;
        for token in &tokens {
            if self.backend.del(&Self::token_key(token)).await.is_ok() {
                purged += 1;
            }
        }
        let _ = self.backend.del(&index_key).await;
        purged
    }

    /// Sweep expired entries. A no-op for backends with native TTL; for
    /// the in-memory backend a read is enough to trigger lazy expiry.
    pub async fn purge_expired(&self) {
        if self.backend.native_ttl() {
            return;
        }
        if let Ok(keys) = self.backend.keys(NAMESPACE).await {
            for key in keys {
                let _ = self.backend.get(&key).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    fn vault() -> PiiVault {
        PiiVault::new(Arc::new(InMemoryKv::new(1000)), Some("a-32-byte-minimum-key-material!!"))
    }

    #[tokio::test]
    async fn tokenize_round_trips() {
        let vault = vault();
        let token = vault
            .tokenize("c1", "phone", PiiSeverity::High, "9876543210")
            .await
            .unwrap();
        assert!(token.starts_with("pii_tok_"));
        assert_eq!(vault.detokenize(&token).await.as_deref(), Some("9876543210"));
    }

    #[tokio::test]
    async fn tokens_are_unique_per_call() {
        let vault = vault();
        let a = vault
            .tokenize("c1", "email", PiiSeverity::Medium, "x@y.co")
            .await
            .unwrap();
        let b = vault
            .tokenize("c1", "email", PiiSeverity::Medium, "x@y.co")
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unknown_token_reads_none() {
        let vault = vault();
        assert!(vault.detokenize("pii_tok_nope").await.is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_that_conversation() {
        let vault = vault();
        let mine = vault
            .tokenize("c1", "phone", PiiSeverity::High, "9876543210")
            .await
            .unwrap();
        let mine2 = vault
            .tokenize("c1", "email", PiiSeverity::Medium, "a@b.co")
            .await
            .unwrap();
        let theirs = vault
            .tokenize("c2", "phone", PiiSeverity::High, "9123456780")
            .await
            .unwrap();

        assert_eq!(vault.purge("c1").await, 2);
        assert!(vault.detokenize(&mine).await.is_none());
        assert!(vault.detokenize(&mine2).await.is_none());
        assert_eq!(vault.detokenize(&theirs).await.as_deref(), Some("9123456780"));
    }

    #[tokio::test]
    async fn tampered_ciphertext_reads_none() {
        let backend = Arc::new(InMemoryKv::new(1000));
        let vault = PiiVault::new(backend.clone(), Some("a-32-byte-minimum-key-material!!"));
        let token = vault
            .tokenize("c1", "phone", PiiSeverity::High, "9876543210")
            .await
            .unwrap();

        // Flip the ciphertext in place; tag verification must fail.
        let key = format!("pii_vault:{token}");
        let raw = backend.get(&key).await.unwrap().unwrap();
        let mut entry: serde_json::Value = serde_json::from_str(&raw).unwrap();
        entry["ciphertext"] = serde_json::Value::String("00".repeat(10));
        backend
            .set(&key, entry.to_string(), None)
            .await
            .unwrap();

        assert!(vault.detokenize(&token).await.is_none());
    }
}
