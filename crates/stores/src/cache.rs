//! TTL'd result cache with hit/miss accounting.
//!
//! The cache must never fail its caller: transport errors read as
//! misses, write errors are swallowed. Keys are namespaced under
//! `resolvr:cache:` so `clear` cannot touch foreign state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::KvBackend;

const NAMESPACE: &str = "resolvr:cache:";

/// Stored envelope: the value plus whether it contains PII, so the flag
/// survives the backend round-trip.
#[derive(Serialize, Deserialize)]
struct Envelope {
    v: Value,
    #[serde(default)]
    pii: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn namespaced(key: &str) -> String {
        format!("{NAMESPACE}{key}")
    }

    /// Read a value. Expired, missing, malformed, and transport-failed
    /// reads all count as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_opts(key, false).await
    }

    /// Read a value, optionally refusing entries flagged as PII.
    pub async fn get_opts<T: DeserializeOwned>(&self, key: &str, exclude_pii: bool) -> Option<T> {
        let raw = match self.backend.get(&Self::namespaced(key)).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache get failed; treating as miss");
                None
            }
        };

        let hit = raw.and_then(|raw| {
            let envelope: Envelope = serde_json::from_str(&raw).ok()?;
            if exclude_pii && envelope.pii {
                return None;
            }
            serde_json::from_value(envelope.v).ok()
        });

        match hit {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write a value. Errors are logged and swallowed.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        contains_pii: bool,
    ) {
        let envelope = match serde_json::to_value(value) {
            Ok(v) => Envelope { v, pii: contains_pii },
            Err(e) => {
                tracing::warn!(key, error = %e, "cache set skipped: unserializable value");
                return;
            }
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache set skipped: envelope serialization");
                return;
            }
        };
        if let Err(e) = self.backend.set(&Self::namespaced(key), raw, ttl).await {
            tracing::warn!(key, error = %e, "cache set failed; continuing");
        }
    }

    pub async fn del(&self, key: &str) {
        if let Err(e) = self.backend.del(&Self::namespaced(key)).await {
            tracing::warn!(key, error = %e, "cache del failed; continuing");
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        self.backend
            .has(&Self::namespaced(key))
            .await
            .unwrap_or(false)
    }

    /// Remove every entry in the cache namespace.
    pub async fn clear(&self) {
        let keys = match self.backend.keys(NAMESPACE).await {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(error = %e, "cache clear failed to list keys");
                return;
            }
        };
        for key in keys {
            let _ = self.backend.del(&key).await;
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let size = self
            .backend
            .keys(NAMESPACE)
            .await
            .map(|k| k.len())
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    fn store() -> CacheStore {
        CacheStore::new(Arc::new(InMemoryKv::new(100)))
    }

    #[tokio::test]
    async fn round_trip_and_stats() {
        let cache = store();
        cache.set("orders", &vec!["Q1", "Q2"], None, false).await;
        let got: Option<Vec<String>> = cache.get("orders").await;
        assert_eq!(got, Some(vec!["Q1".to_string(), "Q2".to_string()]));

        let miss: Option<Vec<String>> = cache.get("absent").await;
        assert!(miss.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn ttl_expiry_reads_none() {
        let cache = store();
        cache
            .set("k", &42u32, Some(Duration::from_millis(10)), false)
            .await;
        let fresh: Option<u32> = cache.get("k").await;
        assert_eq!(fresh, Some(42));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let stale: Option<u32> = cache.get("k").await;
        assert_eq!(stale, None);
    }

    #[tokio::test]
    async fn exclude_pii_skips_flagged_entries() {
        let cache = store();
        cache.set("profile", &"asha@example.com", None, true).await;
        let blocked: Option<String> = cache.get_opts("profile", true).await;
        assert!(blocked.is_none());
        let allowed: Option<String> = cache.get_opts("profile", false).await;
        assert_eq!(allowed.as_deref(), Some("asha@example.com"));
    }

    #[tokio::test]
    async fn clear_only_touches_namespace() {
        let backend = Arc::new(InMemoryKv::new(100));
        let cache = CacheStore::new(backend.clone());
        cache.set("a", &1u8, None, false).await;
        backend
            .set("conv:c1", "{}".into(), None)
            .await
            .unwrap();
        cache.clear().await;
        assert!(!cache.has("a").await);
        assert!(backend.has("conv:c1").await.unwrap());
    }
}
