//! The KV backend abstraction and its bounded in-memory implementation.
//!
//! Stores never talk to a transport directly — they hold an
//! `Arc<dyn KvBackend>` chosen once at startup by [`open_backend`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use rv_domain::config::StorageConfig;
use rv_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A string-keyed, string-valued store with per-entry TTL.
///
/// Implementations must never return an expired value from `get`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn has(&self, key: &str) -> Result<bool>;
    /// All live keys with the given prefix.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
    /// Whether the backend expires entries natively (a durable KV with
    /// its own TTL support). When true, periodic eviction is a no-op.
    fn native_ttl(&self) -> bool {
        false
    }
    /// Reclaim expired entries. Backends with native TTL keep the
    /// default no-op; the in-memory backend is swept periodically.
    fn evict_expired(&self) -> usize {
        0
    }
}

/// Pick the backend: an injected durable transport handle when present,
/// the bounded in-memory map otherwise.
pub fn open_backend(
    transport: Option<Arc<dyn KvBackend>>,
    config: &StorageConfig,
) -> Arc<dyn KvBackend> {
    match transport {
        Some(backend) => backend,
        None => {
            if config.redis_url.is_some() {
                tracing::warn!(
                    "storage.redis_url is set but no transport handle was injected; \
                     falling back to the in-memory backend"
                );
            }
            Arc::new(InMemoryKv::new(config.max_entries))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Bounded in-memory KV with lazy expiry on read plus periodic eviction
/// (driven by [`InMemoryKv::evict_expired`] from a background task).
pub struct InMemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
}

impl InMemoryKv {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KvBackend for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        // Lazy expiry: drop the entry on read when it has expired.
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(e) if !e.expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        // At capacity and inserting a new key: reclaim expired entries
        // first, then drop the entry closest to expiry.
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            entries.retain(|_, e| !e.expired(now));
            if entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at.unwrap_or(now + Duration::from_secs(u32::MAX as u64)))
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: ttl.map(|t| now + t),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.expired(now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    /// Drop every expired entry. Returns how many were removed.
    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.expired(now));
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_del() {
        let kv = InMemoryKv::new(10);
        kv.set("a", "1".into(), None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));
        assert!(kv.has("a").await.unwrap());
        kv.del("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let kv = InMemoryKv::new(10);
        kv.set("a", "1".into(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert!(kv.keys("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn periodic_eviction_reclaims() {
        let kv = InMemoryKv::new(10);
        kv.set("a", "1".into(), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        kv.set("b", "2".into(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(kv.evict_expired(), 1);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn capacity_evicts_soonest_expiring() {
        let kv = InMemoryKv::new(2);
        kv.set("short", "1".into(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        kv.set("long", "2".into(), Some(Duration::from_secs(600)))
            .await
            .unwrap();
        kv.set("new", "3".into(), None).await.unwrap();

        assert_eq!(kv.get("short").await.unwrap(), None);
        assert!(kv.get("long").await.unwrap().is_some());
        assert!(kv.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keys_filters_by_prefix() {
        let kv = InMemoryKv::new(10);
        kv.set("ns:a", "1".into(), None).await.unwrap();
        kv.set("ns:b", "2".into(), None).await.unwrap();
        kv.set("other", "3".into(), None).await.unwrap();
        let mut keys = kv.keys("ns:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns:a".to_string(), "ns:b".to_string()]);
    }

    #[tokio::test]
    async fn factory_prefers_transport() {
        let transport: Arc<dyn KvBackend> = Arc::new(InMemoryKv::new(5));
        let chosen = open_backend(Some(transport.clone()), &StorageConfig::default());
        chosen.set("k", "v".into(), None).await.unwrap();
        assert_eq!(transport.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
