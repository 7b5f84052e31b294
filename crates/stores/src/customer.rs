//! Per-customer conversation index for omnichannel linking.
//!
//! `resolvr:customer_sessions:<customerId>` holds the customer's recent
//! conversation ids ordered by time — the last 20 over 90 days. The
//! linker reads this to find the most recent cross-channel conversation
//! to merge memory from.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kv::KvBackend;

const NAMESPACE: &str = "resolvr:customer_sessions:";
const MAX_SESSIONS: usize = 20;
const RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRef {
    conversation_id: String,
    at: DateTime<Utc>,
}

pub struct CustomerSessionIndex {
    backend: Arc<dyn KvBackend>,
}

impl CustomerSessionIndex {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    fn key(customer_id: &str) -> String {
        format!("{NAMESPACE}{customer_id}")
    }

    /// Record a conversation for a customer. Re-recording an existing
    /// conversation refreshes its timestamp.
    pub async fn record(&self, customer_id: &str, conversation_id: &str) {
        let key = Self::key(customer_id);
        let mut sessions = self.load(&key).await;
        sessions.retain(|s| s.conversation_id != conversation_id);
        sessions.push(SessionRef {
            conversation_id: conversation_id.to_owned(),
            at: Utc::now(),
        });
        sessions.sort_by_key(|s| s.at);
        if sessions.len() > MAX_SESSIONS {
            let excess = sessions.len() - MAX_SESSIONS;
            sessions.drain(..excess);
        }

        let raw = match serde_json::to_string(&sessions) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(customer_id, error = %e, "session index serialization failed");
                return;
            }
        };
        let ttl = Duration::from_secs(RETENTION_DAYS as u64 * 86_400);
        if let Err(e) = self.backend.set(&key, raw, Some(ttl)).await {
            tracing::warn!(customer_id, error = %e, "session index write failed");
        }
    }

    /// Recent conversation ids for a customer, newest first, within the
    /// retention window.
    pub async fn recent(&self, customer_id: &str) -> Vec<String> {
        let cutoff = Utc::now() - chrono::Duration::days(RETENTION_DAYS);
        let mut sessions = self.load(&Self::key(customer_id)).await;
        sessions.retain(|s| s.at >= cutoff);
        sessions.sort_by_key(|s| std::cmp::Reverse(s.at));
        sessions.into_iter().map(|s| s.conversation_id).collect()
    }

    async fn load(&self, key: &str) -> Vec<SessionRef> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "session index read failed");
                Vec::new()
            }
        }
    }
}
