//! Append-only audit log with a SHA-256 hash chain.
//!
//! Every event's `data_hash` covers its content plus the previous
//! event's hash, so any mutation of a stored event is detectable by
//! recomputation. The head hash is advanced under a mutex — chaining is
//! strictly linear even under concurrent appends.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const GENESIS: &str = "genesis";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Conversation,
    ToolExecution,
    Escalation,
    StateTransition,
    PiiAccess,
    PiiTokenize,
    PiiPurge,
    ConfigChange,
    AdminAction,
    Copilot,
    Sla,
    Gdpr,
    OrderModification,
    Outbound,
}

/// What callers hand to [`AuditChain::append`].
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor: String,
    pub action: String,
    pub category: AuditCategory,
    pub conversation_id: Option<String>,
    pub tenant_id: Option<String>,
    pub details: Value,
}

/// A chained, stored audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub category: AuditCategory,
    pub conversation_id: Option<String>,
    pub tenant_id: Option<String>,
    pub details: Value,
    pub previous_hash: String,
    pub data_hash: String,
}

/// The hashed projection of an event, serialized in this exact field
/// order. Changing the order breaks every stored chain.
#[derive(Serialize)]
struct CanonicalEvent<'a> {
    event_id: &'a str,
    timestamp: &'a DateTime<Utc>,
    actor: &'a str,
    action: &'a str,
    category: AuditCategory,
    details: &'a Value,
    previous_hash: &'a str,
}

fn compute_hash(event: &AuditEvent) -> String {
    let canonical = CanonicalEvent {
        event_id: &event.event_id,
        timestamp: &event.timestamp,
        actor: &event.actor,
        action: &event.action,
        category: event.category,
        details: &event.details,
        previous_hash: &event.previous_hash,
    };
    let json = serde_json::to_string(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query / verify
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub conversation_id: Option<String>,
    pub tenant_id: Option<String>,
    pub category: Option<AuditCategory>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    /// `event_id` of the first event whose hash no longer matches.
    pub broken_at: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AuditChain {
    events: RwLock<Vec<AuditEvent>>,
    head: Mutex<String>,
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditChain {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            head: Mutex::new(GENESIS.to_owned()),
        }
    }

    /// Append an event. Best-effort by contract — audit outages must
    /// never block business operations, so this cannot fail.
    pub fn append(&self, new: NewAuditEvent) -> AuditEvent {
        // Hold the head lock across hash + insert so previous_hash
        // chaining stays linear under concurrent appends.
        let mut head = self.head.lock();

        let mut event = AuditEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: new.actor,
            action: new.action,
            category: new.category,
            conversation_id: new.conversation_id,
            tenant_id: new.tenant_id,
            details: new.details,
            previous_hash: head.clone(),
            data_hash: String::new(),
        };
        event.data_hash = compute_hash(&event);
        *head = event.data_hash.clone();

        self.events.write().push(event.clone());
        event
    }

    /// Filtered view, oldest first.
    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read();
        let mut out: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                filter
                    .conversation_id
                    .as_ref()
                    .is_none_or(|id| e.conversation_id.as_ref() == Some(id))
                    && filter
                        .tenant_id
                        .as_ref()
                        .is_none_or(|t| e.tenant_id.as_ref() == Some(t))
                    && filter.category.is_none_or(|c| e.category == c)
                    && filter.actor.as_ref().is_none_or(|a| &e.actor == a)
                    && filter.since.is_none_or(|s| e.timestamp >= s)
                    && filter.until.is_none_or(|u| e.timestamp <= u)
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let start = out.len().saturating_sub(limit);
            out.drain(..start);
        }
        out
    }

    /// Recompute the chain and compare against stored hashes.
    ///
    /// Global verification checks both per-event hashes and the
    /// `previous_hash` linkage from `"genesis"`. Conversation-scoped
    /// verification checks per-event hashes only — that conversation's
    /// events interleave with others in the global chain.
    pub fn verify_integrity(&self, conversation_id: Option<&str>) -> IntegrityReport {
        let events = self.events.read();

        match conversation_id {
            Some(id) => {
                for event in events.iter().filter(|e| e.conversation_id.as_deref() == Some(id)) {
                    if compute_hash(event) != event.data_hash {
                        return IntegrityReport {
                            valid: false,
                            broken_at: Some(event.event_id.clone()),
                        };
                    }
                }
            }
            None => {
                let mut expected_previous = GENESIS.to_owned();
                for event in events.iter() {
                    if event.previous_hash != expected_previous
                        || compute_hash(event) != event.data_hash
                    {
                        return IntegrityReport {
                            valid: false,
                            broken_at: Some(event.event_id.clone()),
                        };
                    }
                    expected_previous = event.data_hash.clone();
                }
            }
        }

        IntegrityReport { valid: true, broken_at: None }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, details: Value) {
        self.events.write()[index].details = details;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, conversation: Option<&str>) -> NewAuditEvent {
        NewAuditEvent {
            actor: "orchestrator".into(),
            action: action.into(),
            category: AuditCategory::Conversation,
            conversation_id: conversation.map(str::to_owned),
            tenant_id: Some("default".into()),
            details: serde_json::json!({"n": action}),
        }
    }

    #[test]
    fn chain_starts_at_genesis_and_links() {
        let chain = AuditChain::new();
        let first = chain.append(event("a", None));
        let second = chain.append(event("b", None));
        assert_eq!(first.previous_hash, "genesis");
        assert_eq!(second.previous_hash, first.data_hash);
        assert!(chain.verify_integrity(None).valid);
    }

    #[test]
    fn tamper_is_detected_at_the_right_event() {
        let chain = AuditChain::new();
        let ids: Vec<String> = (0..5)
            .map(|i| chain.append(event(&format!("e{i}"), Some("c1"))).event_id)
            .collect();

        chain.tamper(2, serde_json::json!({"n": "forged"}));

        let report = chain.verify_integrity(None);
        assert!(!report.valid);
        assert_eq!(report.broken_at.as_deref(), Some(ids[2].as_str()));

        // Conversation-scoped verification catches it too.
        let scoped = chain.verify_integrity(Some("c1"));
        assert!(!scoped.valid);
        assert_eq!(scoped.broken_at.as_deref(), Some(ids[2].as_str()));
    }

    #[test]
    fn query_filters_and_limits() {
        let chain = AuditChain::new();
        chain.append(event("a", Some("c1")));
        chain.append(event("b", Some("c2")));
        chain.append(event("c", Some("c1")));

        let for_c1 = chain.query(&AuditQuery {
            conversation_id: Some("c1".into()),
            ..Default::default()
        });
        assert_eq!(for_c1.len(), 2);
        assert_eq!(for_c1[0].action, "a");

        let last_one = chain.query(&AuditQuery {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(last_one.len(), 1);
        assert_eq!(last_one[0].action, "c");
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain = AuditChain::new();
        assert!(chain.verify_integrity(None).valid);
        assert!(chain.verify_integrity(Some("c1")).valid);
    }

    #[test]
    fn concurrent_appends_stay_linear() {
        use std::sync::Arc;
        let chain = Arc::new(AuditChain::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let chain = chain.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        chain.append(NewAuditEvent {
                            actor: format!("t{i}"),
                            action: format!("a{j}"),
                            category: AuditCategory::ToolExecution,
                            conversation_id: None,
                            tenant_id: None,
                            details: Value::Null,
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(chain.len(), 200);
        assert!(chain.verify_integrity(None).valid);
    }
}
