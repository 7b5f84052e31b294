//! Durable conversation records.
//!
//! One JSON document per conversation at `conv:<id>`, 24-hour TTL.
//! Saving trims history: all system turns survive, non-system turns are
//! bounded to the most recent [`MAX_TURNS`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rv_domain::conversation::{ConversationRecord, TurnRole, MAX_TURNS};

use crate::kv::KvBackend;

pub struct ConversationStore {
    backend: Arc<dyn KvBackend>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn KvBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    fn key(conversation_id: &str) -> String {
        format!("conv:{conversation_id}")
    }

    pub async fn get(&self, conversation_id: &str) -> Option<ConversationRecord> {
        let raw = match self.backend.get(&Self::key(conversation_id)).await {
            Ok(v) => v?,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "conversation load failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "conversation record corrupt; ignoring");
                None
            }
        }
    }

    /// Trim, stamp `updated_at`, and persist. Transport errors are
    /// logged, not thrown — the outbound reply has usually already been
    /// sent by the time this runs.
    pub async fn save(&self, record: &mut ConversationRecord) {
        trim_turns(record);
        record.updated_at = Utc::now();

        let raw = match serde_json::to_string(record) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %record.conversation_id,
                    error = %e,
                    "conversation record serialization failed"
                );
                return;
            }
        };
        if let Err(e) = self
            .backend
            .set(&Self::key(&record.conversation_id), raw, Some(self.ttl))
            .await
        {
            tracing::warn!(
                conversation_id = %record.conversation_id,
                error = %e,
                "conversation save failed"
            );
        }
    }

    pub async fn delete(&self, conversation_id: &str) {
        if let Err(e) = self.backend.del(&Self::key(conversation_id)).await {
            tracing::warn!(conversation_id, error = %e, "conversation delete failed");
        }
    }
}

/// Keep all system turns and the last [`MAX_TURNS`] non-system turns,
/// preserving original order.
fn trim_turns(record: &mut ConversationRecord) {
    let non_system = record
        .turns
        .iter()
        .filter(|t| t.role != TurnRole::System)
        .count();
    if non_system <= MAX_TURNS {
        return;
    }
    let mut to_skip = non_system - MAX_TURNS;
    record.turns.retain(|t| {
        if t.role == TurnRole::System {
            true
        } else if to_skip > 0 {
            to_skip -= 1;
            false
        } else {
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use rv_domain::channel::Channel;

    fn store() -> ConversationStore {
        ConversationStore::new(Arc::new(InMemoryKv::new(100)), Duration::from_secs(86_400))
    }

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = store();
        let mut record = ConversationRecord::new("c1", "default", Channel::Web);
        record.append_turn(TurnRole::User, "hello");
        store.save(&mut record).await;

        let loaded = store.get("c1").await.unwrap();
        assert_eq!(loaded.conversation_id, "c1");
        assert_eq!(loaded.turn_count, 1);
        assert_eq!(loaded.turns.len(), 1);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        assert!(store().get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn trim_keeps_system_turns_and_recent_tail() {
        let store = store();
        let mut record = ConversationRecord::new("c1", "default", Channel::Web);
        record.append_turn(TurnRole::System, "linked from whatsapp");
        for i in 0..25 {
            record.append_turn(TurnRole::User, format!("u{i}"));
        }
        store.save(&mut record).await;

        let loaded = store.get("c1").await.unwrap();
        let system: Vec<_> = loaded
            .turns
            .iter()
            .filter(|t| t.role == TurnRole::System)
            .collect();
        let non_system: Vec<_> = loaded
            .turns
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .collect();
        assert_eq!(system.len(), 1);
        assert_eq!(non_system.len(), MAX_TURNS);
        // Oldest surviving non-system turn is the (25 - MAX_TURNS)-th.
        assert_eq!(non_system[0].content, format!("u{}", 25 - MAX_TURNS));
        assert_eq!(non_system.last().unwrap().content, "u24");
        // The system turn keeps its original position at the front.
        assert_eq!(loaded.turns[0].role, TurnRole::System);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = store();
        let mut record = ConversationRecord::new("c1", "default", Channel::Web);
        store.save(&mut record).await;
        store.delete("c1").await;
        assert!(store.get("c1").await.is_none());
    }
}
