//! Omnichannel customer linking and context merging.
//!
//! On a conversation's first message, resolve the customer by
//! phone/email, pull their recent conversations from the session index,
//! and merge structured memory from the most recent cross-channel one —
//! so the WhatsApp follow-up to a web chat doesn't start from zero.

use std::sync::Arc;

use rv_domain::channel::UserProfile;
use rv_domain::conversation::{ConversationRecord, TurnRole};
use rv_domain::trace::TraceEvent;
use rv_stores::{ConversationStore, CustomerSessionIndex};

use crate::collaborators::CustomerDirectory;

pub struct CustomerLinker {
    customers: Arc<dyn CustomerDirectory>,
    index: Arc<CustomerSessionIndex>,
    conversations: Arc<ConversationStore>,
}

impl CustomerLinker {
    pub fn new(
        customers: Arc<dyn CustomerDirectory>,
        index: Arc<CustomerSessionIndex>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            customers,
            index,
            conversations,
        }
    }

    /// Link a newly-created conversation to its customer, merging
    /// memory from the most recent earlier conversation. Best-effort:
    /// failures log and leave the record untouched.
    pub async fn link_new_conversation(
        &self,
        record: &mut ConversationRecord,
        profile: &UserProfile,
    ) {
        let phone = profile.phone.as_deref();
        let email = profile.email.as_deref();

        let customer_id = match self.customers.find_by_contact(phone, email).await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %record.conversation_id,
                    error = %e,
                    "customer lookup failed; skipping linking"
                );
                return;
            }
        };
        record.customer_id = Some(customer_id.clone());

        let recent = self.index.recent(&customer_id).await;
        let linked: Vec<String> = recent
            .into_iter()
            .filter(|id| id != &record.conversation_id)
            .collect();
        if linked.is_empty() {
            return;
        }
        record.linked_conversation_ids = linked.clone();

        // Merge memory from the most recent earlier conversation still
        // in the store.
        for earlier_id in &linked {
            let Some(earlier) = self.conversations.get(earlier_id).await else {
                continue;
            };
            record
                .structured_memory
                .merge_from(&earlier.structured_memory);
            let channel = earlier
                .source_channel
                .map(|c| c.as_str().to_owned())
                .unwrap_or_else(|| "another channel".into());
            record.append_turn(
                TurnRole::System,
                format!(
                    "Continuing from the customer's earlier conversation {} on {}.",
                    earlier_id, channel
                ),
            );
            TraceEvent::ConversationLinked {
                conversation_id: record.conversation_id.clone(),
                customer_id,
                merged_from: earlier_id.clone(),
            }
            .emit();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rv_domain::channel::Channel;
    use rv_domain::{Error, Result};
    use rv_stores::InMemoryKv;
    use serde_json::Value;
    use std::time::Duration;

    struct FakeDirectory {
        id: Option<String>,
        fail: bool,
    }

    #[async_trait]
    impl CustomerDirectory for FakeDirectory {
        async fn find_by_contact(
            &self,
            _phone: Option<&str>,
            _email: Option<&str>,
        ) -> Result<Option<String>> {
            if self.fail {
                return Err(Error::Http("directory down".into()));
            }
            Ok(self.id.clone())
        }

        async fn fetch_profile(&self, _customer_id: &str) -> Result<Option<Value>> {
            Ok(None)
        }
    }

    async fn setup(directory: FakeDirectory) -> (CustomerLinker, Arc<ConversationStore>, Arc<CustomerSessionIndex>) {
        let backend = Arc::new(InMemoryKv::new(1000));
        let conversations = Arc::new(ConversationStore::new(
            backend.clone(),
            Duration::from_secs(86_400),
        ));
        let index = Arc::new(CustomerSessionIndex::new(backend));
        let linker = CustomerLinker::new(Arc::new(directory), index.clone(), conversations.clone());
        (linker, conversations, index)
    }

    #[tokio::test]
    async fn merges_memory_from_most_recent_conversation() {
        let (linker, conversations, index) = setup(FakeDirectory {
            id: Some("cust1".into()),
            fail: false,
        })
        .await;

        // An earlier WhatsApp conversation with known memory.
        let mut earlier = ConversationRecord::new("old1", "default", Channel::Whatsapp);
        earlier.structured_memory.name = Some("Asha".into());
        earlier.structured_memory.order_numbers = vec!["Q2593VU".into()];
        conversations.save(&mut earlier).await;
        index.record("cust1", "old1").await;

        let mut record = ConversationRecord::new("new1", "default", Channel::Web);
        let profile = UserProfile {
            phone: Some("9876543210".into()),
            ..Default::default()
        };
        linker.link_new_conversation(&mut record, &profile).await;

        assert_eq!(record.customer_id.as_deref(), Some("cust1"));
        assert_eq!(record.linked_conversation_ids, vec!["old1"]);
        assert_eq!(record.structured_memory.name.as_deref(), Some("Asha"));
        assert_eq!(record.structured_memory.order_numbers, vec!["Q2593VU"]);
        // The continuation is documented as a system turn that does not
        // count towards turn_count.
        assert_eq!(record.turns.len(), 1);
        assert_eq!(record.turns[0].role, TurnRole::System);
        assert_eq!(record.turn_count, 0);
    }

    #[tokio::test]
    async fn unknown_customer_is_untouched() {
        let (linker, _, _) = setup(FakeDirectory { id: None, fail: false }).await;
        let mut record = ConversationRecord::new("new1", "default", Channel::Web);
        linker
            .link_new_conversation(&mut record, &UserProfile::default())
            .await;
        assert!(record.customer_id.is_none());
        assert!(record.turns.is_empty());
    }

    #[tokio::test]
    async fn directory_failure_degrades_quietly() {
        let (linker, _, _) = setup(FakeDirectory { id: None, fail: true }).await;
        let mut record = ConversationRecord::new("new1", "default", Channel::Web);
        linker
            .link_new_conversation(&mut record, &UserProfile::default())
            .await;
        assert!(record.customer_id.is_none());
    }
}
