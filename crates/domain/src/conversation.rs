//! The durable conversation record and its structured memory.
//!
//! One record per `conversation_id`, owned exclusively by the
//! conversation store. The orchestrator holds a short-lived mutable copy
//! during pipeline execution and saves it once per message.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::{Channel, UserProfile};

/// Maximum non-system turns retained after trimming on save.
pub const MAX_TURNS: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// States of the conversation lifecycle. `Resolved` and `Escalated` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    New,
    ActiveQa,
    OrderInquiry,
    ShipmentTracking,
    ReturnRefund,
    ProductInquiry,
    LeadQualification,
    MeetingBooking,
    SupportTriage,
    Resolved,
    Escalated,
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Resolved | ConversationState::Escalated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::New => "NEW",
            ConversationState::ActiveQa => "ACTIVE_QA",
            ConversationState::OrderInquiry => "ORDER_INQUIRY",
            ConversationState::ShipmentTracking => "SHIPMENT_TRACKING",
            ConversationState::ReturnRefund => "RETURN_REFUND",
            ConversationState::ProductInquiry => "PRODUCT_INQUIRY",
            ConversationState::LeadQualification => "LEAD_QUALIFICATION",
            ConversationState::MeetingBooking => "MEETING_BOOKING",
            ConversationState::SupportTriage => "SUPPORT_TRIAGE",
            ConversationState::Resolved => "RESOLVED",
            ConversationState::Escalated => "ESCALATED",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structured memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An order record cached into conversation memory after a successful
/// lookup, so follow-up turns can answer without re-fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedOrder {
    pub data: Value,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub source_phone: Option<String>,
}

/// Durable per-conversation key-value memory: the recognized fields the
/// agent extracts over time, plus a free-form map for anything else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredMemory {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub product_interest: Vec<String>,
    #[serde(default)]
    pub order_numbers: Vec<String>,
    #[serde(default)]
    pub order_data_cache: HashMap<String, CachedOrder>,
    #[serde(default)]
    pub custom_fields: HashMap<String, Value>,
}

impl StructuredMemory {
    /// Fill empty known fields from an inbound user profile. Existing
    /// values win — the customer's earlier statements take precedence
    /// over adapter metadata.
    pub fn merge_profile(&mut self, profile: &UserProfile) {
        if self.name.is_none() {
            self.name = profile.name.clone();
        }
        if self.email.is_none() {
            self.email = profile.email.clone();
        }
        if self.phone.is_none() {
            self.phone = profile.phone.clone();
        }
    }

    /// Merge memory carried over from a linked cross-channel
    /// conversation. Local values win; lists are unioned.
    pub fn merge_from(&mut self, other: &StructuredMemory) {
        if self.name.is_none() {
            self.name = other.name.clone();
        }
        if self.email.is_none() {
            self.email = other.email.clone();
        }
        if self.phone.is_none() {
            self.phone = other.phone.clone();
        }
        if self.company.is_none() {
            self.company = other.company.clone();
        }
        for p in &other.product_interest {
            if !self.product_interest.contains(p) {
                self.product_interest.push(p.clone());
            }
        }
        for o in &other.order_numbers {
            if !self.order_numbers.contains(o) {
                self.order_numbers.push(o.clone());
            }
        }
        for (k, v) in &other.custom_fields {
            self.custom_fields.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Record an order number (deduplicated) and cache its data.
    pub fn record_order(&mut self, order_no: &str, order: CachedOrder) {
        if !self.order_numbers.iter().any(|o| o == order_no) {
            self.order_numbers.push(order_no.to_owned());
        }
        self.order_data_cache.insert(order_no.to_owned(), order);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable conversation record.
///
/// Invariants: `turn_count` equals the number of user+assistant turns;
/// turns are append-only except trimming on save; `updated_at >=
/// created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub tenant_id: String,
    pub state: ConversationState,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub structured_memory: StructuredMemory,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub clarification_count: u32,
    #[serde(default)]
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_by: Option<String>,
    #[serde(default)]
    pub csat_rating: Option<u8>,
    #[serde(default)]
    pub primary_intent: Option<String>,
    #[serde(default)]
    pub source_channel: Option<Channel>,
    #[serde(default)]
    pub linked_conversation_ids: Vec<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

impl ConversationRecord {
    pub fn new(conversation_id: &str, tenant_id: &str, channel: Channel) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.to_owned(),
            tenant_id: tenant_id.to_owned(),
            state: ConversationState::New,
            turns: Vec::new(),
            structured_memory: StructuredMemory::default(),
            ticket_id: None,
            clarification_count: 0,
            turn_count: 0,
            created_at: now,
            updated_at: now,
            visitor_id: None,
            ended_at: None,
            ended_by: None,
            csat_rating: None,
            primary_intent: None,
            source_channel: Some(channel),
            linked_conversation_ids: Vec::new(),
            customer_id: None,
        }
    }

    /// Append a turn. User and assistant turns bump `turn_count`; system
    /// turns do not.
    pub fn append_turn(&mut self, role: TurnRole, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
        if matches!(role, TurnRole::User | TurnRole::Assistant) {
            self.turn_count += 1;
        }
        self.updated_at = Utc::now();
    }

    /// Set the primary intent once: the first non-trivial intent the
    /// agent detects is the conversation's stable label.
    pub fn note_intent(&mut self, intent: &str) {
        if self.primary_intent.is_none() && !intent.is_empty() {
            self.primary_intent = Some(intent.to_owned());
        }
    }

    /// Intents from recent user-visible turns, most recent last.
    pub fn previous_intents(&self) -> Vec<String> {
        // Only the primary + structured memory intent are durable; the
        // per-turn trail lives in VOC records. This returns what the
        // record itself knows.
        let mut intents = Vec::new();
        if let Some(i) = &self.structured_memory.intent {
            intents.push(i.clone());
        }
        if let Some(i) = &self.primary_intent {
            if !intents.contains(i) {
                intents.push(i.clone());
            }
        }
        intents
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_counts_only_user_facing_turns() {
        let mut rec = ConversationRecord::new("c1", "default", Channel::Web);
        rec.append_turn(TurnRole::User, "hi");
        rec.append_turn(TurnRole::System, "linked");
        rec.append_turn(TurnRole::Assistant, "hello");
        assert_eq!(rec.turn_count, 2);
        assert_eq!(rec.turns.len(), 3);
        assert!(rec.updated_at >= rec.created_at);
    }

    #[test]
    fn primary_intent_is_first_wins() {
        let mut rec = ConversationRecord::new("c1", "default", Channel::Web);
        rec.note_intent("order_status");
        rec.note_intent("refund_request");
        assert_eq!(rec.primary_intent.as_deref(), Some("order_status"));
    }

    #[test]
    fn memory_merge_prefers_local_values() {
        let mut mine = StructuredMemory {
            name: Some("Asha".into()),
            ..Default::default()
        };
        let theirs = StructuredMemory {
            name: Some("A. Kumar".into()),
            phone: Some("9876543210".into()),
            order_numbers: vec!["Q2593VU".into()],
            ..Default::default()
        };
        mine.merge_from(&theirs);
        assert_eq!(mine.name.as_deref(), Some("Asha"));
        assert_eq!(mine.phone.as_deref(), Some("9876543210"));
        assert_eq!(mine.order_numbers, vec!["Q2593VU".to_string()]);
    }

    #[test]
    fn record_order_deduplicates() {
        let mut mem = StructuredMemory::default();
        let order = CachedOrder {
            data: serde_json::json!({"status": "shipped"}),
            cached_at: Utc::now(),
            source_phone: None,
        };
        mem.record_order("Q1", order.clone());
        mem.record_order("Q1", order);
        assert_eq!(mem.order_numbers.len(), 1);
    }
}
