//! Voice-of-customer types: the structured record derived from one turn
//! by the deterministic pre-processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Language
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedLanguage {
    /// BCP-47-ish code: `en`, `hi`, or `hinglish`.
    pub code: String,
    pub confidence: f64,
    /// `latin`, `devanagari`, or `mixed`.
    pub script: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    OrderNumber,
    Phone,
    Email,
    Amount,
    ReturnId,
    PaymentId,
    Awb,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::OrderNumber => "order_number",
            EntityType::Phone => "phone",
            EntityType::Email => "email",
            EntityType::Amount => "amount",
            EntityType::ReturnId => "return_id",
            EntityType::PaymentId => "payment_id",
            EntityType::Awb => "awb",
        }
    }
}

/// One entity extracted from the raw message text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Normalized value (uppercased order numbers, digits-only phones).
    pub value: String,
    /// The text as matched.
    pub raw_text: String,
    pub confidence: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Urgency
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }

    /// One level up, saturating at critical.
    pub fn bumped(&self) -> UrgencyLevel {
        match self {
            UrgencyLevel::Low => UrgencyLevel::Medium,
            UrgencyLevel::Medium => UrgencyLevel::High,
            UrgencyLevel::High | UrgencyLevel::Critical => UrgencyLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Urgency {
    pub level: UrgencyLevel,
    /// Named signals that produced this level, e.g.
    /// `legal_threat_keywords`, `repeated_clarification`.
    pub signals: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Risk flags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    LegalThreat,
    SocialMediaThreat,
    PolicyExceptionRequested,
    RepeatComplaint,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFlag::LegalThreat => "legal_threat",
            RiskFlag::SocialMediaThreat => "social_media_threat",
            RiskFlag::PolicyExceptionRequested => "policy_exception_requested",
            RiskFlag::RepeatComplaint => "repeat_complaint",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis output + persisted record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The pre-processor's output for one message. Pure function of the
/// text and context: same input, same output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocAnalysis {
    pub detected_languages: Vec<DetectedLanguage>,
    pub entities: Vec<Entity>,
    pub urgency: Urgency,
    pub risk_flags: Vec<RiskFlag>,
}

impl VocAnalysis {
    pub fn primary_language(&self) -> Option<&DetectedLanguage> {
        self.detected_languages.first()
    }

    pub fn entities_of(&self, t: EntityType) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.entity_type == t)
    }

    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.risk_flags.contains(&flag)
    }
}

/// The persisted per-turn VOC record. `message_id` is
/// `<conversation_id>-<turn_count>`; retention 90 days, append-only per
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocRecord {
    pub message_id: String,
    pub conversation_id: String,
    pub tenant_id: String,
    pub analysis: VocAnalysis,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_bump_saturates() {
        assert_eq!(UrgencyLevel::Low.bumped(), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::High.bumped(), UrgencyLevel::Critical);
        assert_eq!(UrgencyLevel::Critical.bumped(), UrgencyLevel::Critical);
    }

    #[test]
    fn urgency_orders_low_to_critical() {
        assert!(UrgencyLevel::Critical > UrgencyLevel::High);
        assert!(UrgencyLevel::High > UrgencyLevel::Medium);
        assert!(UrgencyLevel::Medium > UrgencyLevel::Low);
    }

    #[test]
    fn risk_flag_serializes_snake_case() {
        let json = serde_json::to_string(&RiskFlag::SocialMediaThreat).unwrap();
        assert_eq!(json, r#""social_media_threat""#);
    }
}
