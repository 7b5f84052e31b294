//! The LLM response contract.
//!
//! Every agent reply must be JSON matching [`AgentResponse`]. Core
//! fields are coerced to safe defaults when missing; the optional VOC
//! fields stay `None` when absent so downstream checks are explicit
//! about what the model actually said.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Structured ticket fields the agent proposes for the backing ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketUpdatePayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub lead_fields: HashMap<String, Value>,
    #[serde(default)]
    pub intent_classification: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    /// -1.0 (hostile) .. 1.0 (delighted).
    pub score: f64,
    #[serde(default)]
    pub emotion: Option<String>,
}

/// What the agent claims it actually did for the customer this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReceipt {
    pub action_taken: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub expected_timeline: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
}

/// The parsed agent response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default)]
    pub user_facing_message: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub extracted_fields: HashMap<String, Value>,
    #[serde(default)]
    pub should_escalate: bool,
    #[serde(default)]
    pub escalation_reason: Option<String>,
    #[serde(default)]
    pub ticket_update_payload: Option<TicketUpdatePayload>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,

    // ── Optional VOC fields — absent means the model did not say ──
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub intent_confidence: Option<f64>,
    #[serde(default)]
    pub secondary_intents: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub extracted_entities: Vec<Value>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub clarification_needed: Option<bool>,
    #[serde(default)]
    pub customer_stage: Option<String>,
    #[serde(default)]
    pub resolution_receipt: Option<ResolutionReceipt>,
    #[serde(default)]
    pub fcr_achieved: Option<bool>,
    /// Channel-neutral rich media payload, when the agent produced one.
    #[serde(default)]
    pub channel_payload: Option<Value>,
}

impl AgentResponse {
    /// The effective confidence score; missing defaults to 0.75.
    pub fn effective_confidence(&self) -> f64 {
        self.confidence_score.unwrap_or(0.75)
    }

    /// Whether the per-turn intent is a clarification request.
    pub fn is_clarification(&self) -> bool {
        self.clarification_needed.unwrap_or(false)
            || self.intent.eq_ignore_ascii_case("clarification")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_response_fills_defaults() {
        let resp: AgentResponse =
            serde_json::from_str(r#"{"user_facing_message":"hi","intent":"greeting"}"#).unwrap();
        assert!(!resp.should_escalate);
        assert!(resp.tool_calls.is_empty());
        assert!(resp.confidence_score.is_none());
        assert!((resp.effective_confidence() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn clarification_detected_from_either_field() {
        let by_flag = AgentResponse {
            clarification_needed: Some(true),
            ..Default::default()
        };
        let by_intent = AgentResponse {
            intent: "clarification".into(),
            ..Default::default()
        };
        assert!(by_flag.is_clarification());
        assert!(by_intent.is_clarification());
    }
}
