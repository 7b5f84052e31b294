//! Response contract parsing.

use rv_domain::contract::AgentResponse;
use rv_domain::{Error, Result};

/// Parse the raw model output into an [`AgentResponse`].
///
/// Strips code fences, parses strictly as JSON, coerces missing core
/// fields to safe defaults (via serde defaults), and normalizes tool
/// names by dropping any `functions.` prefix some models emit.
pub fn parse_agent_response(raw: &str) -> Result<AgentResponse> {
    let stripped = strip_fences(raw);
    let mut response: AgentResponse = serde_json::from_str(stripped)
        .map_err(|e| Error::Parse(format!("agent response is not contract JSON: {e}")))?;

    for call in &mut response.tool_calls {
        if let Some(rest) = call.name.strip_prefix("functions.") {
            call.name = rest.to_owned();
        }
    }

    Ok(response)
}

/// Remove a surrounding ``` fence (with or without a language tag).
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_parses() {
        let response = parse_agent_response(
            r#"{"user_facing_message":"hi","intent":"greeting","confidence_score":0.92}"#,
        )
        .unwrap();
        assert_eq!(response.user_facing_message, "hi");
        assert_eq!(response.confidence_score, Some(0.92));
        assert!(!response.should_escalate);
    }

    #[test]
    fn fenced_json_parses() {
        let raw = "```json\n{\"user_facing_message\":\"ok\",\"intent\":\"order_status\"}\n```";
        let response = parse_agent_response(raw).unwrap();
        assert_eq!(response.intent, "order_status");
    }

    #[test]
    fn functions_prefix_is_stripped() {
        let raw = r#"{
            "user_facing_message": "checking",
            "intent": "order_status",
            "tool_calls": [{"name": "functions.lookup_customer_orders", "args": {"order_no": "Q1"}}]
        }"#;
        let response = parse_agent_response(raw).unwrap();
        assert_eq!(response.tool_calls[0].name, "lookup_customer_orders");
    }

    #[test]
    fn prose_is_a_parse_failure() {
        let err = parse_agent_response("Sure! Your order is on the way.").unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn optional_voc_fields_stay_absent() {
        let response =
            parse_agent_response(r#"{"user_facing_message":"x","intent":"greeting"}"#).unwrap();
        assert!(response.sentiment.is_none());
        assert!(response.confidence_score.is_none());
        assert!(response.clarification_needed.is_none());
    }
}
