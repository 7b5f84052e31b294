//! System prompt assembly, selected by channel and prompt version.

use rv_domain::channel::Channel;
use serde_json::Value;

/// The response contract every prompt version embeds. The model must
/// answer with exactly this JSON shape.
const CONTRACT: &str = r#"Respond ONLY with a JSON object of this shape:
{
  "user_facing_message": "<the reply to send>",
  "intent": "<snake_case intent>",
  "extracted_fields": { },
  "should_escalate": false,
  "escalation_reason": null,
  "ticket_update_payload": { "summary": "", "tags": [], "status": null, "lead_fields": {}, "intent_classification": null },
  "tool_calls": [ { "name": "<tool>", "args": { } } ],
  "detected_language": "<en|hi|hinglish>",
  "intent_confidence": 0.0,
  "secondary_intents": [],
  "sentiment": { "label": "<positive|neutral|negative>", "score": 0.0, "emotion": null },
  "confidence_score": 0.0,
  "clarification_needed": false,
  "customer_stage": null,
  "resolution_receipt": null,
  "fcr_achieved": null
}
Only request tools from the provided catalog. Never invent order data."#;

/// Build the system prompt for one turn.
pub fn system_prompt(channel: Channel, version: &str, tool_catalog: &[Value]) -> String {
    let persona = match version {
        "v1" => {
            "You are a support assistant for a retail store. Be brief and accurate."
        }
        _ => {
            "You are the customer-support assistant for a retail store. Be warm, \
             concise, and concrete. Mirror the customer's language (English, Hindi, \
             or Hinglish). Never promise what a tool has not confirmed."
        }
    };

    let channel_rules = match channel {
        Channel::Whatsapp => {
            "Channel: WhatsApp. Keep replies under 500 characters, no markdown tables."
        }
        Channel::BusinessChat => {
            "Channel: business chat. Keep a professional register."
        }
        Channel::Web => "Channel: web chat. Short paragraphs are fine.",
    };

    let catalog = serde_json::to_string_pretty(tool_catalog).unwrap_or_else(|_| "[]".into());

    format!(
        "{persona}\n\n{channel_rules}\n\nAvailable tools:\n{catalog}\n\n{CONTRACT}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_contract_and_catalog() {
        let catalog = vec![serde_json::json!({"name": "track_shipment"})];
        let prompt = system_prompt(Channel::Web, "v2", &catalog);
        assert!(prompt.contains("user_facing_message"));
        assert!(prompt.contains("track_shipment"));
    }

    #[test]
    fn versions_differ() {
        let a = system_prompt(Channel::Web, "v1", &[]);
        let b = system_prompt(Channel::Web, "v2", &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn whatsapp_gets_length_rule() {
        let prompt = system_prompt(Channel::Whatsapp, "v2", &[]);
        assert!(prompt.contains("500 characters"));
    }
}
