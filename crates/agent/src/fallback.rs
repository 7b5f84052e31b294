//! Deterministic reply formatting: static intent fallbacks for LLM
//! outages and the template formatter behind the fast path.

use serde_json::Value;

use rv_domain::contract::AgentResponse;
use rv_domain::tool::ExecutedTool;

/// Fixed short replies per canonical intent, used when the LLM is
/// unavailable and the conversation already has a known intent.
const STATIC_FALLBACKS: &[(&str, &str)] = &[
    ("greeting", "Hello! How can I help you today?"),
    (
        "order_status",
        "I'm checking your order right now — give me a moment and I'll share the latest status.",
    ),
    (
        "shipment_tracking",
        "Let me look up your shipment. I'll share the tracking update in just a moment.",
    ),
    (
        "refund_request",
        "I understand you'd like a refund. I'm pulling up the order so we can get this started.",
    ),
    (
        "return_request",
        "I can help with the return. Let me fetch the order details so we can begin.",
    ),
    (
        "payment_issue",
        "Sorry about the payment trouble. I'm checking what happened with your transaction.",
    ),
    (
        "product_inquiry",
        "Happy to help with product details — one moment while I look that up.",
    ),
    (
        "complaint",
        "I'm sorry about the experience. I'm flagging this right away so we can make it right.",
    ),
    (
        "lead_inquiry",
        "Thanks for your interest! I'll gather the details and get back to you shortly.",
    ),
    (
        "meeting_request",
        "I can set that up. Let me check available slots and confirm with you.",
    ),
];

/// The static fallback for an intent, when one exists.
pub fn static_fallback(intent: &str) -> Option<AgentResponse> {
    let message = STATIC_FALLBACKS
        .iter()
        .find(|(i, _)| intent.eq_ignore_ascii_case(i))
        .map(|(_, m)| *m)?;
    Some(AgentResponse {
        user_facing_message: message.to_owned(),
        intent: intent.to_owned(),
        ..Default::default()
    })
}

/// The last-resort reply when nothing else is known.
pub fn generic_fallback() -> AgentResponse {
    AgentResponse {
        user_facing_message: "Sorry, something went wrong on our side. Please try again in a \
                              few minutes, or write to support@resolvr.app and we'll take care \
                              of it."
            .to_owned(),
        intent: "unknown".to_owned(),
        ..Default::default()
    }
}

/// Render successful tool results into a user-visible reply without a
/// second LLM call. Deterministic: used by the fast path and as the
/// fallback when the refinement call fails.
pub fn build_tool_results_fallback(results: &[ExecutedTool]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for executed in results {
        let Some(data) = executed.result.data() else {
            continue;
        };
        match executed.tool.as_str() {
            "lookup_customer_orders" => format_orders(data, &mut lines),
            "track_shipment" => format_tracking(data, &mut lines),
            "initiate_refund" => {
                let reference = data
                    .get("refund_id")
                    .and_then(Value::as_str)
                    .unwrap_or("pending");
                lines.push(format!(
                    "Your refund has been initiated (reference {reference}). It usually \
                     reflects within 5–7 business days."
                ));
            }
            "generate_payment_link" => {
                if let Some(url) = data.get("url").and_then(Value::as_str) {
                    lines.push(format!("Here's your payment link: {url}"));
                }
            }
            "create_ar_session" => {
                if let Some(url) = data.get("session_url").and_then(Value::as_str) {
                    lines.push(format!("Your AR try-on session is ready: {url}"));
                }
            }
            _ => {}
        }
    }

    if lines.is_empty() {
        "I've completed that for you. Is there anything else I can help with?".to_owned()
    } else {
        lines.join("\n")
    }
}

fn format_orders(data: &Value, lines: &mut Vec<String>) {
    let Some(orders) = data.get("orders").and_then(Value::as_array) else {
        return;
    };
    for order in orders {
        let no = order
            .get("order_no")
            .and_then(Value::as_str)
            .unwrap_or("(unknown)");
        let status = order
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("being processed");
        let mut line = format!("Order {no} is currently {status}.");
        if let Some(eta) = order.get("expected_delivery").and_then(Value::as_str) {
            line.push_str(&format!(" Expected delivery: {eta}."));
        }
        lines.push(line);
    }
}

fn format_tracking(data: &Value, lines: &mut Vec<String>) {
    let reference = data
        .get("reference")
        .or_else(|| data.get("awb"))
        .and_then(Value::as_str)
        .unwrap_or("your shipment");
    let status = data
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("in transit");
    let mut line = format!("Shipment {reference} is {status}.");
    if let Some(location) = data.get("location").and_then(Value::as_str) {
        line.push_str(&format!(" Last seen at {location}."));
    }
    if let Some(eta) = data.get("expected_delivery").and_then(Value::as_str) {
        line.push_str(&format!(" Expected delivery: {eta}."));
    }
    lines.push(line);
}
