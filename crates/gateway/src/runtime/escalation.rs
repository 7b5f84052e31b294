//! The escalation policy: ten ordered checks; the first that fires
//! escalates the conversation.

use rv_domain::config::{ChannelEndpoint, TenantPolicy};
use rv_domain::contract::AgentResponse;
use rv_domain::conversation::ConversationRecord;
use rv_domain::voc::VocAnalysis;

/// Why a conversation escalated. `check` is the stable counter label;
/// `reason` is the human-readable summary line.
#[derive(Debug, Clone)]
pub struct EscalationTrigger {
    pub check: &'static str,
    pub reason: String,
}

/// Run the ten checks in order; the first hit wins.
pub fn evaluate(
    response: &AgentResponse,
    analysis: &VocAnalysis,
    record: &ConversationRecord,
    policy: &TenantPolicy,
    channel_policy: &ChannelEndpoint,
    message_text: &str,
) -> Option<EscalationTrigger> {
    // 1. The agent asked for it.
    if response.should_escalate {
        return Some(EscalationTrigger {
            check: "agent_requested",
            reason: response
                .escalation_reason
                .clone()
                .unwrap_or_else(|| "Agent requested escalation".into()),
        });
    }

    // 2. Tenant-configured escalation intents.
    if policy
        .escalation_intents
        .iter()
        .any(|i| i.eq_ignore_ascii_case(&response.intent))
    {
        return Some(EscalationTrigger {
            check: "escalation_intent",
            reason: format!("Intent '{}' always escalates for this tenant", response.intent),
        });
    }

    // 3. Urgency auto-escalation.
    if policy.urgency_auto_escalate.contains(&analysis.urgency.level) {
        return Some(EscalationTrigger {
            check: "urgency",
            reason: format!("Urgency level is {}", analysis.urgency.level.as_str()),
        });
    }

    // 4–7. Risk flags, in fixed order.
    for flag in &analysis.risk_flags {
        if policy.risk_flag_auto_escalate.contains(flag) {
            return Some(EscalationTrigger {
                check: flag.as_str(),
                reason: format!("Risk flag: {}", flag.as_str()),
            });
        }
    }

    // 8. Hostile sentiment.
    if let Some(sentiment) = &response.sentiment {
        if sentiment.score < policy.sentiment_escalation_threshold {
            return Some(EscalationTrigger {
                check: "sentiment",
                reason: format!("Sentiment score {:.2} below threshold", sentiment.score),
            });
        }
    }

    // 9. Frustration keywords in the raw message.
    let lowered = message_text.to_lowercase();
    if let Some(keyword) = policy
        .frustration_keywords
        .iter()
        .find(|k| lowered.contains(k.as_str()))
    {
        return Some(EscalationTrigger {
            check: "frustration_keywords",
            reason: format!("Customer language signals frustration (\"{keyword}\")"),
        });
    }

    // 10. Conversation exhausted its budget.
    if record.clarification_count >= policy.max_clarifications {
        return Some(EscalationTrigger {
            check: "max_clarifications",
            reason: format!(
                "Clarification limit reached ({})",
                record.clarification_count
            ),
        });
    }
    if record.turn_count >= channel_policy.max_turns_before_escalation {
        return Some(EscalationTrigger {
            check: "max_turns",
            reason: format!("Turn limit reached ({})", record.turn_count),
        });
    }

    None
}

/// The enriched summary handed to the human agent: urgency, risk,
/// language, sentiment, customer stage, turn count.
pub fn build_summary(
    trigger_reason: &str,
    analysis: &VocAnalysis,
    response: &AgentResponse,
    record: &ConversationRecord,
) -> String {
    let mut parts = vec![trigger_reason.to_owned()];

    parts.push(format!("Urgency: {}", analysis.urgency.level.as_str()));

    if !analysis.risk_flags.is_empty() {
        let flags: Vec<&str> = analysis.risk_flags.iter().map(|f| f.as_str()).collect();
        parts.push(format!("Risk Flags: {}", flags.join(", ")));
    }

    if let Some(lang) = analysis.primary_language() {
        if lang.code != "en" {
            parts.push(format!("Language: {}", lang.code));
        }
    }

    if let Some(sentiment) = &response.sentiment {
        parts.push(format!(
            "Sentiment: {} ({:.2})",
            sentiment.label, sentiment.score
        ));
    }

    if let Some(stage) = &response.customer_stage {
        parts.push(format!("Customer Stage: {stage}"));
    }

    parts.push(format!("Turns: {}", record.turn_count));

    parts.join(" | ")
}
