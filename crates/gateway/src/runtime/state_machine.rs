//! The conversation state transition table and intent→state mapping.

use rv_domain::conversation::{ConversationRecord, ConversationState};
use rv_domain::trace::TraceEvent;

use ConversationState::*;

/// Whether `from → to` is a legal transition. Terminal states accept
/// nothing; `New` is never re-entered; everything else may move between
/// the active states or terminate.
pub fn allowed(from: ConversationState, to: ConversationState) -> bool {
    if from == to {
        return true;
    }
    match from {
        Resolved | Escalated => false,
        _ => to != New,
    }
}

/// Where the conversation should go for this turn.
///
/// Escalation wins outright; otherwise the per-turn intent maps to a
/// state, and generic intents keep the current state (promoting `New`
/// to `ActiveQa`).
pub fn resolve_target_state(
    current: ConversationState,
    intent: &str,
    should_escalate: bool,
) -> ConversationState {
    if should_escalate {
        return Escalated;
    }
    match intent.to_lowercase().as_str() {
        "order_status" | "order_inquiry" | "order_modification" => OrderInquiry,
        "shipment_tracking" | "tracking" | "where_is_my_order" => ShipmentTracking,
        "refund_request" | "return_request" | "refund" | "return" | "exchange" => ReturnRefund,
        "product_inquiry" | "product_question" | "availability" => ProductInquiry,
        "lead_inquiry" | "lead" | "bulk_order" => LeadQualification,
        "meeting_request" | "book_meeting" | "demo_request" => MeetingBooking,
        "complaint" | "payment_issue" | "support" => SupportTriage,
        "resolved" => Resolved,
        _ => {
            if current == New {
                ActiveQa
            } else {
                current
            }
        }
    }
}

/// Apply a transition. Illegal targets are a logged no-op.
pub fn transition(record: &mut ConversationRecord, target: ConversationState) -> bool {
    if record.state == target {
        return true;
    }
    if !allowed(record.state, target) {
        TraceEvent::TransitionRejected {
            conversation_id: record.conversation_id.clone(),
            from: record.state.as_str().to_owned(),
            to: target.as_str().to_owned(),
        }
        .emit();
        return false;
    }
    TraceEvent::StateTransition {
        conversation_id: record.conversation_id.clone(),
        from: record.state.as_str().to_owned(),
        to: target.as_str().to_owned(),
    }
    .emit();
    record.state = target;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_domain::channel::Channel;

    #[test]
    fn escalation_always_wins() {
        assert_eq!(resolve_target_state(OrderInquiry, "greeting", true), Escalated);
        assert_eq!(resolve_target_state(New, "order_status", true), Escalated);
    }

    #[test]
    fn new_promotes_to_active_qa_on_generic_intent() {
        assert_eq!(resolve_target_state(New, "greeting", false), ActiveQa);
        assert_eq!(resolve_target_state(New, "chitchat", false), ActiveQa);
    }

    #[test]
    fn generic_intent_keeps_current_state() {
        assert_eq!(resolve_target_state(OrderInquiry, "clarification", false), OrderInquiry);
    }

    #[test]
    fn intents_map_to_states() {
        assert_eq!(resolve_target_state(ActiveQa, "order_status", false), OrderInquiry);
        assert_eq!(resolve_target_state(ActiveQa, "shipment_tracking", false), ShipmentTracking);
        assert_eq!(resolve_target_state(ActiveQa, "refund_request", false), ReturnRefund);
        assert_eq!(resolve_target_state(ActiveQa, "complaint", false), SupportTriage);
    }

    #[test]
    fn terminal_states_reject_everything() {
        assert!(!allowed(Resolved, ActiveQa));
        assert!(!allowed(Escalated, OrderInquiry));
        assert!(allowed(Resolved, Resolved));
    }

    #[test]
    fn new_is_never_reentered() {
        assert!(!allowed(ActiveQa, New));
        assert!(!allowed(OrderInquiry, New));
    }

    #[test]
    fn illegal_transition_is_a_noop() {
        let mut record = ConversationRecord::new("c1", "default", Channel::Web);
        record.state = Resolved;
        assert!(!transition(&mut record, ActiveQa));
        assert_eq!(record.state, Resolved);
    }

    #[test]
    fn legal_transition_applies() {
        let mut record = ConversationRecord::new("c1", "default", Channel::Web);
        assert!(transition(&mut record, ActiveQa));
        assert_eq!(record.state, ActiveQa);
        assert!(transition(&mut record, OrderInquiry));
        assert_eq!(record.state, OrderInquiry);
    }
}
