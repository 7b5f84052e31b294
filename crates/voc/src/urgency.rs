//! Urgency classification: keyword classes, first match wins, then
//! context elevations.

use rv_domain::config::UrgencyElevation;
use rv_domain::voc::{Urgency, UrgencyLevel};

use crate::VocContext;

const CRITICAL: &[&str] = &[
    "consumer court", "legal action", "legal notice", "lawyer", "sue you", "police",
    "fraud", "scam", "court case", "fir",
];
const HIGH: &[&str] = &[
    "urgent", "immediately", "asap", "right now", "emergency", "today itself",
    "need it today",
];
const MEDIUM: &[&str] = &[
    "still waiting", "still not", "delayed", "no update", "very late", "been days",
];

pub struct UrgencyRules;

impl UrgencyRules {
    pub fn new() -> Self {
        Self
    }

    /// Classify urgency for one message. First matching class wins;
    /// context can only elevate, never lower.
    pub fn classify(
        &self,
        text: &str,
        ctx: &VocContext,
        elevation: &UrgencyElevation,
    ) -> Urgency {
        let lowered = text.to_lowercase();
        let mut signals = Vec::new();

        let mut level = if CRITICAL.iter().any(|k| lowered.contains(k)) {
            signals.push("legal_threat_keywords".to_owned());
            UrgencyLevel::Critical
        } else if HIGH.iter().any(|k| lowered.contains(k)) {
            signals.push("urgency_keywords".to_owned());
            UrgencyLevel::High
        } else if MEDIUM.iter().any(|k| lowered.contains(k)) {
            signals.push("delay_keywords".to_owned());
            UrgencyLevel::Medium
        } else {
            UrgencyLevel::Low
        };

        // Long conversations stop being "low" urgency.
        if ctx.turn_count > elevation.long_conversation_turns && level == UrgencyLevel::Low {
            level = UrgencyLevel::Medium;
            signals.push("long_conversation".to_owned());
        }

        // Repeated clarification means we are failing the customer.
        if ctx.clarification_count > elevation.clarification_bump_after {
            level = level.bumped();
            signals.push("repeated_clarification".to_owned());
        }

        Urgency { level, signals }
    }
}

impl Default for UrgencyRules {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str, ctx: &VocContext) -> Urgency {
        UrgencyRules::new().classify(text, ctx, &UrgencyElevation::default())
    }

    #[test]
    fn first_match_wins_by_severity() {
        let ctx = VocContext::default();
        assert_eq!(
            classify("I will go to consumer court, this is urgent", &ctx).level,
            UrgencyLevel::Critical
        );
        assert_eq!(classify("need this urgent please", &ctx).level, UrgencyLevel::High);
        assert_eq!(classify("still waiting for it", &ctx).level, UrgencyLevel::Medium);
        assert_eq!(classify("what colors do you have", &ctx).level, UrgencyLevel::Low);
    }

    #[test]
    fn long_conversation_elevates_low_only() {
        let ctx = VocContext { turn_count: 11, ..Default::default() };
        let result = classify("what colors do you have", &ctx);
        assert_eq!(result.level, UrgencyLevel::Medium);
        assert!(result.signals.contains(&"long_conversation".to_string()));

        // An already-high message stays high, without the signal.
        let high = classify("need this urgent please", &ctx);
        assert_eq!(high.level, UrgencyLevel::High);
        assert!(!high.signals.contains(&"long_conversation".to_string()));
    }

    #[test]
    fn repeated_clarification_bumps_one_level() {
        let ctx = VocContext { clarification_count: 2, ..Default::default() };
        let result = classify("still waiting for it", &ctx);
        assert_eq!(result.level, UrgencyLevel::High);
        assert!(result.signals.contains(&"repeated_clarification".to_string()));
    }

    #[test]
    fn single_clarification_does_not_bump() {
        let ctx = VocContext { clarification_count: 1, ..Default::default() };
        assert_eq!(classify("still waiting for it", &ctx).level, UrgencyLevel::Medium);
    }

    #[test]
    fn bump_saturates_at_critical() {
        let ctx = VocContext { clarification_count: 3, ..Default::default() };
        assert_eq!(
            classify("I got a legal notice ready", &ctx).level,
            UrgencyLevel::Critical
        );
    }
}
