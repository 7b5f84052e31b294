//! Risk flags, evaluated independently of urgency.

use rv_domain::voc::RiskFlag;

const LEGAL: &[&str] = &[
    "consumer court", "legal action", "legal notice", "lawyer", "sue you", "court case",
    "consumer forum", "fir",
];
const SOCIAL: &[&str] = &[
    "twitter", "x.com", "instagram", "facebook", "linkedin", "viral", "social media",
    "post about this", "review bomb", "expose you",
];
const POLICY_EXCEPTION: &[&str] = &[
    "make an exception", "bend the rules", "just this once", "special case",
    "out of policy", "against policy", "exception for me",
];

/// Intents too generic to count towards a repeat-complaint pattern.
const TRIVIAL_INTENTS: &[&str] = &["", "greeting", "chitchat", "thanks", "goodbye", "unknown"];

pub struct RiskRules;

impl RiskRules {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate all flags for one message.
    pub fn evaluate(&self, text: &str, previous_intents: &[String]) -> Vec<RiskFlag> {
        let lowered = text.to_lowercase();
        let mut flags = Vec::new();

        if LEGAL.iter().any(|k| lowered.contains(k)) {
            flags.push(RiskFlag::LegalThreat);
        }
        if SOCIAL.iter().any(|k| lowered.contains(k)) {
            flags.push(RiskFlag::SocialMediaThreat);
        }
        if POLICY_EXCEPTION.iter().any(|k| lowered.contains(k)) {
            flags.push(RiskFlag::PolicyExceptionRequested);
        }
        if has_repeat_complaint(previous_intents) {
            flags.push(RiskFlag::RepeatComplaint);
        }

        flags
    }
}

impl Default for RiskRules {
    fn default() -> Self {
        Self::new()
    }
}

/// The same non-trivial intent appearing twice or more marks a repeat
/// complaint.
fn has_repeat_complaint(previous_intents: &[String]) -> bool {
    for (i, intent) in previous_intents.iter().enumerate() {
        if TRIVIAL_INTENTS.contains(&intent.to_lowercase().as_str()) {
            continue;
        }
        let occurrences = previous_intents[i..]
            .iter()
            .filter(|other| other.eq_ignore_ascii_case(intent))
            .count();
        if occurrences >= 2 {
            return true;
        }
    }
    false
}
