//! The confidence router: decide per turn whether to answer, disclaim,
//! or escalate based on the model's self-reported confidence.

use rv_domain::config::ConfidenceConfig;
use rv_domain::contract::AgentResponse;

/// Soft disclaimers by reply language. Appended once — applying the
/// router twice to the same response changes nothing.
fn disclaimer_for(language: Option<&str>) -> &'static str {
    match language {
        Some("hi") => "\n\nकृपया ध्यान दें: मैं इसकी पूरी पुष्टि नहीं कर पाया, हमारी टीम जल्द ही confirm करेगी।",
        Some("hinglish") => "\n\nNote: main iski poori confirmation nahi de paya, hamari team jald confirm karegi.",
        _ => "\n\nPlease note: I couldn't fully verify this — our team will confirm shortly.",
    }
}

/// Route a response by confidence. Mutates the response in place.
///
/// - `score >= high`: pass through.
/// - `medium <= score < high`: append a localized soft disclaimer.
/// - `score < medium`, no clarifications yet: let it through once.
/// - `score < medium` after a clarification: escalate.
pub fn apply(
    response: &mut AgentResponse,
    clarification_count: u32,
    config: &ConfidenceConfig,
    language: Option<&str>,
) {
    let score = response.effective_confidence();

    if score >= config.high {
        return;
    }

    if score >= config.medium {
        let disclaimer = disclaimer_for(language);
        if !response.user_facing_message.ends_with(disclaimer) {
            response.user_facing_message.push_str(disclaimer);
        }
        return;
    }

    if clarification_count == 0 {
        return;
    }

    response.should_escalate = true;
    if response.escalation_reason.is_none() {
        response.escalation_reason = Some(format!(
            "Low confidence ({score:.2}) after clarification attempt"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(score: Option<f64>) -> AgentResponse {
        AgentResponse {
            user_facing_message: "Your order is on its way.".into(),
            confidence_score: score,
            ..Default::default()
        }
    }

    fn config() -> ConfidenceConfig {
        ConfidenceConfig::default()
    }

    #[test]
    fn high_confidence_passes_untouched() {
        let mut r = response(Some(0.92));
        apply(&mut r, 0, &config(), None);
        assert_eq!(r.user_facing_message, "Your order is on its way.");
        assert!(!r.should_escalate);
    }

    #[test]
    fn medium_confidence_gets_disclaimer() {
        let mut r = response(Some(0.6));
        apply(&mut r, 0, &config(), None);
        assert!(r.user_facing_message.contains("couldn't fully verify"));
        assert!(!r.should_escalate);
    }

    #[test]
    fn disclaimer_is_localized() {
        let mut r = response(Some(0.6));
        apply(&mut r, 0, &config(), Some("hinglish"));
        assert!(r.user_facing_message.contains("hamari team"));
    }

    #[test]
    fn low_confidence_first_attempt_passes() {
        let mut r = response(Some(0.4));
        apply(&mut r, 0, &config(), None);
        assert!(!r.should_escalate);
        assert_eq!(r.user_facing_message, "Your order is on its way.");
    }

    #[test]
    fn low_confidence_after_clarification_escalates() {
        let mut r = response(Some(0.4));
        apply(&mut r, 1, &config(), None);
        assert!(r.should_escalate);
        assert_eq!(
            r.escalation_reason.as_deref(),
            Some("Low confidence (0.40) after clarification attempt")
        );
    }

    #[test]
    fn missing_score_defaults_to_medium_band() {
        // 0.75 lands in the disclaimer band.
        let mut r = response(None);
        apply(&mut r, 0, &config(), None);
        assert!(r.user_facing_message.contains("couldn't fully verify"));
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let mut once = response(Some(0.6));
        apply(&mut once, 0, &config(), None);
        let mut twice = once.clone();
        apply(&mut twice, 0, &config(), None);
        assert_eq!(once.user_facing_message, twice.user_facing_message);

        let mut low_once = response(Some(0.3));
        apply(&mut low_once, 2, &config(), None);
        let mut low_twice = low_once.clone();
        apply(&mut low_twice, 2, &config(), None);
        assert_eq!(low_once.escalation_reason, low_twice.escalation_reason);
    }
}
