//! Escalation routing: pick the human agent queue by language.

use rv_domain::config::SkillRoutingConfig;
use rv_domain::voc::VocAnalysis;

pub struct SkillRouter {
    config: SkillRoutingConfig,
}

impl SkillRouter {
    pub fn new(config: SkillRoutingConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Queue for an escalated conversation, by detected language.
    pub fn route(&self, analysis: &VocAnalysis) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let queue = analysis
            .primary_language()
            .and_then(|lang| self.config.language_queues.get(&lang.code))
            .cloned()
            .unwrap_or_else(|| self.config.default_queue.clone());
        Some(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_domain::voc::{DetectedLanguage, Urgency, UrgencyLevel};

    fn analysis(code: &str) -> VocAnalysis {
        VocAnalysis {
            detected_languages: vec![DetectedLanguage {
                code: code.into(),
                confidence: 0.9,
                script: "latin".into(),
            }],
            entities: vec![],
            urgency: Urgency { level: UrgencyLevel::Low, signals: vec![] },
            risk_flags: vec![],
        }
    }

    #[test]
    fn disabled_router_routes_nowhere() {
        let router = SkillRouter::new(SkillRoutingConfig::default());
        assert!(router.route(&analysis("hi")).is_none());
    }

    #[test]
    fn language_queue_wins_over_default() {
        let mut config = SkillRoutingConfig { enabled: true, ..Default::default() };
        config
            .language_queues
            .insert("hi".into(), "hindi_support".into());
        let router = SkillRouter::new(config);
        assert_eq!(router.route(&analysis("hi")).as_deref(), Some("hindi_support"));
        assert_eq!(
            router.route(&analysis("en")).as_deref(),
            Some("general_support")
        );
    }
}
