//! The VOC (voice-of-customer) pre-processor.
//!
//! Fast deterministic NLU that runs before the LLM on every inbound
//! message: language detection, entity extraction, urgency
//! classification, and risk flagging. Pure — the same text and context
//! always produce the same analysis — and synchronous, targeting well
//! under ten milliseconds per message.

mod entities;
mod language;
mod risk;
mod urgency;

use std::collections::HashMap;

use rv_domain::config::{Config, UrgencyElevation};
use rv_domain::voc::VocAnalysis;

/// Per-message context the caller supplies alongside the raw text.
#[derive(Debug, Clone, Default)]
pub struct VocContext {
    pub turn_count: u32,
    pub clarification_count: u32,
    pub previous_intents: Vec<String>,
}

/// The pre-processor. All patterns are compiled once at construction;
/// [`VocProcessor::analyze`] allocates only its output.
pub struct VocProcessor {
    shared: entities::SharedPatterns,
    order_patterns: HashMap<String, regex::Regex>,
    default_order: regex::Regex,
    elevations: HashMap<String, UrgencyElevation>,
    default_elevation: UrgencyElevation,
    urgency: urgency::UrgencyRules,
    risk: risk::RiskRules,
}

impl VocProcessor {
    pub fn new(config: &Config) -> Self {
        let shared = entities::SharedPatterns::new();
        let default_policy = rv_domain::config::TenantPolicy::default();

        let mut order_patterns = HashMap::new();
        let mut elevations = HashMap::new();
        for (tenant, policy) in &config.tenants {
            order_patterns.insert(
                tenant.clone(),
                entities::order_pattern(&policy.order_prefixes),
            );
            elevations.insert(tenant.clone(), policy.urgency);
        }

        Self {
            shared,
            order_patterns,
            default_order: entities::order_pattern(&default_policy.order_prefixes),
            elevations,
            default_elevation: default_policy.urgency,
            urgency: urgency::UrgencyRules::new(),
            risk: risk::RiskRules::new(),
        }
    }

    /// Analyze one message.
    pub fn analyze(&self, tenant_id: &str, text: &str, ctx: &VocContext) -> VocAnalysis {
        let order_pattern = self
            .order_patterns
            .get(tenant_id)
            .unwrap_or(&self.default_order);
        let elevation = self
            .elevations
            .get(tenant_id)
            .unwrap_or(&self.default_elevation);

        let detected_languages = language::detect(text);
        let entities = self.shared.extract(order_pattern, text);
        let urgency = self.urgency.classify(text, ctx, elevation);
        let risk_flags = self.risk.evaluate(text, &ctx.previous_intents);

        VocAnalysis {
            detected_languages,
            entities,
            urgency,
            risk_flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_domain::voc::{EntityType, RiskFlag, UrgencyLevel};

    fn processor() -> VocProcessor {
        VocProcessor::new(&Config::default())
    }

    #[test]
    fn analyze_is_pure() {
        let p = processor();
        let ctx = VocContext {
            turn_count: 12,
            clarification_count: 2,
            previous_intents: vec!["refund_request".into(), "refund_request".into()],
        };
        let text = "status of Q2593VU? call me at 9876543210, this is urgent";
        let a = p.analyze("default", text, &ctx);
        let b = p.analyze("default", text, &ctx);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn full_analysis_of_a_hot_message() {
        let p = processor();
        let ctx = VocContext::default();
        let analysis = p.analyze(
            "default",
            "I will file a consumer court case. Order Q2593VU still not delivered!",
            &ctx,
        );
        assert_eq!(analysis.urgency.level, UrgencyLevel::Critical);
        assert!(analysis.has_flag(RiskFlag::LegalThreat));
        let orders: Vec<_> = analysis.entities_of(EntityType::OrderNumber).collect();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].value, "Q2593VU");
    }

    #[test]
    fn unknown_tenant_uses_default_prefixes() {
        let p = processor();
        let analysis = p.analyze("nobody", "where is ORD-12345?", &VocContext::default());
        let orders: Vec<_> = analysis.entities_of(EntityType::OrderNumber).collect();
        assert_eq!(orders.len(), 1);
    }
}
