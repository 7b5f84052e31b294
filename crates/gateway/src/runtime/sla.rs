//! SLA tier assignment and TTFR/TTR tracking.
//!
//! One record per conversation at `resolvr:sla:<id>`, plus the
//! `resolvr:sla:active` set the breach sweep walks. All operations are
//! best-effort: SLA bookkeeping never blocks the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rv_domain::config::SlaConfig;
use rv_domain::conversation::ConversationRecord;
use rv_domain::trace::TraceEvent;
use rv_stores::KvBackend;

const RECORD_TTL: Duration = Duration::from_secs(7 * 86_400);
const ACTIVE_KEY: &str = "resolvr:sla:active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaTierName {
    Standard,
    Priority,
    Vip,
}

impl SlaTierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaTierName::Standard => "standard",
            SlaTierName::Priority => "priority",
            SlaTierName::Vip => "vip",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaRecord {
    pub conversation_id: String,
    pub tier: SlaTierName,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub first_response_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ttfr_breached: bool,
    #[serde(default)]
    pub ttr_breached: bool,
}

pub struct SlaEngine {
    backend: Arc<dyn KvBackend>,
    config: SlaConfig,
}

impl SlaEngine {
    pub fn new(backend: Arc<dyn KvBackend>, config: SlaConfig) -> Self {
        Self { backend, config }
    }

    fn key(conversation_id: &str) -> String {
        format!("resolvr:sla:{conversation_id}")
    }

    /// Tier from customer attributes: an explicit vip flag wins, a
    /// meaningful order history earns priority, everyone else is
    /// standard.
    pub fn assign_tier(record: &ConversationRecord, profile: Option<&Value>) -> SlaTierName {
        let vip_flag = profile
            .and_then(|p| p.get("vip"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || record
                .structured_memory
                .custom_fields
                .get("vip")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        if vip_flag {
            return SlaTierName::Vip;
        }

        let lifetime_orders = profile
            .and_then(|p| p.get("lifetime_orders"))
            .and_then(Value::as_u64)
            .unwrap_or(record.structured_memory.order_numbers.len() as u64);
        if lifetime_orders >= 10 {
            SlaTierName::Priority
        } else {
            SlaTierName::Standard
        }
    }

    /// Start (or keep) the SLA record for a conversation.
    pub async fn assign(&self, conversation_id: &str, tier: SlaTierName) {
        if self.load(conversation_id).await.is_some() {
            return;
        }
        let record = SlaRecord {
            conversation_id: conversation_id.to_owned(),
            tier,
            started_at: Utc::now(),
            first_response_at: None,
            resolved_at: None,
            ttfr_breached: false,
            ttr_breached: false,
        };
        self.store(&record).await;
        self.add_active(conversation_id).await;
        TraceEvent::SlaAssigned {
            conversation_id: conversation_id.to_owned(),
            tier: tier.as_str().to_owned(),
        }
        .emit();
    }

    pub async fn record_first_response(&self, conversation_id: &str) {
        if let Some(mut record) = self.load(conversation_id).await {
            if record.first_response_at.is_none() {
                record.first_response_at = Some(Utc::now());
                self.store(&record).await;
            }
        }
    }

    pub async fn record_resolution(&self, conversation_id: &str) {
        if let Some(mut record) = self.load(conversation_id).await {
            if record.resolved_at.is_none() {
                record.resolved_at = Some(Utc::now());
                self.store(&record).await;
            }
        }
        self.remove_active(conversation_id).await;
    }

    /// Check thresholds for one conversation, emitting an alert per
    /// newly-breached metric. Returns the breached metric names.
    pub async fn check_breaches(&self, conversation_id: &str) -> Vec<&'static str> {
        let Some(mut record) = self.load(conversation_id).await else {
            return Vec::new();
        };
        let thresholds = match record.tier {
            SlaTierName::Standard => self.config.standard,
            SlaTierName::Priority => self.config.priority,
            SlaTierName::Vip => self.config.vip,
        };
        let now = Utc::now();
        let mut breached = Vec::new();

        if !record.ttfr_breached && record.first_response_at.is_none() {
            let elapsed = (now - record.started_at).num_seconds().max(0) as u64;
            if elapsed > thresholds.ttfr_secs {
                record.ttfr_breached = true;
                breached.push("ttfr");
                TraceEvent::SlaBreach {
                    conversation_id: conversation_id.to_owned(),
                    tier: record.tier.as_str().to_owned(),
                    metric: "ttfr".into(),
                    elapsed_secs: elapsed,
                }
                .emit();
            }
        }

        if !record.ttr_breached && record.resolved_at.is_none() {
            let elapsed = (now - record.started_at).num_seconds().max(0) as u64;
            if elapsed > thresholds.ttr_secs {
                record.ttr_breached = true;
                breached.push("ttr");
                TraceEvent::SlaBreach {
                    conversation_id: conversation_id.to_owned(),
                    tier: record.tier.as_str().to_owned(),
                    metric: "ttr".into(),
                    elapsed_secs: elapsed,
                }
                .emit();
            }
        }

        if !breached.is_empty() {
            self.store(&record).await;
        }
        breached
    }

    pub async fn active_conversations(&self) -> Vec<String> {
        match self.backend.get(ACTIVE_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    // ── Private ──────────────────────────────────────────────────────

    async fn load(&self, conversation_id: &str) -> Option<SlaRecord> {
        let raw = self.backend.get(&Self::key(conversation_id)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    async fn store(&self, record: &SlaRecord) {
        let Ok(raw) = serde_json::to_string(record) else {
            return;
        };
        if let Err(e) = self
            .backend
            .set(&Self::key(&record.conversation_id), raw, Some(RECORD_TTL))
            .await
        {
            tracing::warn!(conversation_id = %record.conversation_id, error = %e, "sla store failed");
        }
    }

    async fn add_active(&self, conversation_id: &str) {
        let mut active = self.active_conversations().await;
        if !active.iter().any(|id| id == conversation_id) {
            active.push(conversation_id.to_owned());
            let Ok(raw) = serde_json::to_string(&active) else {
                return;
            };
            let _ = self.backend.set(ACTIVE_KEY, raw, None).await;
        }
    }

    async fn remove_active(&self, conversation_id: &str) {
        let mut active = self.active_conversations().await;
        active.retain(|id| id != conversation_id);
        let Ok(raw) = serde_json::to_string(&active) else {
            return;
        };
        let _ = self.backend.set(ACTIVE_KEY, raw, None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_domain::channel::Channel;
    use rv_stores::InMemoryKv;

    fn engine(config: SlaConfig) -> SlaEngine {
        SlaEngine::new(Arc::new(InMemoryKv::new(100)), config)
    }

    #[test]
    fn vip_flag_wins() {
        let record = ConversationRecord::new("c1", "default", Channel::Web);
        let profile = serde_json::json!({"vip": true, "lifetime_orders": 1});
        assert_eq!(
            SlaEngine::assign_tier(&record, Some(&profile)),
            SlaTierName::Vip
        );
    }

    #[test]
    fn order_history_earns_priority() {
        let record = ConversationRecord::new("c1", "default", Channel::Web);
        let profile = serde_json::json!({"lifetime_orders": 12});
        assert_eq!(
            SlaEngine::assign_tier(&record, Some(&profile)),
            SlaTierName::Priority
        );
        assert_eq!(
            SlaEngine::assign_tier(&record, None),
            SlaTierName::Standard
        );
    }

    #[tokio::test]
    async fn assign_is_idempotent() {
        let engine = engine(SlaConfig::default());
        engine.assign("c1", SlaTierName::Vip).await;
        engine.assign("c1", SlaTierName::Standard).await;
        let record = engine.load("c1").await.unwrap();
        assert_eq!(record.tier, SlaTierName::Vip);
        assert_eq!(engine.active_conversations().await, vec!["c1"]);
    }

    #[tokio::test]
    async fn breach_fires_once() {
        let config = SlaConfig {
            standard: rv_domain::config::SlaTier { ttfr_secs: 0, ttr_secs: 0 },
            ..Default::default()
        };
        let engine = engine(config);
        engine.assign("c1", SlaTierName::Standard).await;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let first = engine.check_breaches("c1").await;
        assert_eq!(first, vec!["ttfr", "ttr"]);
        let second = engine.check_breaches("c1").await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn resolution_leaves_active_set() {
        let engine = engine(SlaConfig::default());
        engine.assign("c1", SlaTierName::Standard).await;
        engine.assign("c2", SlaTierName::Standard).await;
        engine.record_resolution("c1").await;
        assert_eq!(engine.active_conversations().await, vec!["c2"]);
    }

    #[tokio::test]
    async fn first_response_within_threshold_never_breaches_ttfr() {
        let engine = engine(SlaConfig::default());
        engine.assign("c1", SlaTierName::Standard).await;
        engine.record_first_response("c1").await;
        let breaches = engine.check_breaches("c1").await;
        assert!(!breaches.contains(&"ttfr"));
    }
}
