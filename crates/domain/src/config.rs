use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::voc::{RiskFlag, UrgencyLevel};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pii: PiiConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub ticketing: TicketingConfig,
    #[serde(default)]
    pub customers: CustomerDirectoryConfig,
    #[serde(default)]
    pub experiments: ExperimentsConfig,
    #[serde(default)]
    pub skill_routing: SkillRoutingConfig,
    /// Per-tenant policy (key = tenant id). Unknown tenants fall back to
    /// `TenantPolicy::default()`.
    #[serde(default)]
    pub tenants: HashMap<String, TenantPolicy>,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides for
    /// secrets.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("{}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| crate::Error::Config(format!("{}: {e}", path.display())))?;
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides — secrets never live in the config file.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RESOLVR_ADMIN_KEY") {
            self.admin.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RESOLVR_PII_KEY") {
            self.pii.key_material = Some(v);
        }
        if let Ok(v) = std::env::var("RESOLVR_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("RESOLVR_REDIS_URL") {
            self.storage.redis_url = Some(v);
        }
    }

    /// Validate and collect issues. Startup aborts on any `Error`.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.admin.api_key.is_none() {
            issues.push(ConfigIssue::warning(
                "admin.api_key is not set — admin endpoints are open (dev mode)",
            ));
        }
        match &self.pii.key_material {
            None => issues.push(ConfigIssue::warning(
                "pii.key_material is not set — vault key derives from an ephemeral default; \
                 tokens will not survive restarts",
            )),
            Some(k) if k.len() < 32 => issues.push(ConfigIssue::warning(
                "pii.key_material is shorter than 32 bytes",
            )),
            Some(_) => {}
        }
        if self.llm.base_url.is_empty() {
            issues.push(ConfigIssue::error("llm.base_url must be set"));
        }
        if self.confidence.high <= self.confidence.medium {
            issues.push(ConfigIssue::error(
                "confidence.high must be greater than confidence.medium",
            ));
        }
        for (tenant, policy) in &self.tenants {
            if policy.max_clarifications == 0 {
                issues.push(ConfigIssue::warning(format!(
                    "tenants.{tenant}.max_clarifications is 0 — every low-confidence turn escalates"
                )));
            }
        }
        issues
    }

    /// Policy for a tenant, falling back to the defaults.
    pub fn tenant(&self, tenant_id: &str) -> TenantPolicy {
        self.tenants.get(tenant_id).cloned().unwrap_or_default()
    }

    /// A copy safe to print: every secret field is masked. Used by
    /// `config show` so keys never land on stdout or in a pastebin.
    pub fn redacted(&self) -> Config {
        fn mask(secret: &mut Option<String>) {
            if secret.is_some() {
                *secret = Some("[redacted]".into());
            }
        }

        let mut config = self.clone();
        mask(&mut config.admin.api_key);
        mask(&mut config.pii.key_material);
        mask(&mut config.llm.api_key);
        mask(&mut config.ticketing.api_key);
        mask(&mut config.customers.api_key);
        mask(&mut config.tools.oms.api_key);
        mask(&mut config.tools.tracking.api_key);
        mask(&mut config.tools.payment.api_key);
        mask(&mut config.tools.knowledge.api_key);
        mask(&mut config.channels.web.webhook_secret);
        mask(&mut config.channels.whatsapp.webhook_secret);
        mask(&mut config.channels.business_chat.webhook_secret);
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Warning, message: message.into() }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Error, message: message.into() }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Origins allowed for CORS. Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8140,
            host: "127.0.0.1".into(),
            allowed_origins: d_cors_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Entry cap for the bounded in-memory backend.
    #[serde(default = "d_10000")]
    pub max_entries: usize,
    /// Periodic eviction interval for the in-memory backend.
    #[serde(default = "d_60")]
    pub eviction_interval_secs: u64,
    /// Conversation record TTL.
    #[serde(default = "d_86400")]
    pub conversation_ttl_secs: u64,
    /// When set, an external durable KV transport is expected to be
    /// injected at startup; the in-memory backend is the fallback.
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            eviction_interval_secs: 60,
            conversation_ttl_secs: 86_400,
            redis_url: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PII vault / admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PiiConfig {
    /// Key material the 32-byte AES key is derived from (SHA-256).
    /// Usually supplied via `RESOLVR_PII_KEY`.
    #[serde(default)]
    pub key_material: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// Shared secret for the `x-admin-key` header. Usually supplied via
    /// `RESOLVR_ADMIN_KEY`. `None` = dev mode, no auth enforced.
    #[serde(default)]
    pub api_key: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_20000")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Default system-prompt version; experiments may override per
    /// conversation.
    #[serde(default = "d_prompt_version")]
    pub prompt_version: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_url(),
            api_key: None,
            model: d_model(),
            timeout_ms: 20_000,
            max_retries: 2,
            prompt_version: d_prompt_version(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools & back-office endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Hard per-handler timeout.
    #[serde(default = "d_15")]
    pub execution_timeout_secs: u64,
    #[serde(default = "d_30")]
    pub default_rate_limit_per_minute: u32,
    /// Consecutive failures before a dependency circuit opens.
    #[serde(default = "d_5")]
    pub circuit_failure_threshold: u32,
    /// How long an open circuit stays open.
    #[serde(default = "d_30000")]
    pub circuit_reset_ms: u64,
    /// Feature flags gating tools per deployment.
    #[serde(default)]
    pub feature_flags: HashMap<String, bool>,
    #[serde(default)]
    pub oms: BackofficeEndpoint,
    #[serde(default)]
    pub tracking: BackofficeEndpoint,
    #[serde(default)]
    pub payment: BackofficeEndpoint,
    #[serde(default)]
    pub knowledge: BackofficeEndpoint,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: 15,
            default_rate_limit_per_minute: 30,
            circuit_failure_threshold: 5,
            circuit_reset_ms: 30_000,
            feature_flags: HashMap::new(),
            oms: BackofficeEndpoint::default(),
            tracking: BackofficeEndpoint::default(),
            payment: BackofficeEndpoint::default(),
            knowledge: BackofficeEndpoint::default(),
        }
    }
}

/// Connection details for one back-office API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackofficeEndpoint {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
}

impl Default for BackofficeEndpoint {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_ms: 8_000,
            max_retries: 2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SLA & confidence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Time-to-first-response / time-to-resolution thresholds for one tier,
/// in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlaTier {
    pub ttfr_secs: u64,
    pub ttr_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    #[serde(default = "d_tier_standard")]
    pub standard: SlaTier,
    #[serde(default = "d_tier_priority")]
    pub priority: SlaTier,
    #[serde(default = "d_tier_vip")]
    pub vip: SlaTier,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            standard: d_tier_standard(),
            priority: d_tier_priority(),
            vip: d_tier_vip(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "d_conf_high")]
    pub high: f64,
    #[serde(default = "d_conf_medium")]
    pub medium: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self { high: 0.8, medium: 0.5 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channels / ticketing / customers / experiments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub web: ChannelEndpoint,
    #[serde(default)]
    pub whatsapp: ChannelEndpoint,
    #[serde(default)]
    pub business_chat: ChannelEndpoint,
}

impl ChannelsConfig {
    pub fn endpoint(&self, channel: crate::channel::Channel) -> &ChannelEndpoint {
        match channel {
            crate::channel::Channel::Web => &self.web,
            crate::channel::Channel::Whatsapp => &self.whatsapp,
            crate::channel::Channel::BusinessChat => &self.business_chat,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    /// Where outbound messages for this channel are POSTed.
    #[serde(default)]
    pub outbound_url: Option<String>,
    /// When set, inbound webhooks for this channel must carry a valid
    /// HMAC-SHA256 signature.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "d_30")]
    pub max_turns_before_escalation: u32,
    #[serde(default)]
    pub supports_rich_media: bool,
}

impl Default for ChannelEndpoint {
    fn default() -> Self {
        Self {
            outbound_url: None,
            webhook_secret: None,
            max_turns_before_escalation: 30,
            supports_rich_media: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    /// Create a ticket as soon as a conversation leaves `NEW`.
    #[serde(default = "d_true")]
    pub auto_create_on_new: bool,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_ms: 8_000,
            auto_create_on_new: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDirectoryConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
}

impl Default for CustomerDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExperimentsConfig {
    /// Prompt-version rollout: variant name → percentage of
    /// conversations (0–100). Remainder uses `llm.prompt_version`.
    #[serde(default)]
    pub prompt_version_rollout: HashMap<String, u8>,
}

/// Escalation routing to human agent queues by language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRoutingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Language code → queue name (e.g. `hi` → `hindi_support`).
    #[serde(default)]
    pub language_queues: HashMap<String, String>,
    #[serde(default = "d_queue")]
    pub default_queue: String,
}

impl Default for SkillRoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            language_queues: HashMap::new(),
            default_queue: d_queue(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tenant policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPolicy {
    /// Intents that always escalate for this tenant.
    #[serde(default)]
    pub escalation_intents: Vec<String>,
    #[serde(default = "d_urgency_auto")]
    pub urgency_auto_escalate: Vec<UrgencyLevel>,
    #[serde(default = "d_risk_auto")]
    pub risk_flag_auto_escalate: Vec<RiskFlag>,
    #[serde(default = "d_sentiment_threshold")]
    pub sentiment_escalation_threshold: f64,
    #[serde(default = "d_frustration")]
    pub frustration_keywords: Vec<String>,
    #[serde(default = "d_2")]
    pub max_clarifications: u32,
    /// Order-number prefixes recognized by entity extraction.
    #[serde(default = "d_order_prefixes")]
    pub order_prefixes: Vec<String>,
    #[serde(default)]
    pub urgency: UrgencyElevation,
    #[serde(default = "d_true")]
    pub auto_create_ticket: bool,
}

impl Default for TenantPolicy {
    fn default() -> Self {
        Self {
            escalation_intents: Vec::new(),
            urgency_auto_escalate: d_urgency_auto(),
            risk_flag_auto_escalate: d_risk_auto(),
            sentiment_escalation_threshold: d_sentiment_threshold(),
            frustration_keywords: d_frustration(),
            max_clarifications: 2,
            order_prefixes: d_order_prefixes(),
            urgency: UrgencyElevation::default(),
            auto_create_ticket: true,
        }
    }
}

/// Urgency elevation bounds (tenant-tunable).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UrgencyElevation {
    /// Turn count past which a low-urgency conversation becomes medium.
    #[serde(default = "d_10")]
    pub long_conversation_turns: u32,
    /// Clarification count past which urgency bumps one level.
    #[serde(default = "d_1")]
    pub clarification_bump_after: u32,
}

impl Default for UrgencyElevation {
    fn default() -> Self {
        Self {
            long_conversation_turns: 10,
            clarification_bump_after: 1,
        }
    }
}

// ── serde default helpers ────────────────────────────────────────────

fn d_port() -> u16 { 8140 }
fn d_host() -> String { "127.0.0.1".into() }
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:8140".into(), "http://127.0.0.1:8140".into()]
}
fn d_llm_url() -> String { "https://api.openai.com/v1".into() }
fn d_model() -> String { "gpt-4o-mini".into() }
fn d_prompt_version() -> String { "v2".into() }
fn d_1() -> u32 { 1 }
fn d_2() -> u32 { 2 }
fn d_5() -> u32 { 5 }
fn d_10() -> u32 { 10 }
fn d_15() -> u64 { 15 }
fn d_30() -> u32 { 30 }
fn d_60() -> u64 { 60 }
fn d_8000() -> u64 { 8_000 }
fn d_20000() -> u64 { 20_000 }
fn d_30000() -> u64 { 30_000 }
fn d_86400() -> u64 { 86_400 }
fn d_10000() -> usize { 10_000 }
fn d_true() -> bool { true }
fn d_conf_high() -> f64 { 0.8 }
fn d_conf_medium() -> f64 { 0.5 }
fn d_sentiment_threshold() -> f64 { -0.7 }
fn d_tier_standard() -> SlaTier { SlaTier { ttfr_secs: 120, ttr_secs: 86_400 } }
fn d_tier_priority() -> SlaTier { SlaTier { ttfr_secs: 60, ttr_secs: 14_400 } }
fn d_tier_vip() -> SlaTier { SlaTier { ttfr_secs: 30, ttr_secs: 3_600 } }
fn d_urgency_auto() -> Vec<UrgencyLevel> {
    vec![UrgencyLevel::Critical]
}
fn d_risk_auto() -> Vec<RiskFlag> {
    vec![
        RiskFlag::LegalThreat,
        RiskFlag::SocialMediaThreat,
        RiskFlag::PolicyExceptionRequested,
        RiskFlag::RepeatComplaint,
    ]
}
fn d_frustration() -> Vec<String> {
    [
        "useless", "ridiculous", "worst", "pathetic", "fed up", "waste of time",
        "never again", "horrible",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn d_order_prefixes() -> Vec<String> {
    vec!["Q".into(), "ORD".into(), "OD".into()]
}
fn d_queue() -> String {
    "general_support".into()
}
