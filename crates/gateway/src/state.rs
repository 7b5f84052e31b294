//! Shared application state passed to all API handlers and the
//! orchestrator.

use std::sync::Arc;

use rv_agent::AgentCore;
use rv_domain::config::Config;
use rv_stores::{AuditChain, CacheStore, ConversationStore, CustomerSessionIndex, KvBackend, PiiVault};
use rv_tools::ToolRuntime;
use rv_voc::VocProcessor;

use crate::collaborators::{ChannelOutbound, CustomerDirectory, Ticketing};
use crate::metrics::Metrics;
use crate::runtime::cancel::CancelMap;
use crate::runtime::conversation_lock::ConversationLockMap;
use crate::runtime::experiment::ExperimentEngine;
use crate::runtime::learning::{LearningCollector, VocLog};
use crate::runtime::linker::CustomerLinker;
use crate::runtime::proactive::ProactiveChecker;
use crate::runtime::skills::SkillRouter;
use crate::runtime::sla::SlaEngine;

/// Everything one message needs, behind `Arc`s so handlers and spawned
/// pipelines share the same services.
///
/// Grouped by concern:
/// - **Stores** — KV backend, conversations, cache, vault, audit, index
/// - **Analysis** — VOC processor
/// - **Execution** — tool runtime, agent core
/// - **Collaborators** — outbound, ticketing, customer directory
/// - **Runtime** — SLA, experiments, locks, cancellation, sinks
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Stores ────────────────────────────────────────────────────────
    pub backend: Arc<dyn KvBackend>,
    pub conversations: Arc<ConversationStore>,
    pub cache: Arc<CacheStore>,
    pub vault: Arc<PiiVault>,
    pub audit: Arc<AuditChain>,
    pub customer_index: Arc<CustomerSessionIndex>,

    // ── Analysis ──────────────────────────────────────────────────────
    pub voc: Arc<VocProcessor>,

    // ── Execution ─────────────────────────────────────────────────────
    pub tools: Arc<ToolRuntime>,
    pub agent: Arc<AgentCore>,

    // ── Collaborators ─────────────────────────────────────────────────
    pub outbound: Arc<dyn ChannelOutbound>,
    pub ticketing: Arc<dyn Ticketing>,
    pub customers: Arc<dyn CustomerDirectory>,

    // ── Runtime services ──────────────────────────────────────────────
    pub linker: Arc<CustomerLinker>,
    pub proactive: Arc<ProactiveChecker>,
    pub sla: Arc<SlaEngine>,
    pub experiments: Arc<ExperimentEngine>,
    pub skills: Arc<SkillRouter>,
    pub locks: Arc<ConversationLockMap>,
    pub cancel: Arc<CancelMap>,
    pub learning: Arc<LearningCollector>,
    pub voc_log: Arc<VocLog>,
    pub metrics: Arc<Metrics>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 of the admin API key, computed once at startup.
    /// `None` = dev mode: admin endpoints accept every request.
    pub admin_key_hash: Option<Vec<u8>>,
}
