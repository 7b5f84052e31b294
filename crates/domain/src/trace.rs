use serde::Serialize;

/// Structured trace events emitted across all Resolvr crates.
///
/// Each event serializes to one JSON object logged under the `rv_event`
/// field, so downstream log pipelines can filter and aggregate without
/// parsing message strings.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    MessageProcessed {
        conversation_id: String,
        tenant_id: String,
        channel: String,
        state: String,
        escalated: bool,
        duration_ms: u64,
    },
    VocProcessed {
        conversation_id: String,
        language: String,
        urgency: String,
        entity_count: usize,
        risk_flags: Vec<String>,
        duration_us: u64,
    },
    ToolExecuted {
        tool: String,
        version: String,
        status: String,
        duration_ms: u64,
        cached: bool,
        retried: bool,
    },
    ToolValidationFailed {
        tool: String,
        detail: String,
    },
    ToolCacheHit {
        tool: String,
    },
    LlmRequest {
        model: String,
        prompt_version: String,
        refinement: bool,
        duration_ms: u64,
    },
    LlmFallbackUsed {
        conversation_id: String,
        intent: String,
    },
    StateTransition {
        conversation_id: String,
        from: String,
        to: String,
    },
    TransitionRejected {
        conversation_id: String,
        from: String,
        to: String,
    },
    EscalationTriggered {
        conversation_id: String,
        reason: String,
    },
    PrefetchReused {
        key: String,
    },
    CircuitOpened {
        dependency: String,
        consecutive_failures: u32,
    },
    CircuitClosed {
        dependency: String,
    },
    SlaAssigned {
        conversation_id: String,
        tier: String,
    },
    SlaBreach {
        conversation_id: String,
        tier: String,
        metric: String,
        elapsed_secs: u64,
    },
    ConversationLinked {
        conversation_id: String,
        customer_id: String,
        merged_from: String,
    },
    LearningCollected {
        conversation_id: String,
        state: String,
        voc_records: usize,
    },
    AuditAppendFailed {
        detail: String,
    },
    OutboundSent {
        conversation_id: String,
        channel: String,
        rich: bool,
    },
    BackgroundDropped {
        queue: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(rv_event = %json, "rv_event");
    }
}
