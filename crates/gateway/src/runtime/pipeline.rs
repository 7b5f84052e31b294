//! The per-message orchestration pipeline.
//!
//! [`Orchestrator::handle_message`] threads one inbound message through
//! load/link, ticketing, SLA, VOC, proactive checks, prefetch, the
//! agent, confidence routing, escalation policy, tool execution,
//! refinement, memory merge, persistence, outbound send, and audit.
//! Every step is individually guarded: a failing step logs, degrades,
//! and the pipeline continues — except the first agent pass, which has
//! no degraded outcome when no static fallback exists.

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;

use rv_agent::{build_tool_results_fallback, generic_fallback, static_fallback, AgentInput};
use rv_domain::channel::InboundMessage;
use rv_domain::contract::{AgentResponse, ToolCallRequest};
use rv_domain::conversation::{CachedOrder, ConversationRecord, ConversationState, TurnRole};
use rv_domain::tool::ExecutedTool;
use rv_domain::trace::TraceEvent;
use rv_domain::voc::{EntityType, VocRecord};
use rv_domain::Result;
use rv_stores::audit::{AuditCategory, NewAuditEvent};
use rv_tools::ToolContext;
use rv_voc::VocContext;

use crate::collaborators::{CreateTicket, UpdateTicket};
use crate::runtime::cancel::CancelToken;
use crate::runtime::learning::LearningSample;
use crate::runtime::prefetch::PrefetchMap;
use crate::runtime::sla::SlaEngine;
use crate::runtime::{confidence, escalation, state_machine};
use crate::state::AppState;

/// Entity confidence below which we do not prefetch.
const PREFETCH_CONFIDENCE: f64 = 0.9;

/// What one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub request_id: String,
    pub reply: Option<String>,
    pub state: ConversationState,
    pub escalated: bool,
    pub cancelled: bool,
}

pub struct Orchestrator {
    state: AppState,
}

impl Orchestrator {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn handle_message(
        &self,
        inbound: InboundMessage,
        cancel: &CancelToken,
        request_id: &str,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let state = &self.state;
        let conversation_id = inbound.conversation_id.clone();
        let policy = state.config.tenant(&inbound.tenant_id);
        let channel_policy = state.config.channels.endpoint(inbound.channel).clone();

        // ── 1. Load or create; link on create ───────────────────────
        let mut record = state.conversations.get(&conversation_id).await;
        let is_new = record.is_none();
        let mut record = record.take().unwrap_or_else(|| {
            let mut r =
                ConversationRecord::new(&conversation_id, &inbound.tenant_id, inbound.channel);
            r.visitor_id = inbound.visitor_id.clone();
            r
        });
        if is_new {
            state
                .linker
                .link_new_conversation(&mut record, &inbound.user_profile)
                .instrument(tracing::info_span!("step.link", %conversation_id))
                .await;
        }

        // ── 2. Ticket creation ───────────────────────────────────────
        if record.state == ConversationState::New
            && record.ticket_id.is_none()
            && policy.auto_create_ticket
            && state.config.ticketing.auto_create_on_new
        {
            match state
                .ticketing
                .create_ticket(CreateTicket {
                    conversation_id: conversation_id.clone(),
                    tenant_id: inbound.tenant_id.clone(),
                    subject: preview(&inbound.message.text, 80),
                    channel: inbound.channel,
                })
                .instrument(tracing::info_span!("step.ticket_create", %conversation_id))
                .await
            {
                Ok(ticket_id) => record.ticket_id = Some(ticket_id),
                Err(e) => tracing::warn!(
                    %conversation_id, request_id, error = %e,
                    "ticket creation failed; continuing without a ticket"
                ),
            }
        }

        // ── 3. SLA tier assignment ───────────────────────────────────
        let tier = SlaEngine::assign_tier(&record, None);
        state.sla.assign(&conversation_id, tier).await;

        // ── 4. Append the user turn; merge the inbound profile ───────
        record.append_turn(TurnRole::User, &inbound.message.text);
        record.structured_memory.merge_profile(&inbound.user_profile);

        // ── 5. Typing indicator (fire-and-forget) ────────────────────
        {
            let outbound = state.outbound.clone();
            let id = conversation_id.clone();
            let channel = inbound.channel;
            tokio::spawn(async move {
                if let Err(e) = outbound.send_typing(&id, channel).await {
                    tracing::warn!(conversation_id = %id, error = %e, "typing indicator failed");
                }
            });
        }

        // ── 6. VOC pre-processing ────────────────────────────────────
        let voc_started = Instant::now();
        let voc_message_id = format!("{}-{}", conversation_id, record.turn_count);
        let voc_ctx = VocContext {
            turn_count: record.turn_count,
            clarification_count: record.clarification_count,
            previous_intents: record.previous_intents(),
        };
        let analysis =
            state
                .voc
                .analyze(&inbound.tenant_id, &inbound.message.text, &voc_ctx);
        TraceEvent::VocProcessed {
            conversation_id: conversation_id.clone(),
            language: analysis
                .primary_language()
                .map(|l| l.code.clone())
                .unwrap_or_default(),
            urgency: analysis.urgency.level.as_str().to_owned(),
            entity_count: analysis.entities.len(),
            risk_flags: analysis.risk_flags.iter().map(|f| f.as_str().to_owned()).collect(),
            duration_us: voc_started.elapsed().as_micros() as u64,
        }
        .emit();
        state
            .metrics
            .incr_labeled("voc.urgency", analysis.urgency.level.as_str());

        // Extracted contact details go into the vault; the record and
        // everything downstream reference the opaque tokens.
        for entity in &analysis.entities {
            let (pii_type, severity) = match entity.entity_type {
                EntityType::Phone => ("phone", rv_stores::PiiSeverity::High),
                EntityType::Email => ("email", rv_stores::PiiSeverity::Medium),
                _ => continue,
            };
            let field = format!("pii_{pii_type}");
            if record.structured_memory.custom_fields.contains_key(&field) {
                continue;
            }
            match state
                .vault
                .tokenize(&conversation_id, pii_type, severity, &entity.value)
                .await
            {
                Ok(token) => {
                    record
                        .structured_memory
                        .custom_fields
                        .insert(field, Value::String(token));
                    state.audit.append(NewAuditEvent {
                        actor: "orchestrator".into(),
                        action: "pii_tokenized".into(),
                        category: AuditCategory::PiiTokenize,
                        conversation_id: Some(conversation_id.clone()),
                        tenant_id: Some(inbound.tenant_id.clone()),
                        details: serde_json::json!({ "pii_type": pii_type }),
                    });
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "pii tokenization failed");
                }
            }
        }

        let tool_ctx = ToolContext::for_conversation(
            &inbound.tenant_id,
            inbound.channel,
            &conversation_id,
            request_id,
        );

        // ── 7. Proactive checks ──────────────────────────────────────
        let proactive_context = state
            .proactive
            .check(&analysis, &record.structured_memory, &tool_ctx)
            .instrument(tracing::info_span!("step.proactive", %conversation_id))
            .await;

        // ── 8. Customer-360 + experiment resolution ──────────────────
        let customer_context = match &record.customer_id {
            Some(customer_id) => match state.customers.fetch_profile(customer_id).await {
                Ok(Some(profile)) => Some(profile.to_string()),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "customer profile fetch failed");
                    None
                }
            },
            None => None,
        };
        let prompt_version = state
            .experiments
            .prompt_version_for(&conversation_id, &state.config.llm.prompt_version);

        // ── 9. Prefetch likely lookups ───────────────────────────────
        let mut prefetch = PrefetchMap::new();
        for entity in &analysis.entities {
            if entity.confidence < PREFETCH_CONFIDENCE {
                continue;
            }
            let (key, args) = match entity.entity_type {
                EntityType::OrderNumber => (
                    PrefetchMap::key("order_no", &entity.value),
                    serde_json::json!({ "order_no": entity.value }),
                ),
                EntityType::Phone => (
                    PrefetchMap::key("phone", &entity.value),
                    serde_json::json!({ "phone": entity.value }),
                ),
                _ => continue,
            };
            let tools = state.tools.clone();
            let ctx = tool_ctx.clone();
            prefetch.spawn(key, async move {
                tools.execute("lookup_customer_orders", args, &ctx).await
            });
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(request_id, &record));
        }

        // ── 10. First agent pass ─────────────────────────────────────
        // The input borrows snapshots so the record stays mutable for
        // the steps in between.
        let history: Vec<_> = record.turns[..record.turns.len() - 1].to_vec();
        let memory_snapshot = record.structured_memory.clone();
        let agent_input = AgentInput {
            user_text: &inbound.message.text,
            history: &history,
            memory: &memory_snapshot,
            channel: inbound.channel,
            prompt_version: Some(&prompt_version),
            request_id,
            proactive_context: proactive_context.as_deref(),
            customer_context: customer_context.as_deref(),
        };

        // Under full degradation (three or more dependencies down) the
        // LLM is not consulted at all — static fallbacks only.
        let full_degradation =
            state.tools.health().degradation_level() == rv_tools::DegradationLevel::Full;
        let mut response = if full_degradation {
            tracing::warn!(%conversation_id, "full degradation; serving static fallback");
            let fallback = record
                .primary_intent
                .as_deref()
                .and_then(static_fallback)
                .unwrap_or_else(generic_fallback);
            TraceEvent::LlmFallbackUsed {
                conversation_id: conversation_id.clone(),
                intent: fallback.intent.clone(),
            }
            .emit();
            fallback
        } else {
            let agent_result = state
                .agent
                .process(&agent_input)
                .instrument(tracing::info_span!("step.agent", %conversation_id))
                .await;
            match agent_result {
                Ok(response) => response,
                Err(e) => {
                    let fallback = record
                        .primary_intent
                        .as_deref()
                        .and_then(static_fallback);
                    match fallback {
                        Some(fallback) => {
                            tracing::warn!(
                                %conversation_id, request_id, error = %e,
                                "agent pass failed; using static fallback"
                            );
                            TraceEvent::LlmFallbackUsed {
                                conversation_id: conversation_id.clone(),
                                intent: fallback.intent.clone(),
                            }
                            .emit();
                            fallback
                        }
                        None => {
                            tracing::error!(
                                %conversation_id, request_id, error = %e,
                                "agent pass failed with no fallback; dropping message"
                            );
                            return Err(e);
                        }
                    }
                }
            }
        };
        record.note_intent(&response.intent);
        record.structured_memory.intent = Some(response.intent.clone());

        // ── 11. Confidence routing ───────────────────────────────────
        confidence::apply(
            &mut response,
            record.clarification_count,
            &state.config.confidence,
            analysis.primary_language().map(|l| l.code.as_str()),
        );

        // ── 12. Escalation policy and state transition ───────────────
        let trigger = escalation::evaluate(
            &response,
            &analysis,
            &record,
            &policy,
            &channel_policy,
            &inbound.message.text,
        );
        if let Some(trigger) = &trigger {
            response.should_escalate = true;
            if response.escalation_reason.is_none() {
                response.escalation_reason = Some(trigger.reason.clone());
            }
            state.metrics.incr_labeled("escalation.reason", trigger.check);
            TraceEvent::EscalationTriggered {
                conversation_id: conversation_id.clone(),
                reason: trigger.check.to_owned(),
            }
            .emit();
        }
        let target =
            state_machine::resolve_target_state(record.state, &response.intent, response.should_escalate);
        if target != record.state && state_machine::transition(&mut record, target) {
            self.audit_state(&record, &inbound);
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(request_id, &record));
        }

        // ── 13. Execute tool calls (reusing prefetched results) ──────
        let mut executed: Vec<ExecutedTool> = Vec::new();
        if !response.tool_calls.is_empty() {
            let mut direct: Vec<ToolCallRequest> = Vec::new();
            for call in &response.tool_calls {
                if let Some(key) = prefetch_key_for(call) {
                    if let Some(result) = prefetch.take(&key).await {
                        executed.push(ExecutedTool {
                            tool: call.name.clone(),
                            args: call.args.clone(),
                            result,
                            duration_ms: 0,
                        });
                        continue;
                    }
                }
                direct.push(call.clone());
            }

            let futures = direct.iter().map(|call| {
                let tools = state.tools.clone();
                let ctx = tool_ctx.clone();
                let call = call.clone();
                async move {
                    let call_started = Instant::now();
                    let result = tools.execute(&call.name, call.args.clone(), &ctx).await;
                    ExecutedTool {
                        tool: call.name,
                        args: call.args,
                        result,
                        duration_ms: call_started.elapsed().as_millis() as u64,
                    }
                }
            });
            executed.extend(
                futures_util::future::join_all(futures)
                    .instrument(tracing::info_span!("step.tools", %conversation_id))
                    .await,
            );
        }

        // A successful human handoff escalates immediately.
        let handoff = executed
            .iter()
            .any(|e| e.tool == "handoff_to_human" && e.result.is_success());
        if handoff {
            response.should_escalate = true;
            if response.escalation_reason.is_none() {
                response.escalation_reason = Some("Agent handed off to a human".into());
            }
            state_machine::transition(&mut record, ConversationState::Escalated);
        }

        // ── 14. Fold order lookups into structured memory ────────────
        for executed_tool in &executed {
            if executed_tool.tool != "lookup_customer_orders" {
                continue;
            }
            let Some(data) = executed_tool.result.data() else {
                continue;
            };
            let Some(orders) = data.get("orders").and_then(Value::as_array) else {
                continue;
            };
            for order in orders {
                let Some(no) = order.get("order_no").and_then(Value::as_str) else {
                    continue;
                };
                record.structured_memory.record_order(
                    no,
                    CachedOrder {
                        data: order.clone(),
                        cached_at: Utc::now(),
                        source_phone: order
                            .get("_source_phone")
                            .and_then(Value::as_str)
                            .map(str::to_owned),
                    },
                );
            }
        }

        if cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(request_id, &record));
        }

        // ── 15. Fast path or refinement ──────────────────────────────
        let mut reply_text = response.user_facing_message.clone();
        if !executed.is_empty() {
            let all_fast_path = executed.iter().all(|e| {
                rv_tools::FAST_PATH_TOOLS.contains(&e.tool.as_str()) && e.result.is_success()
            });
            if all_fast_path {
                state.metrics.incr("agent.fast_path");
                reply_text = build_tool_results_fallback(&executed);
            } else if full_degradation {
                reply_text = build_tool_results_fallback(&executed);
            } else {
                match state
                    .agent
                    .process_with_tool_results(&agent_input, &executed, &response.user_facing_message)
                    .instrument(tracing::info_span!("step.refine", %conversation_id))
                    .await
                {
                    Ok(refined) => {
                        let escalate = response.should_escalate;
                        let reason = response.escalation_reason.clone();
                        response = refined;
                        response.should_escalate |= escalate;
                        if response.escalation_reason.is_none() {
                            response.escalation_reason = reason;
                        }
                        reply_text = response.user_facing_message.clone();
                    }
                    Err(e) => {
                        tracing::warn!(
                            %conversation_id, request_id, error = %e,
                            "refinement failed; using template formatter"
                        );
                        reply_text = build_tool_results_fallback(&executed);
                    }
                }
            }
        }

        // ── 16. Merge extracted fields into memory ───────────────────
        merge_extracted_fields(&mut record, &response);

        // ── 17. Ticket update (best-effort) ──────────────────────────
        if let (Some(ticket_id), Some(payload)) =
            (record.ticket_id.clone(), response.ticket_update_payload.clone())
        {
            let update = UpdateTicket {
                summary: payload.summary,
                tags: payload.tags,
                status: payload.status,
                lead_fields: serde_json::to_value(payload.lead_fields).unwrap_or(Value::Null),
                intent_classification: payload.intent_classification,
            };
            if let Err(e) = state
                .ticketing
                .update_ticket(&ticket_id, update)
                .instrument(tracing::info_span!("step.ticket_update", %conversation_id))
                .await
            {
                tracing::warn!(%conversation_id, error = %e, "ticket update failed");
            }
        }

        // ── 18. Append the assistant turn ────────────────────────────
        record.append_turn(TurnRole::Assistant, &reply_text);
        if response.is_clarification() {
            record.clarification_count += 1;
        }

        // ── 19. Persist; hand terminal conversations to learning ─────
        let escalated = record.state == ConversationState::Escalated;
        if record.is_terminal() && record.ended_at.is_none() {
            record.ended_at = Some(Utc::now());
            record.ended_by = Some(if escalated { "escalation" } else { "assistant" }.into());
        }
        state
            .conversations
            .save(&mut record)
            .instrument(tracing::info_span!("step.save", %conversation_id))
            .await;
        if let Some(customer_id) = &record.customer_id {
            state.customer_index.record(customer_id, &conversation_id).await;
        }

        let voc_record = VocRecord {
            message_id: voc_message_id,
            conversation_id: conversation_id.clone(),
            tenant_id: inbound.tenant_id.clone(),
            analysis: analysis.clone(),
            intent: Some(response.intent.clone()),
            sentiment_score: response.sentiment.as_ref().map(|s| s.score),
            created_at: Utc::now(),
        };
        state.voc_log.save(voc_record.clone());

        if record.is_terminal() {
            let mut voc_records = state.voc_log.for_conversation(&conversation_id).await;
            voc_records.push(voc_record);
            state.learning.collect(LearningSample {
                record: record.clone(),
                voc_records,
            });
        }

        // ── 20. Outbound send ────────────────────────────────────────
        let mut sent = false;
        if let Some(payload) = &response.channel_payload {
            if channel_policy.supports_rich_media {
                match state
                    .outbound
                    .send_rich_message(&conversation_id, payload, inbound.channel)
                    .await
                {
                    Ok(()) => sent = true,
                    Err(e) => {
                        tracing::warn!(%conversation_id, error = %e, "rich send failed; falling back to text");
                    }
                }
            }
        }
        if !sent {
            if let Err(e) = state
                .outbound
                .send_message(&conversation_id, &reply_text, inbound.channel)
                .instrument(tracing::info_span!("step.outbound", %conversation_id))
                .await
            {
                tracing::warn!(%conversation_id, request_id, error = %e, "outbound send failed");
            }
        }

        if escalated {
            let reason = response
                .escalation_reason
                .clone()
                .unwrap_or_else(|| "Escalated".into());
            let summary = escalation::build_summary(&reason, &analysis, &response, &record);
            if let Err(e) = state
                .outbound
                .escalate_to_human(&conversation_id, &reason, &summary, inbound.channel)
                .await
            {
                tracing::warn!(%conversation_id, error = %e, "escalation handoff send failed");
            }
            self.audit_escalation(&record, &inbound, &reason, &summary);
        }

        // ── 21. SLA bookkeeping ──────────────────────────────────────
        if record.turn_count == 2 {
            state.sla.record_first_response(&conversation_id).await;
        }
        if record.is_terminal() {
            state.sla.record_resolution(&conversation_id).await;
        }
        let breaches = state.sla.check_breaches(&conversation_id).await;
        for metric in breaches {
            state.metrics.incr_labeled("sla.breach", metric);
        }

        // ── 22. Audit trail ──────────────────────────────────────────
        let duration_ms = started.elapsed().as_millis() as u64;
        state.audit.append(NewAuditEvent {
            actor: "orchestrator".into(),
            action: "message_processed".into(),
            category: AuditCategory::Conversation,
            conversation_id: Some(conversation_id.clone()),
            tenant_id: Some(inbound.tenant_id.clone()),
            details: serde_json::json!({
                "channel": inbound.channel.as_str(),
                "state": record.state.as_str(),
                "escalated": escalated,
                "tools_executed": executed.len(),
                "duration_ms": duration_ms,
            }),
        });

        // ── 23. Skill routing for escalations ────────────────────────
        if escalated {
            if let Some(queue) = state.skills.route(&analysis) {
                state.metrics.incr_labeled("escalation.queue", &queue);
                tracing::info!(%conversation_id, queue, "escalation routed by skills");
            }
        }

        TraceEvent::MessageProcessed {
            conversation_id: conversation_id.clone(),
            tenant_id: inbound.tenant_id.clone(),
            channel: inbound.channel.as_str().to_owned(),
            state: record.state.as_str().to_owned(),
            escalated,
            duration_ms,
        }
        .emit();
        state.metrics.incr("messages.processed");

        Ok(PipelineOutcome {
            request_id: request_id.to_owned(),
            reply: Some(reply_text),
            state: record.state,
            escalated,
            cancelled: false,
        })
    }

    fn cancelled_outcome(&self, request_id: &str, record: &ConversationRecord) -> PipelineOutcome {
        tracing::info!(
            conversation_id = %record.conversation_id,
            request_id,
            "pipeline cancelled; no reply sent, record not saved"
        );
        PipelineOutcome {
            request_id: request_id.to_owned(),
            reply: None,
            state: record.state,
            escalated: false,
            cancelled: true,
        }
    }

    fn audit_state(&self, record: &ConversationRecord, inbound: &InboundMessage) {
        self.state.audit.append(NewAuditEvent {
            actor: "orchestrator".into(),
            action: "state_transition".into(),
            category: AuditCategory::StateTransition,
            conversation_id: Some(record.conversation_id.clone()),
            tenant_id: Some(inbound.tenant_id.clone()),
            details: serde_json::json!({ "state": record.state.as_str() }),
        });
    }

    fn audit_escalation(
        &self,
        record: &ConversationRecord,
        inbound: &InboundMessage,
        reason: &str,
        summary: &str,
    ) {
        self.state.audit.append(NewAuditEvent {
            actor: "orchestrator".into(),
            action: "conversation_escalated".into(),
            category: AuditCategory::Escalation,
            conversation_id: Some(record.conversation_id.clone()),
            tenant_id: Some(inbound.tenant_id.clone()),
            details: serde_json::json!({ "reason": reason, "summary": summary }),
        });
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let truncated: String = text.chars().take(max).collect();
        format!("{truncated}…")
    }
}

/// The prefetch key a tool call can be served from, if any.
fn prefetch_key_for(call: &ToolCallRequest) -> Option<String> {
    if call.name != "lookup_customer_orders" {
        return None;
    }
    if let Some(order_no) = call.args.get("order_no").and_then(Value::as_str) {
        return Some(PrefetchMap::key("order_no", &order_no.to_uppercase()));
    }
    if let Some(phone) = call.args.get("phone").and_then(Value::as_str) {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let normalized = if digits.len() == 12 && digits.starts_with("91") {
            digits[2..].to_owned()
        } else {
            digits
        };
        return Some(PrefetchMap::key("phone", &normalized));
    }
    None
}

/// Fold agent-extracted fields into memory: known fields fill empty
/// slots, everything else lands in `custom_fields`.
fn merge_extracted_fields(record: &mut ConversationRecord, response: &AgentResponse) {
    for (key, value) in &response.extracted_fields {
        let as_str = value.as_str().map(str::to_owned);
        let memory = &mut record.structured_memory;
        match key.as_str() {
            "name" => {
                if memory.name.is_none() {
                    memory.name = as_str;
                }
            }
            "email" => {
                if memory.email.is_none() {
                    memory.email = as_str;
                }
            }
            "phone" => {
                if memory.phone.is_none() {
                    memory.phone = as_str;
                }
            }
            "company" => {
                if memory.company.is_none() {
                    memory.company = as_str;
                }
            }
            "product_interest" => {
                if let Some(items) = value.as_array() {
                    for item in items.iter().filter_map(Value::as_str) {
                        if !memory.product_interest.iter().any(|p| p == item) {
                            memory.product_interest.push(item.to_owned());
                        }
                    }
                }
            }
            _ => {
                memory.custom_fields.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefetch_keys_normalize() {
        let call = ToolCallRequest {
            name: "lookup_customer_orders".into(),
            args: serde_json::json!({ "order_no": "q2593vu" }),
        };
        assert_eq!(prefetch_key_for(&call).as_deref(), Some("order_no:Q2593VU"));

        let call = ToolCallRequest {
            name: "lookup_customer_orders".into(),
            args: serde_json::json!({ "phone": "+91 98765 43210" }),
        };
        assert_eq!(prefetch_key_for(&call).as_deref(), Some("phone:9876543210"));

        let call = ToolCallRequest {
            name: "track_shipment".into(),
            args: serde_json::json!({ "awb": "1" }),
        };
        assert!(prefetch_key_for(&call).is_none());
    }

    #[test]
    fn extracted_fields_fill_known_slots_once() {
        let mut record = ConversationRecord::new(
            "c1",
            "default",
            rv_domain::channel::Channel::Web,
        );
        record.structured_memory.name = Some("Asha".into());
        let mut response = AgentResponse::default();
        response
            .extracted_fields
            .insert("name".into(), Value::String("Someone Else".into()));
        response
            .extracted_fields
            .insert("email".into(), Value::String("a@b.co".into()));
        response
            .extracted_fields
            .insert("pincode".into(), Value::String("560001".into()));

        merge_extracted_fields(&mut record, &response);
        assert_eq!(record.structured_memory.name.as_deref(), Some("Asha"));
        assert_eq!(record.structured_memory.email.as_deref(), Some("a@b.co"));
        assert_eq!(
            record.structured_memory.custom_fields["pincode"],
            Value::String("560001".into())
        );
    }
}
