//! Copilot surface: tools for the human agent console — draft a reply,
//! pull conversation context, run a governed action, search knowledge.
//! All behind [`AdminGuard`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use rv_agent::AgentInput;
use rv_domain::conversation::TurnRole;
use rv_domain::tool::AuthLevel;
use rv_stores::audit::{AuditCategory, AuditQuery, NewAuditEvent};
use rv_tools::ToolContext;

use super::guard::AdminGuard;
use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn service_ctx(tenant_id: &str, conversation_id: Option<&str>) -> ToolContext {
    ToolContext {
        tenant_id: tenant_id.to_owned(),
        channel: rv_domain::channel::Channel::Web,
        conversation_id: conversation_id.map(str::to_owned),
        request_id: uuid::Uuid::new_v4().to_string(),
        auth: AuthLevel::Service,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Suggest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SuggestBody {
    pub conversation_id: String,
}

/// `POST /copilot/suggest` — draft a reply for the human agent without
/// sending anything to the customer.
pub async fn suggest(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Json(body): Json<SuggestBody>,
) -> impl IntoResponse {
    let Some(record) = state.conversations.get(&body.conversation_id).await else {
        return api_error(StatusCode::NOT_FOUND, "conversation not found");
    };
    let Some(last_user_idx) = record.turns.iter().rposition(|t| t.role == TurnRole::User) else {
        return api_error(StatusCode::CONFLICT, "conversation has no user turns");
    };
    let last_user_turn = record.turns[last_user_idx].content.clone();

    let channel = record
        .source_channel
        .unwrap_or(rv_domain::channel::Channel::Web);
    let request_id = uuid::Uuid::new_v4().to_string();
    let input = AgentInput {
        user_text: &last_user_turn,
        history: &record.turns[..last_user_idx],
        memory: &record.structured_memory,
        channel,
        prompt_version: None,
        request_id: &request_id,
        proactive_context: None,
        customer_context: None,
    };

    match state.agent.process(&input).await {
        Ok(response) => Json(serde_json::json!({
            "suggestion": response.user_facing_message,
            "intent": response.intent,
            "confidence": response.confidence_score,
            "tool_calls": response.tool_calls,
        }))
        .into_response(),
        Err(e) => api_error(StatusCode::BAD_GATEWAY, format!("suggestion failed: {e}")),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GET /copilot/context/:conversation_id` — the record plus its recent
/// audit trail.
pub async fn context(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    let Some(record) = state.conversations.get(&conversation_id).await else {
        return api_error(StatusCode::NOT_FOUND, "conversation not found");
    };
    let audit = state.audit.query(&AuditQuery {
        conversation_id: Some(conversation_id.clone()),
        limit: Some(20),
        ..Default::default()
    });
    let voc = state.voc_log.for_conversation(&conversation_id).await;

    state.audit.append(NewAuditEvent {
        actor: "copilot".into(),
        action: "context_viewed".into(),
        category: AuditCategory::Copilot,
        conversation_id: Some(conversation_id),
        tenant_id: Some(record.tenant_id.clone()),
        details: Value::Null,
    });

    Json(serde_json::json!({
        "record": record,
        "audit": audit,
        "voc": voc,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execute action / knowledge search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ExecuteActionBody {
    pub conversation_id: String,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

fn default_tenant() -> String {
    "default".into()
}

/// `POST /copilot/execute-action` — run a governed tool on behalf of a
/// human agent.
pub async fn execute_action(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Json(body): Json<ExecuteActionBody>,
) -> impl IntoResponse {
    let ctx = service_ctx(&body.tenant_id, Some(&body.conversation_id));
    let result = state.tools.execute(&body.tool, body.args, &ctx).await;

    state.audit.append(NewAuditEvent {
        actor: "copilot".into(),
        action: "action_executed".into(),
        category: AuditCategory::Copilot,
        conversation_id: Some(body.conversation_id),
        tenant_id: Some(body.tenant_id),
        details: serde_json::json!({ "tool": body.tool, "success": result.is_success() }),
    });

    Json(result).into_response()
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeSearchBody {
    pub query: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

/// `POST /copilot/knowledge-search`
pub async fn knowledge_search(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Json(body): Json<KnowledgeSearchBody>,
) -> impl IntoResponse {
    let ctx = service_ctx(&body.tenant_id, None);
    let args = serde_json::json!({
        "query": body.query,
        "limit": body.limit.unwrap_or(5),
    });
    let result = state.tools.execute("search_knowledge_base", args, &ctx).await;
    Json(result).into_response()
}
