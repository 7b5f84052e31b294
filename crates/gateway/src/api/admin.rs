//! Admin surface: flow CRUD, dependency health, metrics, audit
//! verification. Everything here sits behind [`AdminGuard`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use rv_stores::audit::{AuditCategory, NewAuditEvent};

use super::guard::AdminGuard;
use crate::state::AppState;

const FLOW_PREFIX: &str = "resolvr:flows:";

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A flow definition is opaque to the core: the flow-builder UI owns
/// its schema, we just store and govern it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub definition: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FlowBody {
    pub name: String,
    #[serde(default)]
    pub definition: Value,
}

async fn load_flow(state: &AppState, id: &str) -> Option<Flow> {
    let raw = state.backend.get(&format!("{FLOW_PREFIX}{id}")).await.ok()??;
    serde_json::from_str(&raw).ok()
}

async fn store_flow(state: &AppState, flow: &Flow) -> bool {
    let Ok(raw) = serde_json::to_string(flow) else {
        return false;
    };
    state
        .backend
        .set(&format!("{FLOW_PREFIX}{}", flow.id), raw, None)
        .await
        .is_ok()
}

fn audit_flow_change(state: &AppState, action: &str, flow_id: &str) {
    state.audit.append(NewAuditEvent {
        actor: "admin".into(),
        action: action.into(),
        category: AuditCategory::ConfigChange,
        conversation_id: None,
        tenant_id: None,
        details: serde_json::json!({ "flow_id": flow_id }),
    });
}

/// `GET /admin/flows`
pub async fn list_flows(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    let keys = state.backend.keys(FLOW_PREFIX).await.unwrap_or_default();
    let mut flows = Vec::new();
    for key in keys {
        if let Ok(Some(raw)) = state.backend.get(&key).await {
            if let Ok(flow) = serde_json::from_str::<Flow>(&raw) {
                flows.push(flow);
            }
        }
    }
    flows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Json(serde_json::json!({ "flows": flows })).into_response()
}

/// `GET /admin/flows/:id`
pub async fn get_flow(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match load_flow(&state, &id).await {
        Some(flow) => Json(flow).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "flow not found"),
    }
}

/// `POST /admin/flows`
pub async fn create_flow(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Json(body): Json<FlowBody>,
) -> impl IntoResponse {
    let now = Utc::now();
    let flow = Flow {
        id: uuid::Uuid::new_v4().to_string(),
        name: body.name,
        definition: body.definition,
        created_at: now,
        updated_at: now,
    };
    if !store_flow(&state, &flow).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "flow store failed");
    }
    audit_flow_change(&state, "flow_created", &flow.id);
    (StatusCode::CREATED, Json(flow)).into_response()
}

/// `PUT /admin/flows/:id`
pub async fn update_flow(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FlowBody>,
) -> impl IntoResponse {
    let Some(mut flow) = load_flow(&state, &id).await else {
        return api_error(StatusCode::NOT_FOUND, "flow not found");
    };
    flow.name = body.name;
    flow.definition = body.definition;
    flow.updated_at = Utc::now();
    if !store_flow(&state, &flow).await {
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "flow store failed");
    }
    audit_flow_change(&state, "flow_updated", &id);
    Json(flow).into_response()
}

/// `DELETE /admin/flows/:id`
pub async fn delete_flow(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if load_flow(&state, &id).await.is_none() {
        return api_error(StatusCode::NOT_FOUND, "flow not found");
    }
    let _ = state.backend.del(&format!("{FLOW_PREFIX}{id}")).await;
    audit_flow_change(&state, "flow_deleted", &id);
    Json(serde_json::json!({ "deleted": id })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Health / metrics / audit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `GET /admin/health` — circuit breaker snapshot + degradation level.
pub async fn health(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "degradation": state.tools.health().degradation_level(),
        "dependencies": state.tools.health().snapshot(),
        "cache": state.cache.stats().await,
        "active_conversations": state.locks.conversation_count(),
    }))
}

/// `GET /admin/metrics` — counter snapshot.
pub async fn metrics(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "counters": state.metrics.snapshot() }))
}

/// `GET /admin/audit/verify` — hash chain integrity.
pub async fn verify_audit(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    Json(state.audit.verify_integrity(None))
}

/// `DELETE /admin/conversations/:id` — GDPR erasure: purge the
/// conversation's vault tokens and delete the record.
pub async fn gdpr_purge(
    _guard: AdminGuard,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    let existed = state.conversations.get(&conversation_id).await.is_some();
    let purged_tokens = state.vault.purge(&conversation_id).await;
    state.conversations.delete(&conversation_id).await;

    state.audit.append(NewAuditEvent {
        actor: "admin".into(),
        action: "conversation_erased".into(),
        category: AuditCategory::Gdpr,
        conversation_id: Some(conversation_id.clone()),
        tenant_id: None,
        details: serde_json::json!({ "purged_tokens": purged_tokens, "record_existed": existed }),
    });

    Json(serde_json::json!({
        "conversation_id": conversation_id,
        "purged_tokens": purged_tokens,
        "record_deleted": existed,
    }))
    .into_response()
}
