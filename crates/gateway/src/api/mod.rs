//! HTTP surface assembly.

pub mod admin;
pub mod copilot;
pub mod guard;
pub mod inbound;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

/// Build the full router: inbound, admin, copilot.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state);

    Router::new()
        // ── Inbound ───────────────────────────────────────────────
        .route("/v1/messages", post(inbound::receive_message))
        .route(
            "/v1/conversations/:id/cancel",
            post(inbound::cancel_conversation),
        )
        // ── Admin ─────────────────────────────────────────────────
        .route("/admin/flows", get(admin::list_flows).post(admin::create_flow))
        .route(
            "/admin/flows/:id",
            get(admin::get_flow)
                .put(admin::update_flow)
                .delete(admin::delete_flow),
        )
        .route("/admin/conversations/:id", axum::routing::delete(admin::gdpr_purge))
        .route("/admin/health", get(admin::health))
        .route("/admin/metrics", get(admin::metrics))
        .route("/admin/audit/verify", get(admin::verify_audit))
        // ── Copilot ───────────────────────────────────────────────
        .route("/copilot/suggest", post(copilot::suggest))
        .route("/copilot/context/:conversation_id", get(copilot::context))
        .route("/copilot/execute-action", post(copilot::execute_action))
        .route("/copilot/knowledge-search", post(copilot::knowledge_search))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
