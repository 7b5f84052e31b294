//! The inbound message endpoint.
//!
//! `POST /v1/messages` accepts the channel-adapter contract, verifies
//! the per-channel HMAC signature when one is configured, reserves the
//! conversation's turn slot, and runs the pipeline on a spawned task —
//! the adapter gets its 202 immediately.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use rv_domain::channel::InboundMessage;

use crate::runtime::pipeline::Orchestrator;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// `POST /v1/messages`
pub async fn receive_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // 1. Parse the inbound contract.
    let inbound: InboundMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, format!("invalid message: {e}")),
    };

    // 2. Verify the channel signature when a secret is configured
    //    (GitHub-style: `x-resolvr-signature: sha256=<hex>`).
    if let Some(secret) = &state.config.channels.endpoint(inbound.channel).webhook_secret {
        let sig_header = headers
            .get("x-resolvr-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let sig_hex = sig_header.strip_prefix("sha256=").unwrap_or(sig_header);

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(&body);
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed.as_bytes().ct_eq(sig_hex.as_bytes()).unwrap_u8() != 1 {
            return api_error(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    // 3. Reserve the conversation's turn slot. One turn runs, one may
    //    queue; a third concurrent message is refused.
    let conversation_id = inbound.conversation_id.clone();
    let ticket = match state.locks.begin(&conversation_id) {
        Ok(t) => t,
        Err(_) => {
            return api_error(
                StatusCode::CONFLICT,
                "conversation is busy: a turn is running and another is queued",
            );
        }
    };

    // 4. Run the pipeline in the background, strictly ordered per
    //    conversation by the lock.
    let request_id = uuid::Uuid::new_v4().to_string();
    {
        let state = state.clone();
        let request_id = request_id.clone();
        let conversation_id = conversation_id.clone();
        tokio::spawn(async move {
            let _guard = ticket.acquire().await;
            let cancel = state.cancel.register(&conversation_id);
            let result = Orchestrator::new(state.clone())
                .handle_message(inbound, &cancel, &request_id)
                .await;
            state.cancel.remove(&conversation_id);
            if let Err(e) = result {
                tracing::error!(
                    %conversation_id,
                    request_id,
                    error = %e,
                    "pipeline failed without a reply"
                );
            }
        });
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "conversation_id": conversation_id,
            "request_id": request_id,
        })),
    )
        .into_response()
}

/// `POST /v1/conversations/:id/cancel` — abort an in-flight turn.
pub async fn cancel_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    if state.cancel.cancel(&conversation_id) {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "cancelled": true })),
        )
            .into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "no running turn for this conversation")
    }
}
