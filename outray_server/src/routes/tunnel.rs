//! Tunnel registration, availability, liveness, and teardown routes

use crate::allocator::Availability;
use crate::error::ControlError;
use crate::routes::{caller_orgs, caller_user, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Build the tunnel router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tunnel/register", post(register))
        .route("/api/tunnel/check-subdomain", post(check_subdomain))
        .route("/api/tunnel/heartbeat", post(heartbeat))
        .route("/api/tunnels/{tunnel_id}/stop", post(stop))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    subdomain: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    organization_id: String,
}

/// Register (or idempotently re-register) a tunnel for a subdomain
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<Value>, ControlError> {
    let registration = state
        .allocator
        .register(&body.subdomain, &body.user_id, &body.organization_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "tunnelId": registration.tunnel_id,
        "url": registration.url,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSubdomainRequest {
    #[serde(default)]
    subdomain: String,
    organization_id: Option<String>,
}

/// Pre-flight availability check for a subdomain label
async fn check_subdomain(
    State(state): State<AppState>,
    Json(body): Json<CheckSubdomainRequest>,
) -> Result<Json<Value>, ControlError> {
    let availability = state
        .allocator
        .check(&body.subdomain, body.organization_id.as_deref())
        .await?;

    Ok(Json(match availability {
        Availability::Available => json!({ "allowed": true, "status": "available" }),
        Availability::Owned => json!({ "allowed": true, "status": "owned" }),
        Availability::Taken => {
            json!({ "allowed": false, "status": "taken", "error": "Subdomain already taken" })
        }
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatRequest {
    #[serde(default)]
    tunnel_id: String,
}

/// Liveness signal from a data-plane node; refreshes `last_seen_at`
async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ControlError> {
    if body.tunnel_id.is_empty() {
        return Err(ControlError::Validation("Missing tunnelId".into()));
    }

    // Heartbeats go straight at the registry; no ownership check is needed
    // because the data-plane is a trusted collaborator.
    if !state.allocator.touch(&body.tunnel_id).await? {
        return Err(ControlError::NotFound("Tunnel"));
    }

    Ok(Json(json!({ "ok": true })))
}

/// Broadcast a kill directive for a live tunnel
async fn stop(
    State(state): State<AppState>,
    Path(tunnel_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ControlError> {
    let user = caller_user(&headers).ok_or(ControlError::Unauthorized)?;
    let orgs = caller_orgs(&headers);

    state.controller.stop(&tunnel_id, &user, &orgs).await?;
    Ok(Json(json!({ "stopped": true })))
}
