//! Custom domain routes: creation and ownership verification

use crate::error::ControlError;
use crate::routes::{caller_orgs, AppState};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use outray_common::constants;
use serde::Deserialize;
use serde_json::{json, Value};

/// Build the domains router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/domains", post(create))
        .route("/api/domains/{domain_id}/verify", post(verify))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDomainRequest {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    organization_id: String,
}

/// Add a custom domain in pending state and return the challenge record the
/// owner must publish
async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateDomainRequest>,
) -> Result<Json<Value>, ControlError> {
    if body.organization_id.is_empty() {
        return Err(ControlError::Validation("Missing organizationId".into()));
    }
    if !caller_orgs(&headers).contains(&body.organization_id) {
        return Err(ControlError::Unauthorized);
    }

    let domain = state.verifier.add(&body.domain, &body.organization_id).await?;
    Ok(Json(json!({
        "id": domain.id,
        "domain": domain.domain,
        "status": domain.status,
        "challenge": {
            "recordType": "TXT",
            "name": constants::challenge_record_name(&domain.domain),
            "value": domain.id,
        },
    })))
}

/// Run the DNS ownership challenge for a pending domain
async fn verify(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ControlError> {
    let orgs = caller_orgs(&headers);
    state.verifier.verify(&domain_id, &orgs).await?;
    Ok(Json(json!({ "verified": true })))
}
