//! Consent capture for site visitors and revocation for staff.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::{AuthUser, ClientInfo, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Error;
use transcargo_privacy::crypto::is_user_hash;
use transcargo_privacy::{ConsentReceipt, RevokeOutcome};
use transcargo_store::{ConsentRecord, ConsentType};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/consents", post(record_consent))
        // The router allows one parameter name per segment: `{id}` is a user
        // hash for the two reads and a consent id for revoke.
        .route("/consents/{id}", get(consent_statuses))
        .route("/consents/{id}/records", get(consent_records))
        .route("/consents/{id}/revoke", post(revoke_consent))
}

#[derive(Deserialize)]
struct ConsentBody {
    email: String,
    phone: String,
    consent_type: ConsentType,
    #[serde(default)]
    policy_version: Option<String>,
}

async fn record_consent(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(body): Json<ConsentBody>,
) -> ApiResult<(StatusCode, Json<ConsentReceipt>)> {
    let result = state.consents.record_consent(
        &body.email,
        &body.phone,
        body.consent_type,
        client.ip.as_deref(),
        client.user_agent.as_deref(),
        body.policy_version.as_deref(),
    );
    state.audit.outcome(
        &client.context("anonymous"),
        "consent_created",
        "consent",
        result.as_ref().ok().map(|r| r.consent_id.as_str()),
        &result,
    );
    Ok((StatusCode::CREATED, Json(result?)))
}

async fn consent_statuses(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Path(user_hash): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let consents = state.audit.audited(
        &client.context("anonymous"),
        "consent_checked",
        "user",
        Some(&user_hash),
        || {
            if !is_user_hash(&user_hash) {
                return Err(Error::Validation("malformed user hash".into()));
            }
            state.consents.statuses(&user_hash)
        },
    )?;
    Ok(Json(serde_json::json!({
        "user_hash": user_hash,
        "consents": consents,
    })))
}

async fn consent_records(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(user_hash): Path<String>,
) -> ApiResult<Json<Vec<ConsentRecord>>> {
    user.require(Role::Manager)?;
    let records = state
        .audit
        .audited(&user.ctx, "consents_viewed", "user", Some(&user_hash), || {
            state.gdpr.consents(&user_hash)
        })?;
    Ok(Json(records))
}

async fn revoke_consent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(consent_id): Path<String>,
) -> ApiResult<Json<RevokeOutcome>> {
    user.require(Role::Viewer)?;
    let outcome = state
        .audit
        .audited(&user.ctx, "consent_revoked", "consent", Some(&consent_id), || {
            state.consents.revoke_with_cascade(&consent_id)
        })?;
    Ok(Json(outcome))
}
