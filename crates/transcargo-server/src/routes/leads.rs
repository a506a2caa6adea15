//! Lead capture and the staff lead views.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::{AuthUser, ClientInfo, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_privacy::{CreatedLead, LeadDetail, LeadPayload};
use transcargo_store::{LeadQuery, LeadSource, LeadStatus};

const MAX_LIST_LIMIT: usize = 200;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leads", post(create_lead).get(list_leads))
        .route("/leads/{id}", get(get_lead).delete(delete_lead))
        .route("/leads/{id}/status", put(update_status))
        .route("/leads/{id}/assign", put(assign_lead))
}

// ---------------------------------------------------------------
// Request types
// ---------------------------------------------------------------

#[derive(Deserialize)]
struct CreateLeadBody {
    consent_id: String,
    #[serde(default = "contact_form")]
    source: LeadSource,
    #[serde(flatten)]
    data: LeadPayload,
}

fn contact_form() -> LeadSource {
    LeadSource::ContactForm
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<LeadStatus>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct StatusBody {
    status: LeadStatus,
}

#[derive(Deserialize)]
struct AssignBody {
    assigned_to: Option<String>,
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

async fn create_lead(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(body): Json<CreateLeadBody>,
) -> ApiResult<(StatusCode, Json<CreatedLead>)> {
    let created = state.leads.create_lead(
        &client.context("anonymous"),
        body.data,
        &body.consent_id,
        body.source,
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_leads(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Viewer)?;
    let query = LeadQuery {
        status: params.status,
        limit: Some(params.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT)),
        offset: params.offset,
    };
    let items = state.leads.list_leads(&query)?;
    Ok(Json(serde_json::json!({
        "count": items.len(),
        "items": items,
    })))
}

async fn get_lead(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LeadDetail>> {
    user.require(Role::Manager)?;
    Ok(Json(state.leads.get_lead(&user.ctx, &id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Manager)?;
    state.leads.update_status(&user.ctx, &id, body.status)?;
    Ok(Json(serde_json::json!({ "id": id, "status": body.status })))
}

async fn assign_lead(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Manager)?;
    let assignee = body
        .assigned_to
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    state.leads.assign(&user.ctx, &id, assignee)?;
    Ok(Json(serde_json::json!({ "id": id, "assigned_to": assignee })))
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    state.leads.delete_lead(&user.ctx, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
