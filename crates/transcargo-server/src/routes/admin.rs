//! Admin bridge: one generic surface over every managed resource, gated by a
//! static role table. Every call is written to the audit trail.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::content_changed;
use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::{Error, Result};
use transcargo_store::{
    ArticlePatch, ArticleStatus, AuditFilter, CaseStudyPatch, CaseStudyStatus, CountryPatch, LeadQuery,
    LeadStatus, ServicePatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    List,
    Show,
    Update,
    Delete,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::List => "list",
            AdminAction::Show => "show",
            AdminAction::Update => "update",
            AdminAction::Delete => "delete",
        }
    }
}

/// Minimum role per action; `None` means the action does not exist.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourcePolicy {
    pub resource: &'static str,
    pub list: Option<Role>,
    pub show: Option<Role>,
    pub update: Option<Role>,
    pub delete: Option<Role>,
}

impl ResourcePolicy {
    const fn content(resource: &'static str) -> Self {
        Self {
            resource,
            list: Some(Role::Viewer),
            show: Some(Role::Viewer),
            update: Some(Role::Manager),
            delete: Some(Role::Admin),
        }
    }

    pub fn required(&self, action: AdminAction) -> Option<Role> {
        match action {
            AdminAction::List => self.list,
            AdminAction::Show => self.show,
            AdminAction::Update => self.update,
            AdminAction::Delete => self.delete,
        }
    }
}

pub const RESOURCES: &[ResourcePolicy] = &[
    ResourcePolicy::content("countries"),
    ResourcePolicy::content("services"),
    ResourcePolicy::content("articles"),
    ResourcePolicy::content("case_studies"),
    // Showing a lead decrypts it.
    ResourcePolicy {
        resource: "leads",
        list: Some(Role::Viewer),
        show: Some(Role::Manager),
        update: Some(Role::Manager),
        delete: Some(Role::Admin),
    },
    ResourcePolicy {
        resource: "consents",
        list: Some(Role::Manager),
        show: Some(Role::Manager),
        update: None,
        delete: None,
    },
    ResourcePolicy {
        resource: "audit_logs",
        list: Some(Role::Admin),
        show: None,
        update: None,
        delete: None,
    },
];

/// Check that `user` may perform `action` on `resource`.
pub fn authorize(resource: &str, action: AdminAction, role: Role) -> Result<&'static ResourcePolicy> {
    let policy = RESOURCES
        .iter()
        .find(|p| p.resource == resource)
        .ok_or_else(|| Error::NotFound(format!("admin resource {}", resource)))?;
    match policy.required(action) {
        None => Err(Error::Forbidden(format!(
            "{} is not supported for {}",
            action.as_str(),
            resource
        ))),
        Some(required) if role < required => Err(Error::Forbidden(format!(
            "{} role required",
            required.as_str()
        ))),
        Some(_) => Ok(policy),
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/resources", get(list_resources))
        .route("/admin/{resource}", get(list_resource))
        .route(
            "/admin/{resource}/{id}",
            get(show_resource).put(update_resource).delete(delete_resource),
        )
}

#[derive(Deserialize)]
struct AdminListParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    status: Option<String>,
    user_hash: Option<String>,
    action: Option<String>,
    entity_type: Option<String>,
    page: Option<usize>,
    size: Option<usize>,
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

/// Resources and the actions the caller may perform on each.
async fn list_resources(user: AuthUser) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Viewer)?;
    let actions = [
        AdminAction::List,
        AdminAction::Show,
        AdminAction::Update,
        AdminAction::Delete,
    ];
    let resources: Vec<serde_json::Value> = RESOURCES
        .iter()
        .map(|p| {
            let allowed: Vec<&str> = actions
                .iter()
                .filter(|a| p.required(**a).is_some_and(|r| user.role >= r))
                .map(|a| a.as_str())
                .collect();
            serde_json::json!({ "resource": p.resource, "actions": allowed })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "role": user.role,
        "resources": resources,
    })))
}

async fn list_resource(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(resource): Path<String>,
    Query(params): Query<AdminListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let policy = authorize(&resource, AdminAction::List, user.role)?;
    let items = state
        .audit
        .audited(&user.ctx, "admin_list", policy.resource, None, || {
            list(&state, policy.resource, &params)
        })?;
    Ok(Json(items))
}

async fn show_resource(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((resource, id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let policy = authorize(&resource, AdminAction::Show, user.role)?;
    let item = state
        .audit
        .audited(&user.ctx, "admin_show", policy.resource, Some(&id), || {
            show(&state, &user, policy.resource, &id)
        })?;
    Ok(Json(item))
}

async fn update_resource(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let policy = authorize(&resource, AdminAction::Update, user.role)?;
    let item = state
        .audit
        .audited(&user.ctx, "admin_update", policy.resource, Some(&id), || {
            update(&state, &user, policy.resource, &id, body)
        })?;
    content_changed(&state);
    Ok(Json(item))
}

async fn delete_resource(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((resource, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let policy = authorize(&resource, AdminAction::Delete, user.role)?;
    state
        .audit
        .audited(&user.ctx, "admin_delete", policy.resource, Some(&id), || {
            delete(&state, &user, policy.resource, &id)
        })?;
    content_changed(&state);
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn parse_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::Validation(e.to_string()))
}

fn not_found(resource: &str, id: &str) -> Error {
    Error::NotFound(format!("{} {}", resource, id))
}

fn list(state: &AppState, resource: &str, params: &AdminListParams) -> Result<serde_json::Value> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    match resource {
        "countries" => to_json(state.store.read(|tx| tx.list_countries(false))?),
        "services" => to_json(state.store.read(|tx| tx.list_services(None, false))?),
        "articles" => {
            let status: Option<ArticleStatus> = params.status.as_deref().map(str::parse).transpose()?;
            to_json(
                state
                    .store
                    .read(|tx| tx.list_articles(status, limit, params.offset))?,
            )
        }
        "case_studies" => {
            let status: Option<CaseStudyStatus> = params.status.as_deref().map(str::parse).transpose()?;
            to_json(state.store.read(|tx| tx.list_case_studies(status))?)
        }
        "leads" => {
            let status: Option<LeadStatus> = params.status.as_deref().map(str::parse).transpose()?;
            to_json(state.leads.list_leads(&LeadQuery {
                status,
                limit: Some(limit),
                offset: params.offset,
            })?)
        }
        "consents" => {
            let user_hash = params
                .user_hash
                .as_deref()
                .ok_or_else(|| Error::Validation("user_hash is required".into()))?;
            to_json(state.gdpr.consents(user_hash)?)
        }
        "audit_logs" => {
            let defaults = AuditFilter::default();
            to_json(state.audit.query(&AuditFilter {
                action: params.action.clone(),
                entity_type: params.entity_type.clone(),
                page: params.page.unwrap_or(defaults.page),
                size: params.size.unwrap_or(defaults.size),
                ..defaults
            })?)
        }
        other => Err(not_found("admin resource", other)),
    }
}

fn show(state: &AppState, user: &AuthUser, resource: &str, id: &str) -> Result<serde_json::Value> {
    match resource {
        "countries" => to_json(
            state
                .store
                .read(|tx| tx.get_country(id))?
                .ok_or_else(|| not_found("country", id))?,
        ),
        "services" => to_json(
            state
                .store
                .read(|tx| tx.get_service(id))?
                .ok_or_else(|| not_found("service", id))?,
        ),
        "articles" => to_json(
            state
                .store
                .read(|tx| tx.get_article(id))?
                .ok_or_else(|| not_found("article", id))?,
        ),
        "case_studies" => to_json(
            state
                .store
                .read(|tx| tx.get_case_study(id))?
                .ok_or_else(|| not_found("case study", id))?,
        ),
        "leads" => to_json(state.leads.get_lead(&user.ctx, id)?),
        "consents" => to_json(state.consents.get(id)?),
        other => Err(not_found("admin resource", other)),
    }
}

fn update(
    state: &AppState,
    user: &AuthUser,
    resource: &str,
    id: &str,
    body: serde_json::Value,
) -> Result<serde_json::Value> {
    match resource {
        "countries" => {
            let patch: CountryPatch = parse_body(body)?;
            to_json(
                state
                    .store
                    .write(|tx| tx.update_country(id, &patch))?
                    .ok_or_else(|| not_found("country", id))?,
            )
        }
        "services" => {
            let patch: ServicePatch = parse_body(body)?;
            to_json(
                state
                    .store
                    .write(|tx| tx.update_service(id, &patch))?
                    .ok_or_else(|| not_found("service", id))?,
            )
        }
        "articles" => {
            let patch: ArticlePatch = parse_body(body)?;
            to_json(
                state
                    .store
                    .write(|tx| tx.update_article(id, &patch))?
                    .ok_or_else(|| not_found("article", id))?,
            )
        }
        "case_studies" => {
            let patch: CaseStudyPatch = parse_body(body)?;
            to_json(
                state
                    .store
                    .write(|tx| tx.update_case_study(id, &patch))?
                    .ok_or_else(|| not_found("case study", id))?,
            )
        }
        "leads" => {
            #[derive(Deserialize)]
            struct LeadUpdate {
                status: Option<LeadStatus>,
                #[serde(default, deserialize_with = "present")]
                assigned_to: Option<Option<String>>,
            }
            let update: LeadUpdate = parse_body(body)?;
            if update.status.is_none() && update.assigned_to.is_none() {
                return Err(Error::Validation("nothing to update".into()));
            }
            if let Some(status) = update.status {
                state.leads.update_status(&user.ctx, id, status)?;
            }
            if let Some(assignee) = &update.assigned_to {
                state.leads.assign(&user.ctx, id, assignee.as_deref())?;
            }
            to_json(serde_json::json!({
                "id": id,
                "status": update.status,
                "assigned_to": update.assigned_to.flatten(),
            }))
        }
        other => Err(not_found("admin resource", other)),
    }
}

/// Distinguishes an explicit `null` (unassign) from an absent field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn delete(state: &AppState, user: &AuthUser, resource: &str, id: &str) -> Result<()> {
    let found = match resource {
        "countries" => state.store.write(|tx| tx.delete_country(id))?,
        "services" => state.store.write(|tx| tx.delete_service(id))?,
        "articles" => state.store.write(|tx| tx.delete_article(id))?,
        "case_studies" => state.store.write(|tx| tx.delete_case_study(id))?,
        "leads" => {
            state.leads.delete_lead(&user.ctx, id)?;
            true
        }
        other => return Err(not_found("admin resource", other)),
    };
    if !found {
        return Err(not_found(resource, id));
    }
    Ok(())
}
