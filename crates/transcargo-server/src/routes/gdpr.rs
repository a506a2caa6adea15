//! Data-subject rights: export and erasure.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_privacy::SubjectExport;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gdpr/{user_hash}/export", get(export_subject))
        .route("/gdpr/{user_hash}", delete(delete_subject))
}

async fn export_subject(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(user_hash): Path<String>,
) -> ApiResult<Json<SubjectExport>> {
    user.require(Role::Manager)?;
    Ok(Json(state.gdpr.export(&user.ctx, &user_hash)?))
}

async fn delete_subject(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(user_hash): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Admin)?;
    let deleted = state.gdpr.delete(&user.ctx, &user_hash)?;
    Ok(Json(serde_json::json!({
        "user_hash": user_hash,
        "deleted_leads": deleted,
        "region": state.config.gdpr_region,
    })))
}
