//! Staff login.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::auth::{resolve_role, AuthUser, ClientInfo};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Error;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/token", post(issue_token))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = client.context(body.username.clone());
    let Some(role) = resolve_role(&state.config, &body.username, &body.password) else {
        state.audit.record(
            &ctx,
            "admin_login:error",
            "user",
            Some(&body.username),
            serde_json::json!({ "error": "invalid credentials" }),
        );
        return Err(Error::Unauthorized("invalid credentials".into()).into());
    };

    let (token, claims) = state.tokens.issue(&body.username, role)?;
    state.audit.record(
        &ctx,
        "admin_login",
        "user",
        Some(&body.username),
        serde_json::json!({ "role": role }),
    );
    info!("Issued {} token for {}", role.as_str(), body.username);
    Ok(Json(serde_json::json!({
        "access_token": token,
        "token_type": "bearer",
        "role": role,
        "expires_at": claims.exp,
    })))
}

async fn me(user: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "username": user.sub,
        "role": user.role,
    }))
}
