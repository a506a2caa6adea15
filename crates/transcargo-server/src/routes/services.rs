//! Logistics services offered per country.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::countries::find_country;
use super::{cached_listing, content_changed};
use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Error;
use transcargo_store::{NewService, Service, ServicePatch};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/services", get(list_services).post(create_service))
        .route(
            "/services/{id}",
            get(get_service).put(update_service).delete(delete_service),
        )
}

#[derive(Deserialize)]
struct ListParams {
    /// Country id or ISO code.
    country: Option<String>,
}

async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let country_id = match params.country.as_deref().filter(|c| !c.is_empty()) {
        Some(key) => Some(
            state
                .store
                .read(|tx| find_country(tx, key))?
                .ok_or_else(|| Error::NotFound(format!("country {}", key)))?
                .id,
        ),
        None => None,
    };
    let scope = format!("services:{}", country_id.as_deref().unwrap_or("all"));
    let services = cached_listing(&state, &scope, || {
        state
            .store
            .read(|tx| tx.list_services(country_id.as_deref(), true))
    })?;
    Ok(Json(services))
}

async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Service>> {
    let service = state
        .store
        .read(|tx| tx.get_service(&id))?
        .filter(|s| s.is_active)
        .ok_or_else(|| Error::NotFound(format!("service {}", id)))?;
    Ok(Json(service))
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<NewService>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    user.require(Role::Manager)?;
    if body.title_ru.trim().is_empty() {
        return Err(Error::Validation("title_ru is required".into()).into());
    }
    let service = state
        .audit
        .audited(&user.ctx, "service_created", "service", None, || {
            state.store.write(|tx| {
                tx.get_country(&body.country_id)?
                    .ok_or_else(|| Error::NotFound(format!("country {}", body.country_id)))?;
                tx.insert_service(&body)
            })
        })?;
    content_changed(&state);
    Ok((StatusCode::CREATED, Json(service)))
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ServicePatch>,
) -> ApiResult<Json<Service>> {
    user.require(Role::Manager)?;
    let service = state
        .audit
        .audited(&user.ctx, "service_updated", "service", Some(&id), || {
            state
                .store
                .write(|tx| tx.update_service(&id, &patch))?
                .ok_or_else(|| Error::NotFound(format!("service {}", id)))
        })?;
    content_changed(&state);
    Ok(Json(service))
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    state
        .audit
        .audited(&user.ctx, "service_deleted", "service", Some(&id), || {
            if !state.store.write(|tx| tx.delete_service(&id))? {
                return Err(Error::NotFound(format!("service {}", id)));
            }
            Ok(())
        })?;
    content_changed(&state);
    Ok(StatusCode::NO_CONTENT)
}
