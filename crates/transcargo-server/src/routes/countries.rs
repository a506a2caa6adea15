//! Countries served by the site.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use super::{cached_listing, content_changed};
use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Error;
use transcargo_store::{Country, CountryPatch, NewCountry, StoreTx};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/countries", get(list_countries).post(create_country))
        .route(
            "/countries/{id}",
            get(get_country).put(update_country).delete(delete_country),
        )
}

/// Lookup by id or ISO code.
pub(crate) fn find_country(tx: &StoreTx<'_>, key: &str) -> transcargo_core::Result<Option<Country>> {
    match tx.get_country(key)? {
        Some(c) => Ok(Some(c)),
        None => tx.get_country_by_code(&key.to_uppercase()),
    }
}

async fn list_countries(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let countries = cached_listing(&state, "countries", || {
        state.store.read(|tx| tx.list_countries(true))
    })?;
    Ok(Json(countries))
}

async fn get_country(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Country>> {
    let country = state
        .store
        .read(|tx| find_country(tx, &id))?
        .filter(|c| c.is_active)
        .ok_or_else(|| Error::NotFound(format!("country {}", id)))?;
    Ok(Json(country))
}

async fn create_country(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(mut body): Json<NewCountry>,
) -> ApiResult<(StatusCode, Json<Country>)> {
    user.require(Role::Manager)?;
    body.code = body.code.trim().to_uppercase();
    if body.code.len() != 2 || !body.code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Validation("country code must be two letters".into()).into());
    }
    let country = state
        .audit
        .audited(&user.ctx, "country_created", "country", Some(&body.code), || {
            state.store.write(|tx| tx.insert_country(&body))
        })?;
    content_changed(&state);
    Ok((StatusCode::CREATED, Json(country)))
}

async fn update_country(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<CountryPatch>,
) -> ApiResult<Json<Country>> {
    user.require(Role::Manager)?;
    let country = state
        .audit
        .audited(&user.ctx, "country_updated", "country", Some(&id), || {
            state
                .store
                .write(|tx| tx.update_country(&id, &patch))?
                .ok_or_else(|| Error::NotFound(format!("country {}", id)))
        })?;
    content_changed(&state);
    Ok(Json(country))
}

async fn delete_country(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    state
        .audit
        .audited(&user.ctx, "country_deleted", "country", Some(&id), || {
            if !state.store.write(|tx| tx.delete_country(&id))? {
                return Err(Error::NotFound(format!("country {}", id)));
            }
            Ok(())
        })?;
    content_changed(&state);
    Ok(StatusCode::NO_CONTENT)
}
