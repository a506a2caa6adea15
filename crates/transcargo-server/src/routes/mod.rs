//! HTTP route handlers, mounted under `/api/v1`.

pub mod admin;
pub mod articles;
pub mod audit;
pub mod auto_publish;
pub mod case_studies;
pub mod consents;
pub mod countries;
pub mod gdpr;
pub mod health;
pub mod leads;
pub mod services;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::state::AppState;
use transcargo_core::Result;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(session::routes())
        .merge(consents::routes())
        .merge(leads::routes())
        .merge(gdpr::routes())
        .merge(audit::routes())
        .merge(countries::routes())
        .merge(services::routes())
        .merge(articles::routes())
        .merge(case_studies::routes())
        .merge(auto_publish::routes())
        .merge(admin::routes())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ---------------------------------------------------------------
// Content listing cache
// ---------------------------------------------------------------

const CONTENT_VERSION_KEY: &str = "content:version";
const CONTENT_VERSION_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
const LISTING_TTL: Duration = Duration::from_secs(300);

/// Serve a public listing through the cache. Keys embed the content version,
/// so any content write makes earlier entries unreachable. Cache failures
/// fall through to `load`.
pub(crate) fn cached_listing<T: Serialize>(
    state: &AppState,
    scope: &str,
    load: impl FnOnce() -> Result<T>,
) -> Result<serde_json::Value> {
    if !state.config.cache_enabled {
        return Ok(serde_json::to_value(load()?)?);
    }
    let version = match state.cache.get_json(CONTENT_VERSION_KEY) {
        Ok(v) => v.and_then(|v| v.as_i64()).unwrap_or(0),
        Err(e) => {
            warn!("Cache read failed, serving {} uncached: {}", scope, e);
            return Ok(serde_json::to_value(load()?)?);
        }
    };
    let key = format!("content:{}:{}", version, scope);
    if let Ok(Some(hit)) = state.cache.get_json(&key) {
        debug!("Cache hit for {}", key);
        return Ok(hit);
    }
    let value = serde_json::to_value(load()?)?;
    if let Err(e) = state.cache.set_json(&key, &value, LISTING_TTL) {
        warn!("Cache write failed for {}: {}", key, e);
    }
    Ok(value)
}

/// Invalidate every cached listing.
pub(crate) fn content_changed(state: &AppState) {
    if !state.config.cache_enabled {
        return;
    }
    if let Err(e) = state.cache.incr(CONTENT_VERSION_KEY, CONTENT_VERSION_TTL) {
        warn!("Failed to bump content version: {}", e);
    }
}
