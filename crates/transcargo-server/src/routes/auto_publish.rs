//! Auto-publish control: queue article generation, inspect jobs and manage
//! the global keyword list.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::{Error, Result};
use transcargo_jobs::pipeline::GENERATE_ARTICLE;
use transcargo_jobs::snapshot::{self, AutoPublishSettings};
use transcargo_jobs::{ArticleType, JobRecord, Schedule};

const MAX_DELAY_SECS: u64 = 24 * 3600;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auto-publish/schedule", post(schedule_generation))
        .route("/auto-publish/generate-now", post(generate_now))
        .route("/auto-publish/queue", get(queue_snapshot))
        .route("/auto-publish/jobs", get(list_jobs))
        .route("/auto-publish/jobs/{id}", get(get_job))
        .route(
            "/auto-publish/settings",
            get(get_settings).put(update_settings),
        )
}

#[derive(Deserialize)]
struct GenerateBody {
    country_code: String,
    #[serde(default)]
    article_type: Option<String>,
    #[serde(default)]
    delay_seconds: Option<u64>,
    #[serde(default)]
    run_at: Option<DateTime<Utc>>,
}

impl GenerateBody {
    fn schedule(&self) -> Result<Schedule> {
        match (self.delay_seconds, self.run_at) {
            (Some(_), Some(_)) => Err(Error::Validation(
                "give either delay_seconds or run_at, not both".into(),
            )),
            (Some(secs), None) if secs > MAX_DELAY_SECS => Err(Error::Validation(format!(
                "delay_seconds must be between 0 and {}",
                MAX_DELAY_SECS
            ))),
            (Some(0), None) | (None, None) => Ok(Schedule::Now),
            (Some(secs), None) => Ok(Schedule::Delay(Duration::from_secs(secs))),
            (None, Some(at)) if at <= Utc::now() => Ok(Schedule::Now),
            (None, Some(at)) => Ok(Schedule::At(at)),
        }
    }
}

#[derive(Deserialize)]
struct SettingsBody {
    #[serde(default)]
    keywords: Option<Vec<String>>,
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

async fn schedule_generation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<GenerateBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    user.require(Role::Admin)?;
    let schedule = body.schedule()?;
    let response = enqueue_generation(&state, &user, &body, schedule, "auto_publish_schedule")?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn generate_now(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<GenerateBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    user.require(Role::Admin)?;
    let response = enqueue_generation(&state, &user, &body, Schedule::Now, "auto_publish_generate")?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn enqueue_generation(
    state: &AppState,
    user: &AuthUser,
    body: &GenerateBody,
    schedule: Schedule,
    action: &str,
) -> Result<serde_json::Value> {
    let code = body.country_code.trim().to_uppercase();
    let country = state
        .store
        .read(|tx| tx.get_country_by_code(&code))?
        .filter(|c| c.is_active)
        .ok_or_else(|| Error::NotFound(format!("active country {}", code)))?;
    let article_type = ArticleType::parse(body.article_type.as_deref().unwrap_or_default());

    let kwargs = serde_json::json!({
        "country_code": country.code,
        "article_type": article_type.as_str(),
    });
    let task_id = state
        .audit
        .audited(&user.ctx, action, "country", Some(&country.id), || {
            state.jobs.enqueue(GENERATE_ARTICLE, kwargs.clone(), schedule)
        })?;

    let status = if schedule == Schedule::Now { "queued" } else { "scheduled" };
    let eta = state.jobs.get(&task_id).and_then(|j| j.eta);
    snapshot::push_queue_entry(
        state.cache.as_ref(),
        serde_json::json!({
            "task": GENERATE_ARTICLE,
            "task_id": task_id,
            "status": status,
            "country_code": country.code,
            "article_type": article_type.as_str(),
            "eta": eta,
            "requested_by": user.sub,
            "ts": Utc::now().to_rfc3339(),
        }),
    );
    info!("Article generation {} for {} ({})", status, country.code, task_id);

    Ok(serde_json::json!({
        "task_id": task_id,
        "status": status,
        "eta": eta,
        "country_code": country.code,
        "article_type": article_type.as_str(),
    }))
}

async fn queue_snapshot(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Manager)?;
    let mut items = snapshot::queue_entries(state.cache.as_ref());
    items.reverse();
    Ok(Json(serde_json::json!({
        "size": items.len(),
        "items": items,
    })))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<JobRecord>>> {
    user.require(Role::Manager)?;
    Ok(Json(state.jobs.list()))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    user.require(Role::Manager)?;
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
    Ok(Json(job))
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<AutoPublishSettings>> {
    user.require(Role::Manager)?;
    Ok(Json(snapshot::load_settings(state.cache.as_ref())))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<SettingsBody>,
) -> ApiResult<Json<serde_json::Value>> {
    user.require(Role::Admin)?;
    let settings = state.audit.audited(
        &user.ctx,
        "auto_publish_settings_updated",
        "settings",
        None,
        || snapshot::update_settings(state.cache.as_ref(), body.keywords.clone()),
    )?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "settings": settings,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(delay: Option<u64>, run_at: Option<DateTime<Utc>>) -> GenerateBody {
        GenerateBody {
            country_code: "CN".into(),
            article_type: None,
            delay_seconds: delay,
            run_at,
        }
    }

    #[test]
    fn test_schedule_parsing() {
        assert_eq!(body(None, None).schedule().unwrap(), Schedule::Now);
        assert_eq!(body(Some(0), None).schedule().unwrap(), Schedule::Now);
        assert_eq!(
            body(Some(90), None).schedule().unwrap(),
            Schedule::Delay(Duration::from_secs(90))
        );
        assert!(body(Some(MAX_DELAY_SECS + 1), None).schedule().is_err());

        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(body(None, Some(later)).schedule().unwrap(), Schedule::At(later));
        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(body(None, Some(past)).schedule().unwrap(), Schedule::Now);
        assert!(body(Some(5), Some(later)).schedule().is_err());
    }
}
