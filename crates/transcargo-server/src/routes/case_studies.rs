//! Client case studies.

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
use transcargo_jobs::seo::slugify;
use transcargo_store::{CaseStudy, CaseStudyPatch, CaseStudyStatus, NewCaseStudy};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/case-studies", get(list_case_studies).post(create_case_study))
        .route(
            "/case-studies/{id}",
            get(get_case_study)
                .put(update_case_study)
                .delete(delete_case_study),
        )
}

async fn list_case_studies(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let items = cached_listing(&state, "case_studies", || {
        state
            .store
            .read(|tx| tx.list_case_studies(Some(CaseStudyStatus::Published)))
    })?;
    Ok(Json(items))
}

async fn get_case_study(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CaseStudy>> {
    let case = state
        .store
        .read(|tx| tx.get_case_study(&id))?
        .filter(|c| c.status == CaseStudyStatus::Published)
        .ok_or_else(|| Error::NotFound(format!("case study {}", id)))?;
    Ok(Json(case))
}

async fn create_case_study(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(mut body): Json<NewCaseStudy>,
) -> ApiResult<(StatusCode, Json<CaseStudy>)> {
    user.require(Role::Manager)?;
    if body.title.trim().is_empty() {
        return Err(Error::Validation("title is required".into()).into());
    }
    body.slug = if body.slug.trim().is_empty() {
        slugify(&body.title)
    } else {
        slugify(&body.slug)
    };
    let case = state
        .audit
        .audited(&user.ctx, "case_study_created", "case_study", Some(&body.slug), || {
            state.store.write(|tx| {
                tx.get_country(&body.country_id)?
                    .ok_or_else(|| Error::NotFound(format!("country {}", body.country_id)))?;
                tx.insert_case_study(&body)
            })
        })?;
    content_changed(&state);
    Ok((StatusCode::CREATED, Json(case)))
}

async fn update_case_study(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(mut patch): Json<CaseStudyPatch>,
) -> ApiResult<Json<CaseStudy>> {
    user.require(Role::Manager)?;
    patch.slug = patch.slug.as_deref().map(slugify);
    let case = state
        .audit
        .audited(&user.ctx, "case_study_updated", "case_study", Some(&id), || {
            state
                .store
                .write(|tx| tx.update_case_study(&id, &patch))?
                .ok_or_else(|| Error::NotFound(format!("case study {}", id)))
        })?;
    content_changed(&state);
    Ok(Json(case))
}

async fn delete_case_study(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    state
        .audit
        .audited(&user.ctx, "case_study_deleted", "case_study", Some(&id), || {
            if !state.store.write(|tx| tx.delete_case_study(&id))? {
                return Err(Error::NotFound(format!("case study {}", id)));
            }
            Ok(())
        })?;
    content_changed(&state);
    Ok(StatusCode::NO_CONTENT)
}
