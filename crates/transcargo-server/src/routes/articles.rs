//! Articles, their SEO metadata, and on-demand SEO optimization.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{cached_listing, content_changed};
use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Error;
use transcargo_jobs::pipeline::OPTIMIZE_ARTICLE_SEO;
use transcargo_jobs::seo::slugify;
use transcargo_jobs::Schedule;
use transcargo_store::{Article, ArticlePatch, ArticleStatus, NewArticle, SeoMetadata};

const MAX_PAGE: usize = 100;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/articles", get(list_articles).post(create_article))
        .route(
            "/articles/{id}",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/articles/{id}/optimize-seo", post(optimize_seo))
        .route("/seo/metadata", get(seo_metadata))
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

#[derive(Deserialize)]
struct ArticleBody {
    /// Derived from the title when omitted.
    #[serde(default)]
    slug: Option<String>,
    title: String,
    content: String,
    #[serde(default)]
    seo_title: Option<String>,
    #[serde(default)]
    seo_description: Option<String>,
    #[serde(default)]
    seo_keywords: Vec<String>,
    #[serde(default)]
    status: Option<ArticleStatus>,
    #[serde(default)]
    country_id: Option<String>,
}

#[derive(Deserialize)]
struct SeoParams {
    path: String,
}

async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_PAGE);
    let scope = format!("articles:{}:{}", limit, params.offset);
    let articles = cached_listing(&state, &scope, || {
        state
            .store
            .read(|tx| tx.list_articles(Some(ArticleStatus::Published), limit, params.offset))
    })?;
    Ok(Json(articles))
}

/// Published articles by slug or id. Each hit counts as a view.
async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Article>> {
    let article = state.store.write(|tx| {
        let found = match tx.get_article_by_slug(&id)? {
            Some(a) => Some(a),
            None => tx.get_article(&id)?,
        };
        let Some(mut article) = found.filter(|a| a.status == ArticleStatus::Published) else {
            return Ok(None);
        };
        tx.increment_article_views(&article.id)?;
        article.views_count += 1;
        Ok(Some(article))
    })?;
    let article = article.ok_or_else(|| Error::NotFound(format!("article {}", id)))?;
    Ok(Json(article))
}

async fn create_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<ArticleBody>,
) -> ApiResult<(StatusCode, Json<Article>)> {
    user.require(Role::Manager)?;
    if body.title.trim().is_empty() {
        return Err(Error::Validation("title is required".into()).into());
    }
    let input = NewArticle {
        slug: body
            .slug
            .as_deref()
            .map(slugify)
            .unwrap_or_else(|| slugify(&body.title)),
        title: body.title.trim().to_string(),
        content: body.content,
        seo_title: body.seo_title,
        seo_description: body.seo_description,
        seo_keywords: body.seo_keywords,
        status: body.status.unwrap_or(ArticleStatus::Draft),
        country_id: body.country_id,
        auto_generated: false,
    };
    let article = state
        .audit
        .audited(&user.ctx, "article_created", "article", Some(&input.slug), || {
            state.store.write(|tx| tx.insert_article(&input))
        })?;
    content_changed(&state);
    Ok((StatusCode::CREATED, Json(article)))
}

async fn update_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(mut patch): Json<ArticlePatch>,
) -> ApiResult<Json<Article>> {
    user.require(Role::Manager)?;
    patch.slug = patch.slug.as_deref().map(slugify);
    let article = state
        .audit
        .audited(&user.ctx, "article_updated", "article", Some(&id), || {
            state
                .store
                .write(|tx| tx.update_article(&id, &patch))?
                .ok_or_else(|| Error::NotFound(format!("article {}", id)))
        })?;
    content_changed(&state);
    Ok(Json(article))
}

async fn delete_article(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(Role::Admin)?;
    state
        .audit
        .audited(&user.ctx, "article_deleted", "article", Some(&id), || {
            if !state.store.write(|tx| tx.delete_article(&id))? {
                return Err(Error::NotFound(format!("article {}", id)));
            }
            Ok(())
        })?;
    content_changed(&state);
    Ok(StatusCode::NO_CONTENT)
}

async fn optimize_seo(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    user.require(Role::Manager)?;
    state
        .store
        .read(|tx| tx.get_article(&id))?
        .ok_or_else(|| Error::NotFound(format!("article {}", id)))?;
    let task_id = state.jobs.enqueue(
        OPTIMIZE_ARTICLE_SEO,
        serde_json::json!({ "article_id": id }),
        Schedule::Now,
    )?;
    state.audit.record(
        &user.ctx,
        "article_seo_optimize_requested",
        "article",
        Some(&id),
        serde_json::json!({ "task_id": task_id }),
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "task_id": task_id, "status": "queued" })),
    ))
}

async fn seo_metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeoParams>,
) -> ApiResult<Json<SeoMetadata>> {
    let meta = state
        .store
        .read(|tx| tx.seo_metadata_by_path(&params.path))?
        .ok_or_else(|| Error::NotFound(format!("seo metadata for {}", params.path)))?;
    Ok(Json(meta))
}
