//! Audit log browsing, CSV export and the personal-data access report.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::{AuthUser, Role};
use crate::error::ApiResult;
use crate::state::AppState;
use transcargo_core::Result;
use transcargo_privacy::audit::{to_csv, MAX_PAGE_SIZE};
use transcargo_privacy::AccessReport;
use transcargo_store::{AuditEntry, AuditFilter};

/// Upper bound on rows in one CSV export.
const MAX_EXPORT_ROWS: usize = 10_000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/audit", get(query_audit))
        .route("/audit/report", get(access_report))
}

#[derive(Deserialize)]
struct AuditParams {
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    action: Option<String>,
    entity_type: Option<String>,
    page: Option<usize>,
    size: Option<usize>,
    #[serde(default)]
    export_csv: bool,
}

impl AuditParams {
    fn filter(&self) -> AuditFilter {
        let defaults = AuditFilter::default();
        AuditFilter {
            date_from: self.date_from,
            date_to: self.date_to,
            action: self.action.clone().filter(|a| !a.is_empty()),
            entity_type: self.entity_type.clone().filter(|t| !t.is_empty()),
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
        }
    }
}

#[derive(Deserialize)]
struct ReportParams {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    30
}

async fn query_audit(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<AuditParams>,
) -> ApiResult<Response> {
    user.require(Role::Admin)?;
    let filter = params.filter();

    if params.export_csv {
        let rows = state
            .audit
            .audited(&user.ctx, "audit_exported", "audit_log", None, || {
                collect_all(&state, &filter)
            })?;
        return Ok((
            [
                (CONTENT_TYPE, "text/csv; charset=utf-8"),
                (CONTENT_DISPOSITION, "attachment; filename=\"audit_logs.csv\""),
            ],
            to_csv(&rows),
        )
            .into_response());
    }

    let page = state
        .audit
        .audited(&user.ctx, "audit_viewed", "audit_log", None, || {
            state.audit.query(&filter)
        })?;
    Ok(Json(page).into_response())
}

/// Every entry matching the filter, newest first, up to the export cap.
fn collect_all(state: &AppState, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
    let mut rows = Vec::new();
    let mut filter = AuditFilter {
        page: 1,
        size: MAX_PAGE_SIZE,
        ..filter.clone()
    };
    loop {
        let page = state.audit.query(&filter)?;
        let fetched = page.items.len();
        rows.extend(page.items);
        if fetched < filter.size || rows.len() >= MAX_EXPORT_ROWS {
            break;
        }
        filter.page += 1;
    }
    rows.truncate(MAX_EXPORT_ROWS);
    Ok(rows)
}

async fn access_report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ReportParams>,
) -> ApiResult<Json<AccessReport>> {
    user.require(Role::Admin)?;
    let report = state
        .audit
        .audited(&user.ctx, "audit_report_viewed", "audit_log", None, || {
            state.audit.report(params.days)
        })?;
    Ok(Json(report))
}
