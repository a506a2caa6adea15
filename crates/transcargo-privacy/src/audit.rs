//! Audit trail: append-only record of who touched which personal data.
//!
//! Two ways to write: [`AuditTrail::record`] is advisory and never fails the
//! caller; [`AuditTrail::audited`] wraps an operation and writes exactly one
//! entry describing its outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use transcargo_core::{Error, Result};
use transcargo_store::{AuditEntry, AuditFilter, NewAuditEntry, SqliteStore, StoreTx};

/// Actions counted as personal-data access in the access report.
pub const PD_ACCESS_ACTIONS: &[&str] = &["lead_viewed", "data_exported"];

pub const MAX_PAGE_SIZE: usize = 200;

/// Who is acting, and from where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>, ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            actor: actor.into(),
            ip,
            user_agent,
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous", None, None)
    }

    /// Context for background work.
    pub fn system(actor: impl Into<String>) -> Self {
        Self::new(actor, Some("worker".into()), Some("worker".into()))
    }
}

/// One page of audit entries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub items: Vec<AuditEntry>,
    pub page: usize,
    pub size: usize,
    pub total: i64,
}

/// Personal-data access summary over a trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct AccessReport {
    pub since: DateTime<Utc>,
    pub total_accesses: usize,
    pub by_action: BTreeMap<String, usize>,
    pub by_user: BTreeMap<String, usize>,
    pub by_day: BTreeMap<String, usize>,
    /// Up to ten `(entity_type, count)` pairs, most accessed first.
    pub top_entities: Vec<(String, usize)>,
}

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<SqliteStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn entry(
        ctx: &RequestContext,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        details: serde_json::Value,
    ) -> NewAuditEntry {
        NewAuditEntry {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            user_id: ctx.actor.clone(),
            ip_address: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            details,
        }
    }

    /// Write an entry inside an existing transaction. Failure aborts it.
    pub fn record_in(tx: &StoreTx<'_>, entry: &NewAuditEntry) -> Result<AuditEntry> {
        tx.insert_audit(entry)
            .map_err(|e| Error::AuditUnavailable(e.to_string()))
    }

    /// Advisory write: storage failures are logged and swallowed.
    pub fn record(
        &self,
        ctx: &RequestContext,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        details: serde_json::Value,
    ) {
        let entry = Self::entry(ctx, action, entity_type, entity_id, details);
        if let Err(e) = self.store.write(|tx| tx.insert_audit(&entry)) {
            warn!("Audit write failed for action={}: {}", action, e);
        }
    }

    /// Run `work` and record exactly one entry: `action` on success,
    /// `action:error` with `details.error` on failure. The result of `work`
    /// is returned unchanged.
    pub fn audited<T>(
        &self,
        ctx: &RequestContext,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        work: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let result = work();
        self.outcome(ctx, action, entity_type, entity_id, &result);
        result
    }

    /// Record the outcome of an operation that already ran. Used when the
    /// entity id is only known once the operation succeeded.
    pub fn outcome<T>(
        &self,
        ctx: &RequestContext,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        result: &Result<T>,
    ) {
        match result {
            Ok(_) => self.record(ctx, action, entity_type, entity_id, serde_json::json!({})),
            Err(e) => self.record(
                ctx,
                &format!("{}:error", action),
                entity_type,
                entity_id,
                serde_json::json!({ "error": e.to_string() }),
            ),
        }
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    pub fn query(&self, filter: &AuditFilter) -> Result<AuditPage> {
        if filter.page < 1 {
            return Err(Error::Validation("page must be >= 1".into()));
        }
        if filter.size < 1 || filter.size > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let (items, total) = self.store.read(|tx| tx.query_audit(filter))?;
        Ok(AuditPage {
            items,
            page: filter.page,
            size: filter.size,
            total,
        })
    }

    /// Personal-data access report over the last `days` days (1..=365).
    pub fn report(&self, days: i64) -> Result<AccessReport> {
        if !(1..=365).contains(&days) {
            return Err(Error::Validation("days must be between 1 and 365".into()));
        }
        let since = Utc::now() - chrono::Duration::days(days);
        let rows = self.store.read(|tx| tx.audit_since(PD_ACCESS_ACTIONS, &since))?;
        Ok(build_report(since, &rows))
    }
}

fn build_report(since: DateTime<Utc>, rows: &[AuditEntry]) -> AccessReport {
    let mut by_action = BTreeMap::new();
    let mut by_user = BTreeMap::new();
    let mut by_day = BTreeMap::new();
    let mut by_entity: BTreeMap<String, usize> = BTreeMap::new();

    for r in rows {
        *by_action.entry(r.action.clone()).or_insert(0) += 1;
        *by_user.entry(r.user_id.clone()).or_insert(0) += 1;
        *by_day
            .entry(r.created_at.format("%Y-%m-%d").to_string())
            .or_insert(0) += 1;
        let entity = if r.entity_type.is_empty() {
            "unknown".to_string()
        } else {
            r.entity_type.clone()
        };
        *by_entity.entry(entity).or_insert(0) += 1;
    }

    let mut top_entities: Vec<(String, usize)> = by_entity.into_iter().collect();
    top_entities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_entities.truncate(10);

    AccessReport {
        since,
        total_accesses: rows.len(),
        by_action,
        by_user,
        by_day,
        top_entities,
    }
}

const CSV_HEADER: &[&str] = &[
    "id",
    "action",
    "entity_type",
    "entity_id",
    "user_id",
    "ip_address",
    "user_agent",
    "created_at",
    "details",
];

/// Render entries as CSV (RFC 4180 quoting).
pub fn to_csv(entries: &[AuditEntry]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");
    for e in entries {
        let fields = [
            e.id.clone(),
            e.action.clone(),
            e.entity_type.clone(),
            e.entity_id.clone().unwrap_or_default(),
            e.user_id.clone(),
            e.ip_address.clone().unwrap_or_default(),
            e.user_agent.clone().unwrap_or_default(),
            e.created_at.to_rfc3339(),
            e.details.to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
