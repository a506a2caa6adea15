//! Audit trail queries. Insert and read only.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter};

use crate::sqlite::{db_err, json_col, new_id, ts_col, StoreTx};
use crate::types::{AuditEntry, AuditFilter, NewAuditEntry};
use transcargo_core::time::{now, to_db};
use transcargo_core::Result;

impl StoreTx<'_> {
    pub fn insert_audit(&self, entry: &NewAuditEntry) -> Result<AuditEntry> {
        let stored = AuditEntry {
            id: new_id(),
            action: entry.action.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            user_id: entry.user_id.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            details: if entry.details.is_null() {
                serde_json::json!({})
            } else {
                entry.details.clone()
            },
            created_at: now(),
        };
        self.tx
            .prepare_cached(
                "INSERT INTO audit_logs
                    (id, action, entity_type, entity_id, user_id, ip_address, user_agent,
                     details_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(db_err)?
            .execute(params![
                stored.id,
                stored.action,
                stored.entity_type,
                stored.entity_id,
                stored.user_id,
                stored.ip_address,
                stored.user_agent,
                stored.details.to_string(),
                to_db(&stored.created_at),
            ])
            .map_err(db_err)?;
        Ok(stored)
    }

    /// Filtered page of entries, newest first, plus the unpaged total.
    pub fn query_audit(&self, filter: &AuditFilter) -> Result<(Vec<AuditEntry>, i64)> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(from) = &filter.date_from {
            args.push(to_db(from));
            clauses.push("created_at >= ?");
        }
        if let Some(to) = &filter.date_to {
            args.push(to_db(to));
            clauses.push("created_at <= ?");
        }
        if let Some(action) = &filter.action {
            args.push(action.clone());
            clauses.push("action = ?");
        }
        if let Some(entity_type) = &filter.entity_type {
            args.push(entity_type.clone());
            clauses.push("entity_type = ?");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self
            .tx
            .query_row(
                &format!("SELECT COUNT(*) FROM audit_logs{}", where_sql),
                params_from_iter(args.iter()),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let page = filter.page.max(1);
        let size = filter.size.max(1);
        let sql = format!(
            "SELECT * FROM audit_logs{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            where_sql,
            size,
            (page - 1) * size
        );
        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        let items = stmt
            .query_map(params_from_iter(args.iter()), |row| Ok(row_to_audit(row)))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok((items, total))
    }

    /// Entries with one of `actions` created at or after `since`.
    pub fn audit_since(&self, actions: &[&str], since: &DateTime<Utc>) -> Result<Vec<AuditEntry>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; actions.len()].join(", ");
        let sql = format!(
            "SELECT * FROM audit_logs WHERE created_at >= ? AND action IN ({}) ORDER BY created_at",
            placeholders
        );
        let mut args = vec![to_db(since)];
        args.extend(actions.iter().map(|a| a.to_string()));

        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| Ok(row_to_audit(row)))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> AuditEntry {
    AuditEntry {
        id: row.get("id").unwrap_or_default(),
        action: row.get("action").unwrap_or_default(),
        entity_type: row.get("entity_type").unwrap_or_default(),
        entity_id: row.get("entity_id").ok().flatten(),
        user_id: row.get("user_id").unwrap_or_default(),
        ip_address: row.get("ip_address").ok().flatten(),
        user_agent: row.get("user_agent").ok().flatten(),
        details: json_col(row, "details_json"),
        created_at: ts_col(row, "created_at"),
    }
}
