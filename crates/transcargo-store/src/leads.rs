//! Lead queries. Payloads are opaque encrypted tokens at this layer.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::sqlite::{db_err, enum_col, ts_col, StoreTx};
use crate::types::{Lead, LeadQuery, LeadSource, LeadStatus, LeadSummary};
use transcargo_core::time::to_db;
use transcargo_core::Result;

impl StoreTx<'_> {
    pub fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.tx
            .prepare_cached(
                "INSERT INTO leads
                    (id, encrypted_data, consent_id, source, status, assigned_to, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err)?
            .execute(params![
                lead.id,
                lead.encrypted_data,
                lead.consent_id,
                lead.source.as_str(),
                lead.status.as_str(),
                lead.assigned_to,
                to_db(&lead.created_at),
                to_db(&lead.updated_at),
            ])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        self.tx
            .prepare_cached("SELECT * FROM leads WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_lead(row)))
            .optional()
            .map_err(db_err)
    }

    /// Newest first. Never touches `encrypted_data`.
    pub fn list_leads(&self, query: &LeadQuery) -> Result<Vec<LeadSummary>> {
        let mut sql = String::from("SELECT id, status, source, created_at FROM leads");
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = query.status {
            sql.push_str(" WHERE status = ?1");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, query.offset));
        }

        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(LeadSummary {
                    id: row.get("id").unwrap_or_default(),
                    status: enum_col(row, "status", LeadStatus::New),
                    source: enum_col(row, "source", LeadSource::ContactForm),
                    created_at: ts_col(row, "created_at"),
                })
            })
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn update_lead_status(&self, id: &str, status: LeadStatus, at: &DateTime<Utc>) -> Result<bool> {
        let count = self
            .tx
            .prepare_cached("UPDATE leads SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .map_err(db_err)?
            .execute(params![id, status.as_str(), to_db(at)])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn assign_lead(&self, id: &str, assignee: Option<&str>, at: &DateTime<Utc>) -> Result<bool> {
        let count = self
            .tx
            .prepare_cached("UPDATE leads SET assigned_to = ?2, updated_at = ?3 WHERE id = ?1")
            .map_err(db_err)?
            .execute(params![id, assignee, to_db(at)])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    pub fn delete_lead(&self, id: &str) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM leads WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Leads referencing any consent of this hash, oldest first.
    pub fn leads_for_hash(&self, user_hash: &str) -> Result<Vec<Lead>> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "SELECT l.* FROM leads l
                 JOIN user_consents c ON l.consent_id = c.id
                 WHERE c.user_hash = ?1
                 ORDER BY l.created_at",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_hash], |row| Ok(row_to_lead(row)))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn delete_leads_for_hash(&self, user_hash: &str) -> Result<usize> {
        self.tx
            .prepare_cached(
                "DELETE FROM leads WHERE consent_id IN
                    (SELECT id FROM user_consents WHERE user_hash = ?1)",
            )
            .map_err(db_err)?
            .execute(params![user_hash])
            .map_err(db_err)
    }

    pub fn count_leads(&self) -> Result<i64> {
        self.tx
            .query_row("SELECT COUNT(*) FROM leads", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_lead(row: &rusqlite::Row<'_>) -> Lead {
    Lead {
        id: row.get("id").unwrap_or_default(),
        encrypted_data: row.get("encrypted_data").unwrap_or_default(),
        consent_id: row.get("consent_id").ok().flatten(),
        source: enum_col(row, "source", LeadSource::ContactForm),
        status: enum_col(row, "status", LeadStatus::New),
        assigned_to: row.get("assigned_to").ok().flatten(),
        created_at: ts_col(row, "created_at"),
        updated_at: ts_col(row, "updated_at"),
    }
}
