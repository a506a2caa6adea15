//! Consent ledger queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::sqlite::{db_err, enum_col, new_id, opt_ts_col, ts_col, StoreTx};
use crate::types::{ConsentRecord, ConsentType, NewConsent};
use transcargo_core::time::{now, to_db};
use transcargo_core::Result;

impl StoreTx<'_> {
    /// Insert or re-grant the consent for (user_hash, consent_type).
    ///
    /// An existing row is updated in place: granted again, revocation
    /// cleared, origin and policy version refreshed. The id is stable.
    pub fn upsert_consent(&self, consent: &NewConsent) -> Result<ConsentRecord> {
        let ts = to_db(&now());
        self.tx
            .prepare_cached(
                "INSERT INTO user_consents
                    (id, user_hash, consent_type, is_granted, ip_address, user_agent,
                     policy_version, created_at, updated_at, revoked_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?7, NULL)
                 ON CONFLICT(user_hash, consent_type) DO UPDATE SET
                    is_granted = 1,
                    revoked_at = NULL,
                    ip_address = excluded.ip_address,
                    user_agent = excluded.user_agent,
                    policy_version = excluded.policy_version,
                    updated_at = excluded.updated_at",
            )
            .map_err(db_err)?
            .execute(params![
                new_id(),
                consent.user_hash,
                consent.consent_type.as_str(),
                consent.ip_address,
                consent.user_agent,
                consent.policy_version,
                ts,
            ])
            .map_err(db_err)?;

        self.find_consent(&consent.user_hash, consent.consent_type)?
            .ok_or_else(|| transcargo_core::Error::Database("consent vanished after upsert".into()))
    }

    pub fn get_consent(&self, id: &str) -> Result<Option<ConsentRecord>> {
        self.tx
            .prepare_cached("SELECT * FROM user_consents WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_consent(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn find_consent(
        &self,
        user_hash: &str,
        consent_type: ConsentType,
    ) -> Result<Option<ConsentRecord>> {
        self.tx
            .prepare_cached(
                "SELECT * FROM user_consents WHERE user_hash = ?1 AND consent_type = ?2",
            )
            .map_err(db_err)?
            .query_row(params![user_hash, consent_type.as_str()], |row| {
                Ok(row_to_consent(row))
            })
            .optional()
            .map_err(db_err)
    }

    /// All consent records for a hash, any type, any state.
    pub fn consents_for_hash(&self, user_hash: &str) -> Result<Vec<ConsentRecord>> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "SELECT * FROM user_consents WHERE user_hash = ?1 ORDER BY created_at",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_hash], |row| Ok(row_to_consent(row)))
            .map_err(db_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Revoke one consent. Returns false when it was already revoked,
    /// in which case the original `revoked_at` is kept.
    pub fn revoke_consent(&self, id: &str, at: &DateTime<Utc>) -> Result<bool> {
        let ts = to_db(at);
        let count = self
            .tx
            .prepare_cached(
                "UPDATE user_consents SET is_granted = 0, revoked_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND revoked_at IS NULL",
            )
            .map_err(db_err)?
            .execute(params![id, ts])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Revoke every still-active consent for a hash. Returns rows changed.
    pub fn revoke_consents_for_hash(&self, user_hash: &str, at: &DateTime<Utc>) -> Result<usize> {
        let ts = to_db(at);
        self.tx
            .prepare_cached(
                "UPDATE user_consents SET is_granted = 0, revoked_at = ?2, updated_at = ?2
                 WHERE user_hash = ?1 AND revoked_at IS NULL",
            )
            .map_err(db_err)?
            .execute(params![user_hash, ts])
            .map_err(db_err)
    }

    pub fn count_consents(&self) -> Result<i64> {
        self.tx
            .query_row("SELECT COUNT(*) FROM user_consents", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_consent(row: &rusqlite::Row<'_>) -> ConsentRecord {
    ConsentRecord {
        id: row.get("id").unwrap_or_default(),
        user_hash: row.get("user_hash").unwrap_or_default(),
        consent_type: enum_col(row, "consent_type", ConsentType::PersonalData),
        is_granted: row.get("is_granted").unwrap_or(false),
        ip_address: row.get("ip_address").ok().flatten(),
        user_agent: row.get("user_agent").ok().flatten(),
        policy_version: row.get("policy_version").unwrap_or_default(),
        created_at: ts_col(row, "created_at"),
        updated_at: ts_col(row, "updated_at"),
        revoked_at: opt_ts_col(row, "revoked_at"),
    }
}

#[cfg(test)]
mod tests {
    use crate::{ConsentType, NewConsent, SqliteStore};
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn consent(hash: &str, consent_type: ConsentType, version: &str) -> NewConsent {
        NewConsent {
            user_hash: hash.to_string(),
            consent_type,
            ip_address: Some("enc-ip".into()),
            user_agent: Some("Mozilla/5.0".into()),
            policy_version: version.to_string(),
        }
    }

    #[test]
    fn test_upsert_keeps_single_row_per_type() {
        let (store, _dir) = test_store();
        let first = store
            .write(|tx| tx.upsert_consent(&consent("h1", ConsentType::PersonalData, "v1")))
            .unwrap();
        let second = store
            .write(|tx| tx.upsert_consent(&consent("h1", ConsentType::PersonalData, "v2")))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.policy_version, "v2");

        store
            .write(|tx| tx.upsert_consent(&consent("h1", ConsentType::Marketing, "v1")))
            .unwrap();
        let all = store.read(|tx| tx.consents_for_hash("h1")).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_revoke_is_idempotent_and_regrant_clears() {
        let (store, _dir) = test_store();
        let rec = store
            .write(|tx| tx.upsert_consent(&consent("h2", ConsentType::PersonalData, "v1")))
            .unwrap();
        let t1 = chrono::Utc::now();
        assert!(store.write(|tx| tx.revoke_consent(&rec.id, &t1)).unwrap());
        let t2 = t1 + chrono::Duration::seconds(30);
        assert!(!store.write(|tx| tx.revoke_consent(&rec.id, &t2)).unwrap());

        let revoked = store.read(|tx| tx.get_consent(&rec.id)).unwrap().unwrap();
        assert!(!revoked.is_active());
        assert_eq!(
            revoked.revoked_at.unwrap().timestamp_micros(),
            t1.timestamp_micros()
        );

        let regranted = store
            .write(|tx| tx.upsert_consent(&consent("h2", ConsentType::PersonalData, "v1")))
            .unwrap();
        assert!(regranted.is_active());
        assert_eq!(regranted.id, rec.id);
    }

    #[test]
    fn test_revoke_for_hash_only_touches_active() {
        let (store, _dir) = test_store();
        store
            .write(|tx| {
                tx.upsert_consent(&consent("h3", ConsentType::PersonalData, "v1"))?;
                tx.upsert_consent(&consent("h3", ConsentType::Analytics, "v1"))?;
                tx.upsert_consent(&consent("other", ConsentType::Analytics, "v1"))
            })
            .unwrap();
        let now = chrono::Utc::now();
        assert_eq!(store.write(|tx| tx.revoke_consents_for_hash("h3", &now)).unwrap(), 2);
        assert_eq!(store.write(|tx| tx.revoke_consents_for_hash("h3", &now)).unwrap(), 0);
        let other = store
            .read(|tx| tx.find_consent("other", ConsentType::Analytics))
            .unwrap()
            .unwrap();
        assert!(other.is_active());
    }
}
