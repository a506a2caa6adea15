//! Data-subject rights: export and erasure by pseudonymous hash.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::audit::{AuditTrail, RequestContext};
use crate::crypto::FieldCipher;
use crate::leads::LeadPayload;
use transcargo_core::{Error, Result};
use transcargo_store::{ConsentRecord, LeadSource, LeadStatus, SqliteStore, StoreTx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedLead {
    pub id: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub created_at: DateTime<Utc>,
    pub data: LeadPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectExport {
    pub user_hash: String,
    pub leads: Vec<ExportedLead>,
}

pub struct GdprService {
    store: Arc<SqliteStore>,
    cipher: Arc<FieldCipher>,
    audit: AuditTrail,
}

impl GdprService {
    pub fn new(store: Arc<SqliteStore>, cipher: Arc<FieldCipher>, audit: AuditTrail) -> Self {
        Self {
            store,
            cipher,
            audit,
        }
    }

    /// Every lead linked to any consent of `user_hash`, decrypted. The read
    /// and the `data_exported` entry share one transaction: if the entry
    /// cannot be written, nothing is returned.
    pub fn export(&self, ctx: &RequestContext, user_hash: &str) -> Result<SubjectExport> {
        require_hash(user_hash)?;
        let result = self.store.write(|tx| {
            let leads = tx
                .leads_for_hash(user_hash)?
                .into_iter()
                .map(|lead| {
                    Ok(ExportedLead {
                        data: self.cipher.decrypt(&lead.encrypted_data)?,
                        id: lead.id,
                        status: lead.status,
                        source: lead.source,
                        created_at: lead.created_at,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            AuditTrail::record_in(
                tx,
                &AuditTrail::entry(
                    ctx,
                    "data_exported",
                    "user",
                    Some(user_hash),
                    serde_json::json!({ "leads": leads.len() }),
                ),
            )?;
            Ok(SubjectExport {
                user_hash: user_hash.to_string(),
                leads,
            })
        });

        match &result {
            Ok(export) => {
                info!("GDPR export for {}: {} leads", short(user_hash), export.leads.len());
            }
            Err(Error::AuditUnavailable(e)) => {
                error!("GDPR export for {} withheld, audit write failed: {}", short(user_hash), e);
            }
            Err(e) => self.audit.record(
                ctx,
                "data_exported:error",
                "user",
                Some(user_hash),
                serde_json::json!({ "error": e.to_string() }),
            ),
        }
        result
    }

    /// Delete every lead linked to the subject and revoke all their consents,
    /// atomically. Returns the number of leads deleted; 0 for unknown subjects.
    pub fn delete(&self, ctx: &RequestContext, user_hash: &str) -> Result<usize> {
        require_hash(user_hash)?;
        self.audit
            .audited(ctx, "data_deleted", "user", Some(user_hash), || {
                let deleted = self
                    .store
                    .write(|tx| erase_in(tx, user_hash, &Utc::now()))?;
                info!("GDPR delete for {}: {} leads removed", short(user_hash), deleted);
                Ok(deleted)
            })
    }

    /// Consent records for the admin view. Origin IPs stay encrypted.
    pub fn consents(&self, user_hash: &str) -> Result<Vec<ConsentRecord>> {
        require_hash(user_hash)?;
        self.store.read(|tx| tx.consents_for_hash(user_hash))
    }
}

/// Erase a subject inside an open transaction.
pub(crate) fn erase_in(tx: &StoreTx<'_>, user_hash: &str, at: &DateTime<Utc>) -> Result<usize> {
    let deleted = tx.delete_leads_for_hash(user_hash)?;
    tx.revoke_consents_for_hash(user_hash, at)?;
    Ok(deleted)
}

fn require_hash(user_hash: &str) -> Result<()> {
    if user_hash.trim().is_empty() {
        return Err(Error::Validation("user_hash is required".into()));
    }
    Ok(())
}

/// Hash prefix for log lines.
fn short(user_hash: &str) -> &str {
    user_hash.get(..12).unwrap_or(user_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::ConsentLedger;
    use crate::crypto::generate_key;
    use crate::leads::LeadService;
    use crate::notify::LogNotifier;
    use tempfile::TempDir;
    use transcargo_store::{AuditFilter, ConsentType};

    struct Fixture {
        ledger: ConsentLedger,
        leads: LeadService,
        gdpr: GdprService,
        audit: AuditTrail,
        store: Arc<SqliteStore>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let cipher = Arc::new(FieldCipher::new(Some(&generate_key())));
        let audit = AuditTrail::new(store.clone());
        Fixture {
            ledger: ConsentLedger::new(store.clone(), cipher.clone(), "v1"),
            leads: LeadService::new(store.clone(), cipher.clone(), audit.clone(), Arc::new(LogNotifier)),
            gdpr: GdprService::new(store.clone(), cipher, audit.clone()),
            audit,
            store,
            _dir: dir,
        }
    }

    fn payload(email: &str) -> LeadPayload {
        LeadPayload {
            name: "Пётр".into(),
            email: email.into(),
            phone: "+7 900 000 00 00".into(),
            company: Some("ООО Ромашка".into()),
            message: None,
        }
    }

    fn submit(f: &Fixture, consent_id: &str, source: LeadSource) {
        f.leads
            .create_lead(&RequestContext::anonymous(), payload("p@x.ru"), consent_id, source)
            .unwrap();
    }

    #[test]
    fn test_export_returns_decrypted_leads() {
        let f = fixture();
        let r = f
            .ledger
            .record_consent("p@x.ru", "+79000000000", ConsentType::PersonalData, None, None, None)
            .unwrap();
        submit(&f, &r.consent_id, LeadSource::ContactForm);
        submit(&f, &r.consent_id, LeadSource::QuoteForm);

        let export = f.gdpr.export(&RequestContext::anonymous(), &r.user_hash).unwrap();
        assert_eq!(export.user_hash, r.user_hash);
        assert_eq!(export.leads.len(), 2);
        assert_eq!(export.leads[0].data.company.as_deref(), Some("ООО Ромашка"));

        let page = f
            .audit
            .query(&AuditFilter {
                action: Some("data_exported".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].details["leads"], 2);
    }

    #[test]
    fn test_export_withheld_when_audit_unavailable() {
        let f = fixture();
        let r = f
            .ledger
            .record_consent("p@x.ru", "1", ConsentType::PersonalData, None, None, None)
            .unwrap();
        submit(&f, &r.consent_id, LeadSource::ContactForm);

        let conn = rusqlite::Connection::open(f.store.db_path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER audit_offline BEFORE INSERT ON audit_logs BEGIN
                 SELECT RAISE(ABORT, 'audit offline');
             END;",
        )
        .unwrap();

        let result = f.gdpr.export(&RequestContext::new("manager", None, None), &r.user_hash);
        assert!(matches!(result, Err(Error::AuditUnavailable(_))));
    }

    #[test]
    fn test_delete_erases_and_revokes() {
        let f = fixture();
        let r = f
            .ledger
            .record_consent("p@x.ru", "1", ConsentType::PersonalData, None, None, None)
            .unwrap();
        f.ledger
            .record_consent("p@x.ru", "1", ConsentType::Marketing, None, None, None)
            .unwrap();
        submit(&f, &r.consent_id, LeadSource::ContactForm);

        let ctx = RequestContext::anonymous();
        assert_eq!(f.gdpr.delete(&ctx, &r.user_hash).unwrap(), 1);
        assert!(f.gdpr.export(&ctx, &r.user_hash).unwrap().leads.is_empty());
        assert!(f.gdpr.consents(&r.user_hash).unwrap().iter().all(|c| !c.is_active()));
        assert_eq!(f.gdpr.delete(&ctx, &r.user_hash).unwrap(), 0);
        assert_eq!(f.gdpr.delete(&ctx, "never-seen").unwrap(), 0);
    }

    #[test]
    fn test_blank_hash_rejected() {
        let f = fixture();
        assert!(matches!(
            f.gdpr.export(&RequestContext::anonymous(), " "),
            Err(Error::Validation(_))
        ));
    }
}
