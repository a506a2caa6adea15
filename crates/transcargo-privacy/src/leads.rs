//! Consent-gated lead capture and access.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::audit::{AuditTrail, RequestContext};
use crate::crypto::FieldCipher;
use crate::notify::{Notification, Notifier};
use transcargo_core::{Error, Result};
use transcargo_store::{ConsentType, Lead, LeadQuery, LeadSource, LeadStatus, LeadSummary, SqliteStore};

/// Personal data submitted with a lead. Only ever stored encrypted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Debug for LeadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LeadPayload { .. }")
    }
}

impl LeadPayload {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name is required".into()));
        }
        if !self.email.contains('@') {
            return Err(Error::Validation("email is invalid".into()));
        }
        if !self.phone.chars().any(|c| c.is_ascii_digit()) {
            return Err(Error::Validation("phone is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedLead {
    pub id: String,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Full lead with decrypted data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadDetail {
    pub id: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub created_at: DateTime<Utc>,
    pub assigned_to: Option<String>,
    pub consent_id: Option<String>,
    pub data: LeadPayload,
}

pub struct LeadService {
    store: Arc<SqliteStore>,
    cipher: Arc<FieldCipher>,
    audit: AuditTrail,
    notifier: Arc<dyn Notifier>,
}

impl LeadService {
    pub fn new(
        store: Arc<SqliteStore>,
        cipher: Arc<FieldCipher>,
        audit: AuditTrail,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            cipher,
            audit,
            notifier,
        }
    }

    /// Persist a lead. The referenced consent must be an active
    /// personal-data consent; otherwise nothing is stored. Every attempt is
    /// audited as `lead_created` or `lead_created:error`.
    pub fn create_lead(
        &self,
        ctx: &RequestContext,
        payload: LeadPayload,
        consent_id: &str,
        source: LeadSource,
    ) -> Result<CreatedLead> {
        let result = self.persist(payload, consent_id, source);
        self.audit.outcome(
            ctx,
            "lead_created",
            "lead",
            result.as_ref().ok().map(|l| l.id.as_str()),
            &result,
        );
        let created = result?;

        let notification = Notification::NewLead {
            lead_id: created.id.clone(),
            status: created.status.to_string(),
            source: source.to_string(),
            created_at: created.created_at,
        };
        if let Err(e) = self.notifier.notify(notification) {
            warn!("Lead {} notification failed: {}", created.id, e);
        }
        Ok(created)
    }

    fn persist(
        &self,
        payload: LeadPayload,
        consent_id: &str,
        source: LeadSource,
    ) -> Result<CreatedLead> {
        payload.validate()?;
        let encrypted_data = self.cipher.encrypt(&payload)?;
        drop(payload);

        let now = Utc::now();
        let lead = Lead {
            id: uuid::Uuid::new_v4().to_string(),
            encrypted_data,
            consent_id: Some(consent_id.to_string()),
            source,
            status: LeadStatus::New,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };

        self.store.write(|tx| {
            let consent = tx.get_consent(consent_id)?;
            let valid = consent
                .is_some_and(|c| c.consent_type == ConsentType::PersonalData && c.is_active());
            if !valid {
                return Err(Error::ConsentRequired);
            }
            tx.insert_lead(&lead)
        })?;

        info!("Lead {} created: source={}", lead.id, source);
        Ok(CreatedLead {
            id: lead.id,
            status: lead.status,
            created_at: lead.created_at,
        })
    }

    /// Metadata only; never decrypts.
    pub fn list_leads(&self, query: &LeadQuery) -> Result<Vec<LeadSummary>> {
        self.store.read(|tx| tx.list_leads(query))
    }

    /// Read and decrypt a lead. The `lead_viewed` entry is written in the same
    /// transaction as the read: if it cannot be written, no data is returned.
    pub fn get_lead(&self, ctx: &RequestContext, lead_id: &str) -> Result<LeadDetail> {
        let result = self.store.write(|tx| {
            let lead = tx
                .get_lead(lead_id)?
                .ok_or_else(|| Error::NotFound(format!("lead {}", lead_id)))?;
            let data: LeadPayload = self.cipher.decrypt(&lead.encrypted_data)?;
            AuditTrail::record_in(
                tx,
                &AuditTrail::entry(ctx, "lead_viewed", "lead", Some(lead_id), serde_json::json!({})),
            )?;
            Ok(LeadDetail {
                id: lead.id,
                status: lead.status,
                source: lead.source,
                created_at: lead.created_at,
                assigned_to: lead.assigned_to,
                consent_id: lead.consent_id,
                data,
            })
        });

        match &result {
            Err(Error::AuditUnavailable(e)) => {
                error!("Lead {} withheld, audit write failed: {}", lead_id, e);
            }
            Err(e) => self.audit.record(
                ctx,
                "lead_viewed:error",
                "lead",
                Some(lead_id),
                serde_json::json!({ "error": e.to_string() }),
            ),
            Ok(_) => {}
        }
        result
    }

    pub fn update_status(&self, ctx: &RequestContext, lead_id: &str, status: LeadStatus) -> Result<()> {
        self.audit
            .audited(ctx, "lead_status_updated", "lead", Some(lead_id), || {
                let found = self
                    .store
                    .write(|tx| tx.update_lead_status(lead_id, status, &Utc::now()))?;
                if !found {
                    return Err(Error::NotFound(format!("lead {}", lead_id)));
                }
                Ok(())
            })
    }

    pub fn assign(&self, ctx: &RequestContext, lead_id: &str, assignee: Option<&str>) -> Result<()> {
        self.audit
            .audited(ctx, "lead_assigned", "lead", Some(lead_id), || {
                let found = self
                    .store
                    .write(|tx| tx.assign_lead(lead_id, assignee, &Utc::now()))?;
                if !found {
                    return Err(Error::NotFound(format!("lead {}", lead_id)));
                }
                Ok(())
            })
    }

    /// Permanent removal.
    pub fn delete_lead(&self, ctx: &RequestContext, lead_id: &str) -> Result<()> {
        self.audit
            .audited(ctx, "lead_deleted", "lead", Some(lead_id), || {
                if !self.store.write(|tx| tx.delete_lead(lead_id))? {
                    return Err(Error::NotFound(format!("lead {}", lead_id)));
                }
                Ok(())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::ConsentLedger;
    use crate::crypto::generate_key;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use transcargo_store::AuditFilter;

    /// Captures notifications; optionally fails every delivery.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl Notifier for Recorder {
        fn notify(&self, notification: Notification) -> Result<()> {
            self.seen.lock().unwrap().push(notification);
            if self.fail {
                Err(Error::Internal("mail relay down".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        ledger: ConsentLedger,
        leads: LeadService,
        audit: AuditTrail,
        store: Arc<SqliteStore>,
        notifier: Arc<Recorder>,
        dir: TempDir,
    }

    fn fixture(fail_notify: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let cipher = Arc::new(FieldCipher::new(Some(&generate_key())));
        let audit = AuditTrail::new(store.clone());
        let notifier = Arc::new(Recorder {
            fail: fail_notify,
            ..Default::default()
        });
        Fixture {
            ledger: ConsentLedger::new(store.clone(), cipher.clone(), "v1"),
            leads: LeadService::new(store.clone(), cipher, audit.clone(), notifier.clone()),
            audit,
            store,
            notifier,
            dir,
        }
    }

    fn payload() -> LeadPayload {
        LeadPayload {
            name: "Анна".into(),
            email: "anna@example.ru".into(),
            phone: "+7 901 111 22 33".into(),
            company: None,
            message: Some("Нужна доставка 2 паллет из Гуанчжоу".into()),
        }
    }

    fn consent(f: &Fixture, consent_type: ConsentType) -> String {
        f.ledger
            .record_consent("anna@example.ru", "+79011112233", consent_type, None, None, None)
            .unwrap()
            .consent_id
    }

    fn submit(f: &Fixture, consent_id: &str) -> Result<CreatedLead> {
        f.leads.create_lead(
            &RequestContext::anonymous(),
            payload(),
            consent_id,
            LeadSource::ContactForm,
        )
    }

    fn audit_count(f: &Fixture, action: &str) -> i64 {
        f.audit
            .query(&AuditFilter {
                action: Some(action.into()),
                ..Default::default()
            })
            .unwrap()
            .total
    }

    #[test]
    fn test_create_requires_active_personal_data_consent() {
        let f = fixture(false);
        let marketing = consent(&f, ConsentType::Marketing);
        assert!(matches!(
            submit(&f, &marketing),
            Err(Error::ConsentRequired)
        ));
        assert!(matches!(
            submit(&f, "no-such-consent"),
            Err(Error::ConsentRequired)
        ));

        let pd = consent(&f, ConsentType::PersonalData);
        f.ledger.revoke(&pd).unwrap();
        assert!(matches!(
            submit(&f, &pd),
            Err(Error::ConsentRequired)
        ));
        assert!(f.leads.list_leads(&LeadQuery::default()).unwrap().is_empty());
        assert!(f.notifier.seen.lock().unwrap().is_empty());
        assert_eq!(audit_count(&f, "lead_created"), 0);
        assert_eq!(audit_count(&f, "lead_created:error"), 3);
    }

    #[test]
    fn test_create_encrypts_and_notifies() {
        let f = fixture(false);
        let pd = consent(&f, ConsentType::PersonalData);
        let visitor = RequestContext::new(
            "anonymous",
            Some("203.0.113.9".into()),
            Some("Mozilla/5.0".into()),
        );
        let created = f
            .leads
            .create_lead(&visitor, payload(), &pd, LeadSource::QuoteForm)
            .unwrap();
        assert_eq!(created.status, LeadStatus::New);

        let page = f
            .audit
            .query(&AuditFilter {
                action: Some("lead_created".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].entity_id.as_deref(), Some(created.id.as_str()));
        assert_eq!(page.items[0].ip_address.as_deref(), Some("203.0.113.9"));

        for file in ["transcargo.db", "transcargo.db-wal"] {
            if let Ok(raw) = std::fs::read(f.dir.path().join(file)) {
                assert!(!String::from_utf8_lossy(&raw).contains("anna@example.ru"));
            }
        }

        let seen = f.notifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Notification::NewLead { lead_id, .. } if *lead_id == created.id));
    }

    #[test]
    fn test_notifier_failure_does_not_fail_create() {
        let f = fixture(true);
        let pd = consent(&f, ConsentType::PersonalData);
        assert!(submit(&f, &pd).is_ok());
        assert_eq!(f.leads.list_leads(&LeadQuery::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_get_lead_audits_each_view() {
        let f = fixture(false);
        let pd = consent(&f, ConsentType::PersonalData);
        let created = submit(&f, &pd).unwrap();
        let ctx = RequestContext::new("manager", Some("10.1.1.1".into()), None);

        let detail = f.leads.get_lead(&ctx, &created.id).unwrap();
        assert_eq!(detail.data, payload());
        assert_eq!(detail.consent_id.as_deref(), Some(pd.as_str()));
        f.leads.get_lead(&ctx, &created.id).unwrap();
        assert_eq!(audit_count(&f, "lead_viewed"), 2);

        assert!(matches!(f.leads.get_lead(&ctx, "missing"), Err(Error::NotFound(_))));
        assert_eq!(audit_count(&f, "lead_viewed"), 2);
        assert_eq!(audit_count(&f, "lead_viewed:error"), 1);
    }

    #[test]
    fn test_get_lead_withheld_when_audit_unavailable() {
        let f = fixture(false);
        let pd = consent(&f, ConsentType::PersonalData);
        let created = submit(&f, &pd).unwrap();

        let conn = rusqlite::Connection::open(f.store.db_path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER audit_offline BEFORE INSERT ON audit_logs BEGIN
                 SELECT RAISE(ABORT, 'audit offline');
             END;",
        )
        .unwrap();

        let result = f.leads.get_lead(&RequestContext::anonymous(), &created.id);
        assert!(matches!(result, Err(Error::AuditUnavailable(_))));
    }

    #[test]
    fn test_status_assign_delete() {
        let f = fixture(false);
        let pd = consent(&f, ConsentType::PersonalData);
        let created = submit(&f, &pd).unwrap();
        let ctx = RequestContext::new("admin", None, None);

        f.leads.update_status(&ctx, &created.id, LeadStatus::InProgress).unwrap();
        f.leads.assign(&ctx, &created.id, Some("ivan@asiatranscargo.ru")).unwrap();
        let detail = f.leads.get_lead(&ctx, &created.id).unwrap();
        assert_eq!(detail.status, LeadStatus::InProgress);
        assert_eq!(detail.assigned_to.as_deref(), Some("ivan@asiatranscargo.ru"));

        f.leads.delete_lead(&ctx, &created.id).unwrap();
        assert!(matches!(
            f.leads.delete_lead(&ctx, &created.id),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            f.leads.update_status(&ctx, &created.id, LeadStatus::Closed),
            Err(Error::NotFound(_))
        ));
        assert_eq!(audit_count(&f, "lead_deleted"), 1);
        assert_eq!(audit_count(&f, "lead_deleted:error"), 1);
    }

    #[test]
    fn test_payload_debug_redacted() {
        assert_eq!(format!("{:?}", payload()), "LeadPayload { .. }");
    }

    #[test]
    fn test_payload_validation() {
        let f = fixture(false);
        let pd = consent(&f, ConsentType::PersonalData);
        let mut bad = payload();
        bad.name = " ".into();
        assert!(matches!(
            f.leads
                .create_lead(&RequestContext::anonymous(), bad, &pd, LeadSource::ContactForm),
            Err(Error::Validation(_))
        ));
    }
}
