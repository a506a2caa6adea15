//! End-to-end personal-data lifecycle: consent, capture, access, revoke.

use std::sync::Arc;

use tempfile::TempDir;
use transcargo_core::Error;
use transcargo_privacy::*;
use transcargo_store::{AuditFilter, ConsentType, LeadQuery, LeadSource, SqliteStore};

struct Services {
    ledger: ConsentLedger,
    leads: LeadService,
    gdpr: GdprService,
    audit: AuditTrail,
    _dir: TempDir,
}

fn services() -> Services {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
    let cipher = Arc::new(FieldCipher::new(Some(&generate_key())));
    let audit = AuditTrail::new(store.clone());
    Services {
        ledger: ConsentLedger::new(store.clone(), cipher.clone(), "v1"),
        leads: LeadService::new(
            store.clone(),
            cipher.clone(),
            audit.clone(),
            Arc::new(LogNotifier),
        ),
        gdpr: GdprService::new(store, cipher, audit.clone()),
        audit,
        _dir: dir,
    }
}

fn payload(email: &str, phone: &str) -> LeadPayload {
    LeadPayload {
        name: "Сергей".into(),
        email: email.into(),
        phone: phone.into(),
        company: Some("ТК Север".into()),
        message: Some("Контейнер 40HC Нинбо - Москва".into()),
    }
}

#[test]
fn personal_data_revoke_erases_leads_but_keeps_audit() {
    let s = services();
    let manager = RequestContext::new("manager@asiatranscargo.ru", Some("10.0.0.2".into()), None);
    let visitor = RequestContext::new("anonymous", Some("198.51.100.7".into()), None);

    let receipt = s
        .ledger
        .record_consent(
            "sergey@sever.ru",
            "+7 (495) 100-20-30",
            ConsentType::PersonalData,
            Some("198.51.100.4"),
            Some("Mozilla/5.0"),
            None,
        )
        .unwrap();
    let lead = s
        .leads
        .create_lead(
            &visitor,
            payload("sergey@sever.ru", "+7 (495) 100-20-30"),
            &receipt.consent_id,
            LeadSource::QuoteForm,
        )
        .unwrap();

    let listed = s.leads.list_leads(&LeadQuery::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, lead.id);

    let detail = s.leads.get_lead(&manager, &lead.id).unwrap();
    assert_eq!(detail.data.email, "sergey@sever.ru");

    let outcome = s.ledger.revoke_with_cascade(&receipt.consent_id).unwrap();
    assert_eq!(outcome.deleted_leads, 1);
    assert!(!outcome.consent.is_active());

    assert!(matches!(s.leads.get_lead(&manager, &lead.id), Err(Error::NotFound(_))));
    assert!(s
        .gdpr
        .export(&manager, &receipt.user_hash)
        .unwrap()
        .leads
        .is_empty());

    // The view before revocation stays on record.
    let views = s
        .audit
        .query(&AuditFilter {
            action: Some("lead_viewed".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(views.total, 1);
    assert_eq!(views.items[0].user_id, "manager@asiatranscargo.ru");

    // A new lead needs a fresh consent.
    assert!(matches!(
        s.leads.create_lead(
            &visitor,
            payload("sergey@sever.ru", "+74951002030"),
            &receipt.consent_id,
            LeadSource::ContactForm
        ),
        Err(Error::ConsentRequired)
    ));
    let count = |action: &str| {
        s.audit
            .query(&AuditFilter {
                action: Some(action.into()),
                ..Default::default()
            })
            .unwrap()
            .total
    };
    assert_eq!(count("lead_created"), 1);
    assert_eq!(count("lead_created:error"), 1);
}

#[test]
fn marketing_revoke_leaves_leads_alone() {
    let s = services();
    let pd = s
        .ledger
        .record_consent("olga@x.ru", "+7 900 1", ConsentType::PersonalData, None, None, None)
        .unwrap();
    let marketing = s
        .ledger
        .record_consent("olga@x.ru", "+7 900 1", ConsentType::Marketing, None, None, None)
        .unwrap();
    assert_eq!(pd.user_hash, marketing.user_hash);

    s.leads
        .create_lead(
            &RequestContext::anonymous(),
            payload("olga@x.ru", "+79001"),
            &pd.consent_id,
            LeadSource::ContactForm,
        )
        .unwrap();

    let outcome = s.ledger.revoke_with_cascade(&marketing.consent_id).unwrap();
    assert_eq!(outcome.deleted_leads, 0);

    let statuses = s.ledger.statuses(&pd.user_hash).unwrap();
    assert!(statuses["personal_data"]);
    assert!(!statuses["marketing"]);
    assert_eq!(s.leads.list_leads(&LeadQuery::default()).unwrap().len(), 1);
}

#[test]
fn concurrent_revokes_converge() {
    let s = Arc::new(services());
    let receipt = s
        .ledger
        .record_consent("a@b.ru", "1", ConsentType::Analytics, None, None, None)
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let s = s.clone();
            let id = receipt.consent_id.clone();
            std::thread::spawn(move || s.ledger.revoke(&id).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = results[0].revoked_at;
    assert!(first.is_some());
    assert!(results.iter().all(|r| r.revoked_at == first && !r.is_granted));
}

#[test]
fn gdpr_delete_spans_every_consent_of_the_subject() {
    let s = services();
    let ctx = RequestContext::new("admin", None, None);
    let pd = s
        .ledger
        .record_consent("m@x.ru", "5", ConsentType::PersonalData, None, None, None)
        .unwrap();
    s.ledger
        .record_consent("m@x.ru", "5", ConsentType::Analytics, None, None, None)
        .unwrap();
    for _ in 0..3 {
        s.leads
            .create_lead(&ctx, payload("m@x.ru", "5"), &pd.consent_id, LeadSource::ContactForm)
            .unwrap();
    }

    let other = s
        .ledger
        .record_consent("n@x.ru", "6", ConsentType::PersonalData, None, None, None)
        .unwrap();
    s.leads
        .create_lead(&ctx, payload("n@x.ru", "6"), &other.consent_id, LeadSource::ContactForm)
        .unwrap();

    assert_eq!(s.gdpr.delete(&ctx, &pd.user_hash).unwrap(), 3);
    assert!(s.ledger.statuses(&pd.user_hash).unwrap().values().all(|v| !v));
    assert_eq!(s.leads.list_leads(&LeadQuery::default()).unwrap().len(), 1);
    assert!(s.ledger.is_active(&other.user_hash, ConsentType::PersonalData).unwrap());

    let report = s.audit.report(1).unwrap();
    assert_eq!(report.total_accesses, 0);
}
