//! Consent ledger.
//!
//! Per (user_hash, consent_type) a record moves absent -> granted <-> revoked
//! and never returns to absent. Re-consenting updates the same record.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{pseudonymize, FieldCipher};
use crate::gdpr;
use transcargo_core::{Error, Result};
use transcargo_store::{ConsentRecord, ConsentType, NewConsent, SqliteStore};

/// Returned to the data subject after consenting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentReceipt {
    pub consent_id: String,
    pub user_hash: String,
    pub consent_type: ConsentType,
    pub policy_version: String,
}

/// Outcome of a revoke request.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeOutcome {
    pub consent: ConsentRecord,
    /// Leads erased as a consequence. Always 0 for non-personal-data consents.
    pub deleted_leads: usize,
}

pub struct ConsentLedger {
    store: Arc<SqliteStore>,
    cipher: Arc<FieldCipher>,
    default_policy_version: String,
}

impl ConsentLedger {
    pub fn new(
        store: Arc<SqliteStore>,
        cipher: Arc<FieldCipher>,
        default_policy_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cipher,
            default_policy_version: default_policy_version.into(),
        }
    }

    /// Grant (or re-grant) consent for the subject identified by email+phone.
    pub fn record_consent(
        &self,
        email: &str,
        phone: &str,
        consent_type: ConsentType,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        policy_version: Option<&str>,
    ) -> Result<ConsentReceipt> {
        validate_identity(email, phone)?;
        let user_hash = pseudonymize(email, phone);
        let ip_address = origin_ip
            .filter(|ip| !ip.is_empty())
            .map(|ip| self.cipher.encrypt_text(ip))
            .transpose()?;
        let policy_version = policy_version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.default_policy_version)
            .to_string();

        let record = self.store.write(|tx| {
            tx.upsert_consent(&NewConsent {
                user_hash: user_hash.clone(),
                consent_type,
                ip_address,
                user_agent: user_agent.map(str::to_string),
                policy_version,
            })
        })?;

        debug!(
            "Consent {} granted: type={} policy={}",
            record.id, consent_type, record.policy_version
        );
        Ok(ConsentReceipt {
            consent_id: record.id,
            user_hash,
            consent_type,
            policy_version: record.policy_version,
        })
    }

    pub fn is_active(&self, user_hash: &str, consent_type: ConsentType) -> Result<bool> {
        let record = self
            .store
            .read(|tx| tx.find_consent(user_hash, consent_type))?;
        Ok(record.is_some_and(|r| r.is_active()))
    }

    /// Active flag for every consent type. Unknown subjects get all `false`.
    pub fn statuses(&self, user_hash: &str) -> Result<BTreeMap<String, bool>> {
        let records = self.store.read(|tx| tx.consents_for_hash(user_hash))?;
        Ok(ConsentType::ALL
            .iter()
            .map(|t| {
                let active = records
                    .iter()
                    .any(|r| r.consent_type == *t && r.is_active());
                (t.as_str().to_string(), active)
            })
            .collect())
    }

    pub fn get(&self, consent_id: &str) -> Result<ConsentRecord> {
        self.store
            .read(|tx| tx.get_consent(consent_id))?
            .ok_or_else(|| Error::NotFound(format!("consent {}", consent_id)))
    }

    pub fn list_for_hash(&self, user_hash: &str) -> Result<Vec<ConsentRecord>> {
        self.store.read(|tx| tx.consents_for_hash(user_hash))
    }

    /// Revoke a consent. Idempotent: revoking twice keeps the first `revoked_at`.
    pub fn revoke(&self, consent_id: &str) -> Result<ConsentRecord> {
        self.store.write(|tx| {
            tx.get_consent(consent_id)?
                .ok_or_else(|| Error::NotFound(format!("consent {}", consent_id)))?;
            tx.revoke_consent(consent_id, &chrono::Utc::now())?;
            tx.get_consent(consent_id)?
                .ok_or_else(|| Error::NotFound(format!("consent {}", consent_id)))
        })
    }

    /// Revoke, and when the consent covers personal data, erase the subject's
    /// leads in the same transaction.
    pub fn revoke_with_cascade(&self, consent_id: &str) -> Result<RevokeOutcome> {
        let outcome = self.store.write(|tx| {
            let consent = tx
                .get_consent(consent_id)?
                .ok_or_else(|| Error::NotFound(format!("consent {}", consent_id)))?;
            let now = chrono::Utc::now();
            tx.revoke_consent(consent_id, &now)?;

            let deleted_leads = if consent.consent_type == ConsentType::PersonalData {
                gdpr::erase_in(tx, &consent.user_hash, &now)?
            } else {
                0
            };
            let consent = tx
                .get_consent(consent_id)?
                .ok_or_else(|| Error::NotFound(format!("consent {}", consent_id)))?;
            Ok(RevokeOutcome {
                consent,
                deleted_leads,
            })
        })?;

        info!(
            "Consent {} revoked: type={} deleted_leads={}",
            consent_id, outcome.consent.consent_type, outcome.deleted_leads
        );
        Ok(outcome)
    }
}

fn validate_identity(email: &str, phone: &str) -> Result<()> {
    let email = email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(Error::Validation("email is invalid".into()));
    }
    if !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::Validation("phone is required".into()));
    }
    Ok(())
}
