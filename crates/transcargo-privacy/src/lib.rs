//! TransCargo Privacy: field encryption, consent ledger, lead store,
//! data-subject rights and the audit trail.

pub mod audit;
pub mod consent;
pub mod crypto;
pub mod gdpr;
pub mod leads;
pub mod notify;

pub use audit::{AccessReport, AuditPage, AuditTrail, RequestContext};
pub use consent::{ConsentLedger, ConsentReceipt, RevokeOutcome};
pub use crypto::{generate_key, pseudonymize, FieldCipher};
pub use gdpr::{GdprService, SubjectExport};
pub use leads::{CreatedLead, LeadDetail, LeadPayload, LeadService};
pub use notify::{LogNotifier, Notification, Notifier};
