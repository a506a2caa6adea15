//! Admin notifications. Delivery is best-effort and must never carry
//! personal data: only ids and status fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use transcargo_core::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    NewLead {
        lead_id: String,
        status: String,
        source: String,
        created_at: DateTime<Utc>,
    },
    NewArticleDraft {
        article_id: String,
        slug: String,
        title: String,
    },
}

impl Notification {
    pub fn job_name(&self) -> &'static str {
        match self {
            Notification::NewLead { .. } => "notify_admins_new_lead",
            Notification::NewArticleDraft { .. } => "notify_admins_new_article_draft",
        }
    }
}

/// Sink for admin notifications. Implementations must not block on delivery.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) -> Result<()> {
        deliver(&notification);
        Ok(())
    }
}

/// Final delivery step shared by every notifier.
pub fn deliver(notification: &Notification) -> serde_json::Value {
    match notification {
        Notification::NewLead {
            lead_id,
            status,
            source,
            ..
        } => info!(
            "[notify] New lead id={} status={} source={}",
            lead_id, status, source
        ),
        Notification::NewArticleDraft {
            article_id, slug, ..
        } => info!("[notify] New article draft id={} slug={}", article_id, slug),
    }
    serde_json::to_value(notification).unwrap_or(serde_json::Value::Null)
}
