//! Auto-publish state kept in the cache: global keyword settings and a
//! snapshot of recent queue activity for the admin UI.
//!
//! Reads degrade to defaults when the cache fails; only settings updates
//! report cache errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use transcargo_core::Result;
use transcargo_store::Cache;

pub const SETTINGS_KEY: &str = "auto_publish:settings";
pub const QUEUE_KEY: &str = "auto_publish:queue";

const SETTINGS_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const QUEUE_TTL: Duration = Duration::from_secs(24 * 3600);
const QUEUE_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoPublishSettings {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn load_settings(cache: &dyn Cache) -> AutoPublishSettings {
    match cache.get_json(SETTINGS_KEY) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        Ok(None) => AutoPublishSettings::default(),
        Err(e) => {
            warn!("Auto-publish settings unavailable: {}", e);
            AutoPublishSettings::default()
        }
    }
}

/// Replace the global keywords (blank entries dropped). `None` keeps the
/// current list and only refreshes `updated_at`.
pub fn update_settings(cache: &dyn Cache, keywords: Option<Vec<String>>) -> Result<AutoPublishSettings> {
    let mut settings = load_settings(cache);
    if let Some(keywords) = keywords {
        settings.keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
    }
    settings.updated_at = Some(Utc::now());
    cache.set_json(SETTINGS_KEY, &serde_json::to_value(&settings)?, SETTINGS_TTL)?;
    Ok(settings)
}

/// Oldest first.
pub fn queue_entries(cache: &dyn Cache) -> Vec<serde_json::Value> {
    match cache.get_json(QUEUE_KEY) {
        Ok(Some(serde_json::Value::Array(items))) => items,
        Ok(_) => Vec::new(),
        Err(e) => {
            warn!("Auto-publish queue snapshot unavailable: {}", e);
            Vec::new()
        }
    }
}

/// Append an entry, keeping the newest entries only.
pub fn push_queue_entry(cache: &dyn Cache, entry: serde_json::Value) {
    let mut items = queue_entries(cache);
    items.push(entry);
    if items.len() > QUEUE_MAX_ENTRIES {
        let excess = items.len() - QUEUE_MAX_ENTRIES;
        items.drain(..excess);
    }
    if let Err(e) = cache.set_json(QUEUE_KEY, &serde_json::Value::Array(items), QUEUE_TTL) {
        warn!("Failed to update auto-publish queue snapshot: {}", e);
    }
}
