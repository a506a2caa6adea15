//! Row types for consents, leads, audit entries and site content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transcargo_core::Error;

/// Declares a closed set of string-valued states stored as TEXT columns.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "invalid {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Purpose a data subject consented to.
    ConsentType {
        PersonalData => "personal_data",
        Marketing => "marketing",
        Analytics => "analytics",
    }
);

string_enum!(LeadSource {
    ContactForm => "contact_form",
    QuoteForm => "quote_form",
});

string_enum!(LeadStatus {
    New => "new",
    InProgress => "in_progress",
    Closed => "closed",
});

string_enum!(ServiceType {
    Auto => "auto",
    Railway => "railway",
    Air => "air",
    Sea => "sea",
    Customs => "customs",
});

string_enum!(ArticleStatus {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

string_enum!(CaseStudyStatus {
    Draft => "draft",
    Published => "published",
});

string_enum!(SeoEntityType {
    Article => "article",
    Country => "country",
    Service => "service",
    CaseStudy => "case_study",
});

// ---------------------------------------------------------------
// Personal data
// ---------------------------------------------------------------

/// A consent ledger row. At most one per (user_hash, consent_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: String,
    pub user_hash: String,
    pub consent_type: ConsentType,
    pub is_granted: bool,
    /// Encrypted origin IP token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub policy_version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    pub fn is_active(&self) -> bool {
        self.is_granted && self.revoked_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewConsent {
    pub user_hash: String,
    pub consent_type: ConsentType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub policy_version: String,
}

/// A stored lead. `encrypted_data` never leaves the service layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(skip_serializing)]
    pub encrypted_data: String,
    pub consent_id: Option<String>,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lead listing row: metadata only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSummary {
    pub id: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LeadQuery {
    pub status: Option<LeadStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// An append-only audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub user_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

/// Audit listing filter. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub page: usize,
    pub size: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            action: None,
            entity_type: None,
            page: 1,
            size: 50,
        }
    }
}

// ---------------------------------------------------------------
// Content
// ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub id: String,
    pub code: String,
    pub name_ru: String,
    pub name_en: String,
    pub flag_emoji: Option<String>,
    pub is_active: bool,
    pub seo_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Country {
    /// Keywords stored under `seo_data.keywords`, if any.
    pub fn seo_keywords(&self) -> Vec<String> {
        self.seo_data
            .get("keywords")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCountry {
    pub code: String,
    pub name_ru: String,
    pub name_en: String,
    #[serde(default)]
    pub flag_emoji: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "empty_object")]
    pub seo_data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountryPatch {
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub flag_emoji: Option<String>,
    pub is_active: Option<bool>,
    pub seo_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub country_id: String,
    pub service_type: ServiceType,
    pub title_ru: String,
    pub title_en: String,
    pub description: Option<String>,
    pub price_info: serde_json::Value,
    pub transit_time_days: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub country_id: String,
    pub service_type: ServiceType,
    pub title_ru: String,
    pub title_en: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub price_info: serde_json::Value,
    #[serde(default)]
    pub transit_time_days: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePatch {
    pub service_type: Option<ServiceType>,
    pub title_ru: Option<String>,
    pub title_en: Option<String>,
    pub description: Option<String>,
    pub price_info: Option<serde_json::Value>,
    pub transit_time_days: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub seo_keywords: Vec<String>,
    pub status: ArticleStatus,
    pub country_id: Option<String>,
    pub auto_generated: bool,
    pub views_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub slug: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
    #[serde(default = "draft_article")]
    pub status: ArticleStatus,
    #[serde(default)]
    pub country_id: Option<String>,
    #[serde(default)]
    pub auto_generated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticlePatch {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub seo_keywords: Option<Vec<String>>,
    pub status: Option<ArticleStatus>,
    pub country_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseStudy {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub client_name: Option<String>,
    pub cargo_type: Option<String>,
    pub delivery_time: Option<i64>,
    pub images: Vec<String>,
    pub status: CaseStudyStatus,
    pub country_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCaseStudy {
    pub slug: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub cargo_type: Option<String>,
    #[serde(default)]
    pub delivery_time: Option<i64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "draft_case")]
    pub status: CaseStudyStatus,
    pub country_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseStudyPatch {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub client_name: Option<String>,
    pub cargo_type: Option<String>,
    pub delivery_time: Option<i64>,
    pub images: Option<Vec<String>>,
    pub status: Option<CaseStudyStatus>,
}

/// SEO metadata, one row per content entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub id: String,
    pub entity_type: SeoEntityType,
    pub entity_id: String,
    pub path: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub schema_markup: serde_json::Value,
    pub canonical_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn draft_article() -> ArticleStatus {
    ArticleStatus::Draft
}

fn draft_case() -> CaseStudyStatus {
    CaseStudyStatus::Draft
}
