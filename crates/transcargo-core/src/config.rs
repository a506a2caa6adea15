//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths to the TransCargo data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite database directory (`data/db/`).
    pub db: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            root,
        };
        std::fs::create_dir_all(&paths.db)?;
        Ok(paths)
    }
}

/// Background job pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_secs: u64,
    /// Upper bound on a single backoff delay.
    pub retry_delay_max_secs: u64,
    /// Soft limit: exceeded jobs are logged but keep running.
    pub soft_time_limit_secs: u64,
    /// Hard limit: exceeded jobs are aborted and count as a failed attempt.
    pub hard_time_limit_secs: u64,
    /// Global article-generation calls per one-minute window.
    pub generation_rate_per_minute: u32,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 3,
            retry_delay_secs: 10,
            retry_delay_max_secs: 600,
            soft_time_limit_secs: 180,
            hard_time_limit_secs: 200,
            generation_rate_per_minute: 3,
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for article drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Top-level TransCargo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub project_name: String,
    pub environment: String,
    /// HTTP server port.
    pub port: u16,
    pub data_paths: DataPaths,
    /// Base64 AES-256 key for field encryption. Encryption fails while unset.
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,
    /// HMAC key for bearer tokens.
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub admin_username: String,
    #[serde(skip_serializing)]
    pub admin_password: String,
    pub manager_users: Vec<String>,
    pub viewer_users: Vec<String>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub policy_version: String,
    pub gdpr_region: String,
    pub cache_enabled: bool,
    /// Competitor names scrubbed from generated copy.
    pub content_blacklist: Vec<String>,
    pub openai: OpenAiSettings,
    pub jobs: JobSettings,
}

pub const DEFAULT_BLACKLIST: &[&str] = &["DHL", "FedEx", "UPS", "ПЭК", "Байкал-Сервис"];

impl AppConfig {
    /// Defaults for a given data directory, no environment consulted.
    pub fn new(data_paths: DataPaths) -> Self {
        Self {
            project_name: "Asia Trans Cargo".to_string(),
            environment: "development".to_string(),
            port: 8000,
            data_paths,
            encryption_key: None,
            secret_key: "change_me".to_string(),
            access_token_expire_minutes: 30,
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            manager_users: Vec::new(),
            viewer_users: Vec::new(),
            cors_origins: Vec::new(),
            policy_version: "v1".to_string(),
            gdpr_region: "RU".to_string(),
            cache_enabled: true,
            content_blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            openai: OpenAiSettings::default(),
            jobs: JobSettings::default(),
        }
    }

    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(data_dir: impl AsRef<Path>, lookup: F) -> std::io::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(DataPaths::new(data_dir)?);
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("PROJECT_NAME") {
            config.project_name = v;
        }
        if let Some(v) = var("ENVIRONMENT") {
            config.environment = v;
        }
        config.port = parse_or(var("PORT").or_else(|| var("BACKEND_PORT")), config.port);
        config.encryption_key = var("ENCRYPTION_KEY");
        if let Some(v) = var("SECRET_KEY") {
            config.secret_key = v;
        }
        config.access_token_expire_minutes = parse_or(
            var("ACCESS_TOKEN_EXPIRE_MINUTES"),
            config.access_token_expire_minutes,
        );
        if let Some(v) = var("ADMIN_USERNAME") {
            config.admin_username = v;
        }
        if let Some(v) = var("ADMIN_PASSWORD") {
            config.admin_password = v;
        }
        config.manager_users = split_list(var("MANAGER_USERS"));
        config.viewer_users = split_list(var("VIEWER_USERS"));
        config.cors_origins = split_list(var("CORS_ORIGINS"));
        if let Some(v) = var("POLICY_VERSION") {
            config.policy_version = v;
        }
        if let Some(v) = var("GDPR_REGION") {
            config.gdpr_region = v;
        }
        config.cache_enabled = parse_bool(var("CACHE_ENABLED"), config.cache_enabled);
        let blacklist = split_list(var("CONTENT_BLACKLIST"));
        if !blacklist.is_empty() {
            config.content_blacklist = blacklist;
        }

        config.openai.api_key = var("OPENAI_API_KEY");
        if let Some(v) = var("OPENAI_API_BASE") {
            config.openai.api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = var("OPENAI_MODEL") {
            config.openai.model = v;
        }

        let jobs = &mut config.jobs;
        jobs.workers = parse_or(var("JOB_WORKERS"), jobs.workers).max(1);
        jobs.max_retries = parse_or(var("JOB_MAX_RETRIES"), jobs.max_retries);
        jobs.retry_delay_secs = parse_or(var("JOB_RETRY_DELAY_SECS"), jobs.retry_delay_secs);
        jobs.soft_time_limit_secs =
            parse_or(var("JOB_SOFT_TIME_LIMIT_SECS"), jobs.soft_time_limit_secs);
        jobs.hard_time_limit_secs =
            parse_or(var("JOB_HARD_TIME_LIMIT_SECS"), jobs.hard_time_limit_secs);
        jobs.generation_rate_per_minute = parse_or(
            var("RATE_LIMIT_PER_MINUTE"),
            jobs.generation_rate_per_minute,
        );

        if config.secret_key == "change_me" && config.is_production() {
            tracing::warn!("SECRET_KEY is left at its default in production");
        }
        if config.encryption_key.is_none() {
            tracing::warn!("ENCRYPTION_KEY is not set; lead capture will fail");
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn load(vars: &[(&str, &str)]) -> (AppConfig, TempDir) {
        let dir = TempDir::new().unwrap();
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = AppConfig::from_lookup(dir.path(), |k| map.get(k).cloned()).unwrap();
        (config, dir)
    }

    #[test]
    fn test_defaults() {
        let (config, dir) = load(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.access_token_expire_minutes, 30);
        assert_eq!(config.jobs.max_retries, 3);
        assert_eq!(config.jobs.soft_time_limit_secs, 180);
        assert_eq!(config.jobs.hard_time_limit_secs, 200);
        assert_eq!(config.jobs.generation_rate_per_minute, 3);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.content_blacklist.len(), DEFAULT_BLACKLIST.len());
        assert!(config.encryption_key.is_none());
        assert!(dir.path().join("db").is_dir());
    }

    #[test]
    fn test_lists_and_overrides() {
        let (config, _dir) = load(&[
            ("PORT", "9100"),
            ("MANAGER_USERS", " anna@x.ru, ,boris@x.ru "),
            ("CORS_ORIGINS", "https://a.ru,https://b.ru"),
            ("CONTENT_BLACKLIST", "Acme"),
            ("OPENAI_API_BASE", "http://localhost:9999/v1/"),
            ("JOB_WORKERS", "0"),
            ("CACHE_ENABLED", "off"),
        ]);
        assert_eq!(config.port, 9100);
        assert_eq!(config.manager_users, vec!["anna@x.ru", "boris@x.ru"]);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.content_blacklist, vec!["Acme"]);
        assert_eq!(config.openai.api_base, "http://localhost:9999/v1");
        assert_eq!(config.jobs.workers, 1);
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_unparseable_numbers_keep_defaults() {
        let (config, _dir) = load(&[("PORT", "eighty"), ("JOB_MAX_RETRIES", "-1")]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.jobs.max_retries, 3);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let (config, _dir) = load(&[("ENCRYPTION_KEY", "k"), ("SECRET_KEY", "s")]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("encryption_key"));
        assert!(!json.contains("secret_key"));
        assert!(!json.contains("admin_password"));
    }
}
