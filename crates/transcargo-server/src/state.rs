//! Shared application state.

use std::sync::Arc;

use crate::auth::TokenSigner;
use transcargo_core::AppConfig;
use transcargo_jobs::{
    start_daily_scheduler, ArticlePipeline, ArticleWriter, JobQueue, OpenAiWriter, QueueNotifier,
    WindowRateLimiter,
};
use transcargo_privacy::{AuditTrail, ConsentLedger, FieldCipher, GdprService, LeadService};
use transcargo_store::{Cache, MemoryCache, SqliteStore};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    /// Backs content listings, generation rate limiting and auto-publish
    /// settings. SQLite-backed unless `CACHE_ENABLED=false`.
    pub cache: Arc<dyn Cache>,
    pub cipher: Arc<FieldCipher>,
    pub audit: AuditTrail,
    pub consents: ConsentLedger,
    pub leads: LeadService,
    pub gdpr: GdprService,
    pub jobs: Arc<JobQueue>,
    pub pipeline: Arc<ArticlePipeline>,
    pub tokens: TokenSigner,
}

impl AppState {
    pub fn new(config: AppConfig, store: SqliteStore) -> Self {
        let writer = Arc::new(OpenAiWriter::new(config.openai.clone()));
        Self::with_writer(config, store, writer)
    }

    /// Same as [`AppState::new`] with a custom article writer.
    pub fn with_writer(config: AppConfig, store: SqliteStore, writer: Arc<dyn ArticleWriter>) -> Self {
        let store = Arc::new(store);
        let cache: Arc<dyn Cache> = if config.cache_enabled {
            store.clone()
        } else {
            Arc::new(MemoryCache::default())
        };
        let cipher = Arc::new(FieldCipher::new(config.encryption_key.as_deref()));
        let audit = AuditTrail::new(store.clone());
        let jobs = Arc::new(JobQueue::from_settings(&config.jobs));
        let notifier = Arc::new(QueueNotifier::new(jobs.clone()));

        let pipeline = Arc::new(ArticlePipeline::new(
            store.clone(),
            cache.clone(),
            writer,
            Arc::new(WindowRateLimiter::new(
                cache.clone(),
                config.jobs.generation_rate_per_minute,
            )),
            notifier.clone(),
            config.content_blacklist.clone(),
        ));

        Self {
            consents: ConsentLedger::new(store.clone(), cipher.clone(), config.policy_version.clone()),
            leads: LeadService::new(store.clone(), cipher.clone(), audit.clone(), notifier),
            gdpr: GdprService::new(store.clone(), cipher.clone(), audit.clone()),
            tokens: TokenSigner::new(&config.secret_key, config.access_token_expire_minutes),
            config,
            store,
            cache,
            cipher,
            audit,
            jobs,
            pipeline,
        }
    }

    /// Start the job workers and the daily article scheduler.
    pub fn start_background(&self) {
        self.jobs.start(self.pipeline.clone());
        start_daily_scheduler(self.jobs.clone());
    }
}
