//! TransCargo Jobs: background work queue and the article auto-publishing
//! pipeline that runs on it.

pub mod pipeline;
pub mod queue;
pub mod rate_limit;
pub mod scheduler;
pub mod seo;
pub mod snapshot;
pub mod writer;

pub use pipeline::{ArticlePipeline, ArticleType, GeneratedArticle, OptimizedArticle};
pub use queue::{JobHandler, JobQueue, JobRecord, JobStatus, RetryPolicy, Schedule, TimeLimits};
pub use rate_limit::{RateLimiter, WindowRateLimiter};
pub use scheduler::{start_daily_scheduler, QueueNotifier};
pub use snapshot::AutoPublishSettings;
pub use writer::{ArticleWriter, Draft, OpenAiWriter};
