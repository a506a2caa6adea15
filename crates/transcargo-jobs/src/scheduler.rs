//! Periodic jobs and queue-backed notifications.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::pipeline::GENERATE_DAILY_ARTICLE;
use crate::queue::{JobQueue, Schedule};
use transcargo_core::Result;
use transcargo_privacy::{Notification, Notifier};

/// 10:00 Moscow time. Moscow has no DST, so this is a fixed UTC hour.
pub const DAILY_RUN_UTC_HOUR: u32 = 7;

/// The first daily run strictly after `after`.
pub fn next_daily_run(after: DateTime<Utc>) -> DateTime<Utc> {
    let run_time = NaiveTime::from_hms_opt(DAILY_RUN_UTC_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = after.date_naive().and_time(run_time).and_utc();
    if today > after {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Enqueue `generate_daily_article` once a day.
pub fn start_daily_scheduler(queue: Arc<JobQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_daily_run(now);
            info!("Next daily article generation at {}", next);
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match queue.enqueue(GENERATE_DAILY_ARTICLE, serde_json::json!({}), Schedule::Now) {
                Ok(id) => info!("Queued daily article job {}", id),
                Err(e) => error!("Failed to queue daily article job: {}", e),
            }
        }
    })
}

/// Delivers admin notifications as background jobs.
pub struct QueueNotifier {
    queue: Arc<JobQueue>,
}

impl QueueNotifier {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

impl Notifier for QueueNotifier {
    fn notify(&self, notification: Notification) -> Result<()> {
        let kwargs = serde_json::to_value(&notification)?;
        let id = self
            .queue
            .enqueue(notification.job_name(), kwargs, Schedule::Now)?;
        debug!("Queued {} as job {}", notification.job_name(), id);
        Ok(())
    }
}
