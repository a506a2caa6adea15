//! Background job queue: named jobs with JSON kwargs, run by a fixed pool of
//! tokio workers with exponential-backoff retries and soft/hard time limits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use transcargo_core::{Error, JobSettings, Result};

/// Terminal jobs kept in memory for status queries.
const KEEP_FINISHED: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub kwargs: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the current one.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// When a job becomes eligible to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Schedule {
    #[default]
    Now,
    Delay(Duration),
    At(DateTime<Utc>),
}

impl Schedule {
    fn eta(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Now => None,
            Schedule::Delay(d) => chrono::Duration::from_std(d).ok().map(|d| now + d),
            Schedule::At(at) => Some(at),
        }
    }
}

/// Executes jobs by name. Errors for which [`Error::is_retryable`] holds are
/// retried by the queue; any other error fails the job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, name: &str, kwargs: &serde_json::Value) -> Result<serde_json::Value>;
}

// ---------------------------------------------------------------
// Policies
// ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 10_000,
            backoff_max_ms: 600_000,
        }
    }
}

impl RetryPolicy {
    /// `base * 2^retry`, capped at `backoff_max_ms`. `retry` counts from 0.
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(retry));
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeLimits {
    /// Exceeding this only logs a warning.
    pub soft: Duration,
    /// Exceeding this aborts the attempt with [`Error::Timeout`].
    pub hard: Duration,
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            soft: Duration::from_secs(180),
            hard: Duration::from_secs(200),
        }
    }
}

// ---------------------------------------------------------------
// Queue
// ---------------------------------------------------------------

struct Dispatch {
    job_id: String,
    delay: Duration,
}

pub struct JobQueue {
    jobs: RwLock<HashMap<String, JobRecord>>,
    tx: mpsc::UnboundedSender<Dispatch>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
    policy: RetryPolicy,
    limits: TimeLimits,
    workers: usize,
}

impl JobQueue {
    pub fn new(workers: usize, policy: RetryPolicy, limits: TimeLimits) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            jobs: RwLock::new(HashMap::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            policy,
            limits,
            workers: workers.max(1),
        }
    }

    pub fn from_settings(settings: &JobSettings) -> Self {
        Self::new(
            settings.workers,
            RetryPolicy {
                max_retries: settings.max_retries,
                backoff_base_ms: settings.retry_delay_secs.saturating_mul(1000),
                backoff_max_ms: settings.retry_delay_max_secs.saturating_mul(1000),
            },
            TimeLimits {
                soft: Duration::from_secs(settings.soft_time_limit_secs),
                hard: Duration::from_secs(settings.hard_time_limit_secs),
            },
        )
    }

    /// Record a job and hand it to the dispatcher. Returns the job id without
    /// waiting for execution. Jobs enqueued before [`JobQueue::start`] run once
    /// the workers are up.
    pub fn enqueue(&self, name: &str, kwargs: serde_json::Value, schedule: Schedule) -> Result<String> {
        if name.trim().is_empty() {
            return Err(Error::Validation("job name is required".into()));
        }
        let now = Utc::now();
        let eta = schedule.eta(now);
        let delay = eta
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO);

        let id = uuid::Uuid::new_v4().to_string();
        self.jobs.write().insert(
            id.clone(),
            JobRecord {
                id: id.clone(),
                name: name.to_string(),
                kwargs,
                status: JobStatus::Queued,
                attempts: 0,
                eta,
                error: None,
                result: None,
                queued_at: now,
                started_at: None,
                completed_at: None,
            },
        );

        if self
            .tx
            .send(Dispatch {
                job_id: id.clone(),
                delay,
            })
            .is_err()
        {
            self.jobs.write().remove(&id);
            return Err(Error::Job("job queue is closed".into()));
        }
        debug!("Queued job {} ({}) delay={:?}", id, name, delay);
        Ok(id)
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }

    /// Poll until the job reaches a terminal state or `timeout` elapses.
    pub async fn wait(&self, job_id: &str, timeout: Duration) -> Option<JobRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.get(job_id)?;
            if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Some(job);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Start the dispatcher and the worker pool. Only the first call has effect.
    pub fn start(self: &Arc<Self>, handler: Arc<dyn JobHandler>) {
        let mut rx = match self.rx.lock().take() {
            Some(rx) => rx,
            None => {
                error!("Job workers already started");
                return;
            }
        };

        let (work_tx, work_rx) = mpsc::unbounded_channel::<String>();
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        tokio::spawn(async move {
            while let Some(dispatch) = rx.recv().await {
                if dispatch.delay.is_zero() {
                    let _ = work_tx.send(dispatch.job_id);
                    continue;
                }
                let work_tx = work_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(dispatch.delay).await;
                    let _ = work_tx.send(dispatch.job_id);
                });
            }
        });

        for worker in 0..self.workers {
            let queue = self.clone();
            let handler = handler.clone();
            let work_rx = work_rx.clone();
            tokio::spawn(async move {
                debug!("Job worker {} started", worker);
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(job_id) = next else { break };
                    queue.process(handler.as_ref(), &job_id).await;
                }
            });
        }
        info!("Background job queue started with {} workers", self.workers);
    }

    async fn process(&self, handler: &dyn JobHandler, job_id: &str) {
        let (name, kwargs, attempt) = {
            let mut jobs = self.jobs.write();
            let Some(job) = jobs.get_mut(job_id) else {
                return;
            };
            // At-least-once delivery: a duplicate dispatch of a finished job is dropped.
            if job.status.is_terminal() || job.status == JobStatus::Running {
                return;
            }
            job.status = JobStatus::Running;
            job.attempts += 1;
            job.started_at = Some(Utc::now());
            (job.name.clone(), job.kwargs.clone(), job.attempts)
        };

        info!("Running job {} ({}), attempt {}", job_id, name, attempt);
        let outcome = run_with_limits(handler.run(&name, &kwargs), self.limits, job_id).await;

        match outcome {
            Ok(value) => {
                self.finish(job_id, JobStatus::Completed, None, Some(value));
                info!("Job {} ({}) completed", job_id, name);
            }
            Err(e) if e.is_retryable() && attempt <= self.policy.max_retries => {
                let delay = self.policy.backoff(attempt - 1);
                {
                    let mut jobs = self.jobs.write();
                    if let Some(job) = jobs.get_mut(job_id) {
                        job.status = JobStatus::Retrying;
                        job.error = Some(e.to_string());
                    }
                }
                warn!(
                    "Job {} ({}) attempt {} failed, retrying in {:?}: {}",
                    job_id, name, attempt, delay, e
                );
                let requeued = self.tx.send(Dispatch {
                    job_id: job_id.to_string(),
                    delay,
                });
                if requeued.is_err() {
                    self.finish(job_id, JobStatus::Failed, Some(e.to_string()), None);
                    error!("Job {} ({}) could not be retried: queue closed", job_id, name);
                }
            }
            Err(e) => {
                self.finish(job_id, JobStatus::Failed, Some(e.to_string()), None);
                error!(
                    "Job {} ({}) failed after {} attempt(s): {}",
                    job_id, name, attempt, e
                );
            }
        }

        self.cleanup_finished();
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        result: Option<serde_json::Value>,
    ) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(job_id) {
            job.status = status;
            job.error = error;
            job.result = result;
            job.completed_at = Some(Utc::now());
        }
    }

    fn cleanup_finished(&self) {
        let mut jobs = self.jobs.write();
        let mut finished: Vec<(String, DateTime<Utc>)> = jobs
            .values()
            .filter(|j| j.status.is_terminal())
            .filter_map(|j| j.completed_at.map(|t| (j.id.clone(), t)))
            .collect();
        if finished.len() <= KEEP_FINISHED {
            return;
        }
        finished.sort_by_key(|(_, t)| *t);
        let excess = finished.len() - KEEP_FINISHED;
        for (id, _) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }
}

/// Await `work`, warning once past the soft limit and aborting at the hard one.
async fn run_with_limits<F>(work: F, limits: TimeLimits, job_id: &str) -> Result<serde_json::Value>
where
    F: Future<Output = Result<serde_json::Value>>,
{
    tokio::pin!(work);
    let mut remaining = limits.hard;
    if limits.soft < limits.hard {
        tokio::select! {
            result = &mut work => return result,
            _ = tokio::time::sleep(limits.soft) => {
                warn!("Job {} exceeded soft time limit of {:?}", job_id, limits.soft);
            }
        }
        remaining = limits.hard - limits.soft;
    }
    match tokio::time::timeout(remaining, &mut work).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "job exceeded hard time limit of {:?}",
            limits.hard
        ))),
    }
}
