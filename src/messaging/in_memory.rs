//! # In-Memory Job Queue
//!
//! Thread-safe in-memory [`JobQueue`] for tests, demos and single-process hosts.
//!
//! ## Features
//!
//! - **Priority**: higher priority jobs are claimed first, FIFO within a priority
//! - **Scheduling**: delayed jobs stay invisible until their run time
//! - **Retry**: failed attempts are re-queued with fixed or exponential backoff
//! - **Workers**: per-queue tokio tasks drive registered [`JobProcessor`]s
//! - **Retention**: completed and failed jobs are dropped once their retention
//!   period has passed
//!
//! Time is measured with `tokio::time::Instant`, so delays and backoff follow
//! tokio's paused clock in tests.

use crate::config::QueueConfig;
use crate::constants;
use crate::logging::log_queue_operation;
use crate::messaging::queue::{JobId, JobOptions, JobQueue, JobSnapshot, JobStatus, NewJob, QueueStats};
use crate::messaging::QueueError;
use crate::utils::panic_message;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Work performed for each job claimed from a queue
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: JobSnapshot) -> anyhow::Result<serde_json::Value>;
}

#[async_trait]
impl<F, Fut> JobProcessor for F
where
    F: Fn(JobSnapshot) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn process(&self, job: JobSnapshot) -> anyhow::Result<serde_json::Value> {
        (self)(job).await
    }
}

#[derive(Debug, Clone)]
struct JobRecord {
    snapshot: JobSnapshot,
    backoff: crate::messaging::queue::JobBackoff,
    run_at: Instant,
    sequence: u64,
    /// Set once the job is terminal
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<JobId>,
    notify: Arc<Notify>,
}

/// In-memory job queue
///
/// # Example
///
/// ```rust
/// use tasker_pipeline::messaging::{InMemoryJobQueue, JobOptions, JobQueue, NewJob};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let queue = Arc::new(InMemoryJobQueue::new());
/// queue.register_processor("estimation", |job: tasker_pipeline::messaging::JobSnapshot| async move {
///     Ok::<_, anyhow::Error>(serde_json::json!({"estimated": job.payload["stepId"]}))
/// });
/// queue.start();
///
/// let job_id = queue
///     .add_job("estimation", NewJob::new("estimation", serde_json::json!({"stepId": "a"})), JobOptions::default())
///     .await
///     .unwrap();
/// assert!(queue.get_job(&job_id).await.unwrap().is_some());
/// queue.shutdown().await;
/// # });
/// ```
pub struct InMemoryJobQueue {
    jobs: DashMap<JobId, JobRecord>,
    queues: Mutex<HashMap<String, QueueState>>,
    processors: RwLock<HashMap<String, Arc<dyn JobProcessor>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    sequence: AtomicU64,
    worker_concurrency: usize,
    idle_poll: Duration,
    retention: Duration,
    next_sweep: Mutex<Instant>,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryJobQueue")
            .field("jobs", &self.jobs.len())
            .field("worker_concurrency", &self.worker_concurrency)
            .field("retention", &self.retention)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl InMemoryJobQueue {
    /// Create a queue with default worker settings
    pub fn new() -> Self {
        Self::with_workers(
            constants::DEFAULT_WORKER_CONCURRENCY,
            Duration::from_millis(constants::DEFAULT_WORKER_IDLE_POLL_MS),
        )
    }

    /// Create a queue using worker settings from configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::with_workers(
            config.worker_concurrency,
            Duration::from_millis(config.worker_idle_poll_ms),
        )
        .with_retention(Duration::from_millis(config.completed_retention_ms))
    }

    /// Create a queue with explicit worker settings
    pub fn with_workers(worker_concurrency: usize, idle_poll: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: DashMap::new(),
            queues: Mutex::new(HashMap::new()),
            processors: RwLock::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            shutdown_tx,
            started: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            worker_concurrency: worker_concurrency.max(1),
            idle_poll,
            retention: Duration::from_millis(constants::DEFAULT_COMPLETED_RETENTION_MS),
            next_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Keep completed and failed jobs readable for `retention` after they finish
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drop every finished job whose retention period has passed
    ///
    /// Returns the number of jobs removed. Workers and `add_job` call this
    /// periodically, so hosts only need it to reclaim memory eagerly.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        // terminal jobs are never in a pending list
        self.jobs.retain(|_, record| {
            let keep = record.expires_at.map_or(true, |expires_at| expires_at > now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "Purged expired jobs from in-memory queue");
        }
        removed
    }

    /// Register the processor that handles jobs of `queue_name`
    ///
    /// Registering again replaces the processor for workers spawned afterwards.
    /// When the queue is already started, workers for the queue are spawned
    /// immediately.
    pub fn register_processor<P: JobProcessor>(self: &Arc<Self>, queue_name: &str, processor: P) {
        let processor: Arc<dyn JobProcessor> = Arc::new(processor);
        let replaced = self
            .processors
            .write()
            .insert(queue_name.to_string(), processor.clone())
            .is_some();

        if replaced {
            warn!(queue_name = queue_name, "Job processor already registered, replacing");
        }

        self.queues.lock().entry(queue_name.to_string()).or_default();

        if self.started.load(Ordering::SeqCst) && !replaced {
            self.spawn_workers(queue_name, processor);
        }
    }

    /// Spawn workers for every queue with a registered processor
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let processors: Vec<(String, Arc<dyn JobProcessor>)> = self
            .processors
            .read()
            .iter()
            .map(|(name, processor)| (name.clone(), processor.clone()))
            .collect();

        for (queue_name, processor) in processors {
            self.spawn_workers(&queue_name, processor);
        }

        info!(
            worker_concurrency = self.worker_concurrency,
            "In-memory job queue started"
        );
    }

    /// Stop all workers and wait for in-flight jobs to finish
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "In-memory queue worker ended abnormally");
            }
        }

        info!("In-memory job queue shut down");
    }

    /// Drop a job entirely, as a queue's garbage collection would
    pub fn remove_job(&self, job_id: &JobId) -> Option<JobSnapshot> {
        let removed = self.jobs.remove(job_id).map(|(_, record)| record);
        if let Some(record) = &removed {
            if let Some(queue) = self.queues.lock().get_mut(&record.snapshot.queue_name) {
                queue.pending.retain(|pending| pending != job_id);
            }
        }
        removed.map(|record| record.snapshot)
    }

    /// Number of jobs currently held, in any status
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Purge expired jobs at most once per sweep interval
    fn sweep_if_due(&self) {
        let now = Instant::now();
        {
            let mut next_sweep = self.next_sweep.lock();
            if now < *next_sweep {
                return;
            }
            let interval = self
                .retention
                .min(Duration::from_millis(constants::RETENTION_SWEEP_INTERVAL_MS));
            *next_sweep = now + interval;
        }
        self.purge_expired();
    }

    fn spawn_workers(self: &Arc<Self>, queue_name: &str, processor: Arc<dyn JobProcessor>) {
        let notify = self
            .queues
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .notify
            .clone();

        let mut workers = self.workers.lock();
        for worker_index in 0..self.worker_concurrency {
            let queue = Arc::clone(self);
            let queue_name = queue_name.to_string();
            let processor = processor.clone();
            let notify = notify.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();

            workers.push(tokio::spawn(async move {
                debug!(queue_name = %queue_name, worker_index, "Queue worker started");
                queue
                    .worker_loop(&queue_name, processor, notify, shutdown_rx)
                    .await;
                debug!(queue_name = %queue_name, worker_index, "Queue worker stopped");
            }));
        }
    }

    async fn worker_loop(
        &self,
        queue_name: &str,
        processor: Arc<dyn JobProcessor>,
        notify: Arc<Notify>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.claim_next(queue_name) {
                Some(job) => self.run_job(processor.as_ref(), job).await,
                None => {
                    self.sweep_if_due();
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = notify.notified() => {}
                        _ = tokio::time::sleep(self.idle_poll) => {}
                    }
                }
            }
        }
    }

    /// Claim the highest-priority eligible job and mark it active
    fn claim_next(&self, queue_name: &str) -> Option<JobSnapshot> {
        let now = Instant::now();
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(queue_name)?;

        let mut best: Option<(usize, i32, u64)> = None;
        for (index, job_id) in queue.pending.iter().enumerate() {
            let Some(record) = self.jobs.get(job_id) else {
                continue;
            };
            if record.run_at > now {
                continue;
            }
            let candidate = (index, record.snapshot.priority, record.sequence);
            best = match best {
                Some((_, priority, sequence))
                    if priority > candidate.1 || (priority == candidate.1 && sequence < candidate.2) =>
                {
                    best
                }
                _ => Some(candidate),
            };
        }

        let (index, _, _) = best?;
        let job_id = queue.pending.remove(index);
        drop(queues);

        let mut record = self.jobs.get_mut(&job_id)?;
        record.snapshot.status = JobStatus::Active;
        record.snapshot.attempts += 1;
        Some(record.snapshot.clone())
    }

    async fn run_job(&self, processor: &dyn JobProcessor, job: JobSnapshot) {
        let job_id = job.id.clone();
        let queue_name = job.queue_name.clone();
        let attempt = job.attempts;

        log_queue_operation("process", &queue_name, Some(job_id.as_str()), "active", None);

        let outcome = match AssertUnwindSafe(async { processor.process(job).await })
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };

        let requeue = {
            let Some(mut record) = self.jobs.get_mut(&job_id) else {
                debug!(job_id = %job_id, "Job removed while active, dropping outcome");
                return;
            };

            match outcome {
                Ok(value) => {
                    record.snapshot.status = JobStatus::Completed;
                    record.snapshot.result = Some(value);
                    record.snapshot.failed_reason = None;
                    record.snapshot.finished_at = Some(Utc::now());
                    record.expires_at = Some(Instant::now() + self.retention);
                    log_queue_operation("process", &queue_name, Some(job_id.as_str()), "completed", None);
                    false
                }
                Err(reason) if attempt < record.snapshot.max_attempts => {
                    let delay = record.backoff.delay_for_attempt(attempt);
                    record.snapshot.status = JobStatus::Waiting;
                    record.snapshot.failed_reason = Some(reason.clone());
                    record.run_at = Instant::now() + delay;
                    warn!(
                        job_id = %job_id,
                        queue_name = %queue_name,
                        attempt,
                        max_attempts = record.snapshot.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Job attempt failed, scheduling retry"
                    );
                    true
                }
                Err(reason) => {
                    record.snapshot.status = JobStatus::Failed;
                    record.snapshot.failed_reason = Some(reason.clone());
                    record.snapshot.finished_at = Some(Utc::now());
                    record.expires_at = Some(Instant::now() + self.retention);
                    log_queue_operation(
                        "process",
                        &queue_name,
                        Some(job_id.as_str()),
                        "failed",
                        Some(&reason),
                    );
                    false
                }
            }
        };

        if requeue {
            self.push_pending(&queue_name, job_id);
        }
    }

    fn push_pending(&self, queue_name: &str, job_id: JobId) {
        let mut queues = self.queues.lock();
        let queue = queues.entry(queue_name.to_string()).or_default();
        queue.pending.push(job_id);
        queue.notify.notify_one();
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn add_job(
        &self,
        queue_name: &str,
        job: NewJob,
        options: JobOptions,
    ) -> Result<JobId, QueueError> {
        if queue_name.trim().is_empty() {
            return Err(QueueError::invalid_queue_name(queue_name, "queue name cannot be empty"));
        }
        if queue_name.chars().any(char::is_whitespace) {
            return Err(QueueError::invalid_queue_name(
                queue_name,
                "queue name cannot contain whitespace",
            ));
        }
        if self.is_shutting_down() {
            return Err(QueueError::shutting_down(queue_name));
        }
        self.sweep_if_due();

        let job_id = JobId::new(Uuid::new_v4().to_string());
        let run_at = match options.delay {
            Some(delay) => Instant::now() + delay,
            None => Instant::now(),
        };

        let record = JobRecord {
            snapshot: JobSnapshot {
                id: job_id.clone(),
                queue_name: queue_name.to_string(),
                job_type: job.job_type,
                payload: job.payload,
                priority: options.priority,
                status: JobStatus::Waiting,
                result: None,
                failed_reason: None,
                attempts: 0,
                max_attempts: options.max_attempts.max(1),
                created_at: Utc::now(),
                finished_at: None,
            },
            backoff: options.backoff,
            run_at,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            expires_at: None,
        };

        self.jobs.insert(job_id.clone(), record);
        self.push_pending(queue_name, job_id.clone());

        log_queue_operation("add_job", queue_name, Some(job_id.as_str()), "waiting", None);
        Ok(job_id)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, QueueError> {
        Ok(self.jobs.get(job_id).map(|record| record.snapshot.clone()))
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, QueueError> {
        if !self.queues.lock().contains_key(queue_name) {
            return Err(QueueError::queue_not_found(queue_name));
        }

        let mut stats = QueueStats::new(queue_name);
        for record in self.jobs.iter() {
            if record.snapshot.queue_name != queue_name {
                continue;
            }
            match record.snapshot.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
