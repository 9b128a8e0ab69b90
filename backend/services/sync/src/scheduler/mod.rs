//! Serializes sync runs.
//!
//! Two paths lead to a run: periodic cron jobs and a bounded manual trigger
//! queue drained by a single worker. Both go through one run gate, so at most
//! one run is in flight. Periodic ticks that find the gate taken are dropped;
//! queued manual triggers wait for it.

pub mod expression;
pub mod status;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use tidemark_common::error::TidemarkResult;
use tidemark_config::{env_bool, env_or};

use crate::multi::SyncMode;
pub use expression::parse_schedule;
pub use status::{JobId, RunInfo, StatusSnapshot};
use status::StatusBoard;

pub type JobError = Box<dyn std::error::Error + Send + Sync>;
pub type JobResult = Result<usize, JobError>;

/// A unit of scheduled work. It receives the scheduler's cancellation token
/// and reports how many items it processed.
pub type Job = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// What the scheduler drives for the built-in full and incremental runs.
#[async_trait]
pub trait SyncRunner: Send + Sync + 'static {
    async fn run(&self, mode: SyncMode, cancel: CancellationToken) -> JobResult;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub full_cron: String,
    pub incremental_cron: String,
    pub queue_capacity: usize,
    pub reconcile: bool,
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            full_cron: "0 0 3 * * *".to_string(),
            incremental_cron: "0 */15 * * * *".to_string(),
            queue_capacity: 8,
            reconcile: false,
            run_on_startup: true,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            full_cron: env_or("SYNC_FULL_CRON", defaults.full_cron),
            incremental_cron: env_or("SYNC_INCREMENTAL_CRON", defaults.incremental_cron),
            queue_capacity: env_or("SYNC_QUEUE_CAPACITY", defaults.queue_capacity).max(1),
            reconcile: env_bool("SYNC_RECONCILE", defaults.reconcile),
            run_on_startup: env_bool("SYNC_ON_STARTUP", defaults.run_on_startup),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("sync queue is full")]
    QueueFull,

    #[error("scheduler is shutting down")]
    ShuttingDown,
}

struct PeriodicJob {
    id: JobId,
    label: String,
    run_type: String,
    schedule: Schedule,
    job: Job,
}

#[derive(Default)]
struct PeriodicState {
    started: bool,
    pending: Vec<PeriodicJob>,
}

pub struct SyncScheduler {
    runner: Arc<dyn SyncRunner>,
    config: SchedulerConfig,
    gate: Mutex<()>,
    status: RwLock<StatusBoard>,
    queue_tx: mpsc::Sender<SyncMode>,
    queue_rx: Mutex<Option<mpsc::Receiver<SyncMode>>>,
    periodic: Mutex<PeriodicState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_job_id: AtomicU64,
    cancel: CancellationToken,
}

impl SyncScheduler {
    pub fn new(runner: Arc<dyn SyncRunner>, config: SchedulerConfig) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        Arc::new(Self {
            runner,
            config,
            gate: Mutex::new(()),
            status: RwLock::new(StatusBoard::default()),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            periodic: Mutex::new(PeriodicState::default()),
            tasks: Mutex::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        })
    }

    /// Register the built-in cron jobs, start the manual queue worker and
    /// every periodic job, and queue a full sync if configured to.
    pub async fn start(self: &Arc<Self>) -> TidemarkResult<()> {
        let Some(queue_rx) = self.queue_rx.lock().await.take() else {
            tracing::warn!("scheduler already started");
            return Ok(());
        };

        let full_cron = self.config.full_cron.clone();
        let incremental_cron = self.config.incremental_cron.clone();
        for (expr, mode) in [
            (full_cron, SyncMode::Full),
            (incremental_cron, SyncMode::Incremental),
        ] {
            self.register(&expr, mode.label(), mode.label(), self.runner_job(mode))
                .await?;
        }

        let worker = self.spawn_worker(queue_rx);
        self.tasks.lock().await.push(worker);

        let pending = {
            let mut periodic = self.periodic.lock().await;
            periodic.started = true;
            std::mem::take(&mut periodic.pending)
        };
        for job in pending {
            let handle = self.spawn_periodic(job);
            self.tasks.lock().await.push(handle);
        }

        tracing::info!(
            full_cron = %self.config.full_cron,
            incremental_cron = %self.config.incremental_cron,
            queue_capacity = self.config.queue_capacity,
            "sync scheduler started"
        );

        if self.config.run_on_startup {
            if let Err(e) = self.trigger_full_sync() {
                tracing::warn!(error = %e, "could not queue startup sync");
            }
        }
        Ok(())
    }

    /// Register an additional periodic job. `expr` accepts 5- or 6-field cron.
    pub async fn schedule(self: &Arc<Self>, expr: &str, label: &str, job: Job) -> TidemarkResult<JobId> {
        self.register(expr, label, label, job).await
    }

    pub fn trigger_full_sync(&self) -> Result<(), TriggerError> {
        self.enqueue(SyncMode::Full)
    }

    pub fn trigger_incremental_sync(&self) -> Result<(), TriggerError> {
        self.enqueue(SyncMode::Incremental)
    }

    pub async fn status(&self) -> StatusSnapshot {
        let queue_len = self.queue_len();
        self.status.read().await.snapshot(queue_len)
    }

    /// Cancel in-flight fetches and wait for every scheduler task to exit.
    pub async fn shutdown(&self) {
        tracing::info!("sync scheduler shutting down");
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        tracing::info!("sync scheduler stopped");
    }

    fn queue_len(&self) -> usize {
        self.queue_tx.max_capacity() - self.queue_tx.capacity()
    }

    fn enqueue(&self, mode: SyncMode) -> Result<(), TriggerError> {
        if self.cancel.is_cancelled() {
            return Err(TriggerError::ShuttingDown);
        }
        match self.queue_tx.try_send(mode) {
            Ok(()) => {
                tracing::info!(%mode, "sync queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%mode, "sync queue full, dropping trigger");
                Err(TriggerError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TriggerError::ShuttingDown),
        }
    }

    fn runner_job(&self, mode: SyncMode) -> Job {
        let runner = self.runner.clone();
        Arc::new(move |cancel| {
            let runner = runner.clone();
            Box::pin(async move { runner.run(mode, cancel).await })
        })
    }

    async fn register(
        self: &Arc<Self>,
        expr: &str,
        label: &str,
        run_type: &str,
        job: Job,
    ) -> TidemarkResult<JobId> {
        let schedule = parse_schedule(expr)?;
        let id = JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        self.status.write().await.register_job(id, label, expr);

        let periodic = PeriodicJob {
            id,
            label: label.to_string(),
            run_type: run_type.to_string(),
            schedule,
            job,
        };

        let mut state = self.periodic.lock().await;
        if state.started {
            drop(state);
            let handle = self.spawn_periodic(periodic);
            self.tasks.lock().await.push(handle);
        } else {
            state.pending.push(periodic);
        }

        tracing::info!(job_id = id.0, label, schedule = expr, "registered periodic job");
        Ok(id)
    }

    fn spawn_worker(self: &Arc<Self>, mut queue_rx: mpsc::Receiver<SyncMode>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let mode = tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    next = queue_rx.recv() => match next {
                        Some(mode) => mode,
                        None => break,
                    },
                };

                let _guard = tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    guard = this.gate.lock() => guard,
                };
                this.run_guarded(mode.label(), this.runner_job(mode)).await;
            }
            queue_rx.close();
            tracing::debug!("manual sync worker stopped");
        })
    }

    fn spawn_periodic(self: &Arc<Self>, job: PeriodicJob) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let Some(next) = job.schedule.upcoming(Utc).next() else {
                    tracing::warn!(label = %job.label, "cron schedule has no upcoming runs");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                this.tick(&job).await;
            }
            tracing::debug!(label = %job.label, "periodic job stopped");
        })
    }

    async fn tick(&self, job: &PeriodicJob) {
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::info!(label = %job.label, "previous run still in progress, skipping tick");
            return;
        };
        let info = self.run_guarded(&job.run_type, job.job.clone()).await;
        self.status.write().await.record_job_run(job.id, info);
    }

    /// Run `job` in its own task while the caller holds the run gate. Errors
    /// and panics are folded into the returned `RunInfo`.
    async fn run_guarded(&self, run_type: &str, job: Job) -> RunInfo {
        let started_at = Utc::now();
        self.status.write().await.begin(run_type);
        tracing::info!(run_type, "sync run started");

        let outcome = tokio::spawn(job(self.cancel.clone())).await;
        let info = match outcome {
            Ok(Ok(items)) => {
                tracing::info!(run_type, items, "sync run succeeded");
                RunInfo::succeeded(run_type, started_at, items)
            }
            Ok(Err(e)) => {
                tracing::error!(run_type, error = %e, "sync run failed");
                RunInfo::failed(run_type, started_at, e.to_string())
            }
            Err(e) => {
                let message = join_failure(e);
                tracing::error!(run_type, error = %message, "sync run aborted");
                RunInfo::failed(run_type, started_at, message)
            }
        };

        self.status.write().await.finish(info.clone());
        info
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return "job task was cancelled".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("job panicked: {message}")
}
