//! Recurring backup scheduling and run tracking.
//!
//! Each enabled schedule is driven by its own self-rearming timer task: the
//! task sleeps until the trigger's next fire, records a run, spawns the
//! execution, and loops to compute the following occurrence. Timers live only
//! in process memory; `start` re-arms every enabled schedule from persisted
//! state, so a restart never depends on a timer surviving it.
//!
//! Executions run under a semaphore sized to `max_concurrent_jobs`. The
//! `overflow` policy decides whether a fire past the cap waits for a permit
//! or is recorded as skipped.

use std::collections::HashMap;
use std::sync::Arc;

use arca_core::{
    ArtifactMeta, BackupJobConfig, CoreError, CoreResult, OverflowPolicy, RunId, ScheduleConfig,
    ScheduleId, ScheduleUpdate, ScheduledBackupRun, SchedulerConfig, Trigger,
};
use arca_store::ScheduleStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::gateway::{BackupGateway, JobStatus};
use crate::notify::Notifier;

/// Input for `create_schedule`; the scheduler assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    /// Human-readable name.
    pub name: String,
    /// When the schedule fires.
    pub trigger: Trigger,
    /// Backup job parameters.
    pub backup: BackupJobConfig,
    /// Whether the schedule is armed immediately.
    pub enabled: bool,
    /// Artifact retention window in days.
    pub retention_days: u32,
    /// Recipients notified on success.
    pub notify_on_success: Vec<String>,
    /// Recipients notified on failure.
    pub notify_on_failure: Vec<String>,
    /// Free-form operator tags.
    pub tags: Vec<String>,
}

impl NewSchedule {
    /// New enabled schedule with a 7-day retention window and no recipients.
    #[must_use]
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            trigger,
            backup: BackupJobConfig::default(),
            enabled: true,
            retention_days: 7,
            notify_on_success: vec![],
            notify_on_failure: vec![],
            tags: vec![],
        }
    }
}

/// Owns the set of recurring schedules, fires them, and tracks their runs.
///
/// Cheap to clone; all state is behind `Arc`s. Construct once at process
/// start and call [`Scheduler::start`] to re-arm persisted schedules.
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn ScheduleStore>,
    gateway: Arc<dyn BackupGateway>,
    notifier: Arc<dyn Notifier>,
    schedules: Arc<RwLock<HashMap<ScheduleId, ScheduleConfig>>>,
    runs: Arc<RwLock<Vec<ScheduledBackupRun>>>,
    timers: Arc<Mutex<HashMap<ScheduleId, JoinHandle<()>>>>,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    /// Creates a scheduler; no I/O happens until [`Scheduler::start`].
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn ScheduleStore>,
        gateway: Arc<dyn BackupGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            store,
            gateway,
            notifier,
            schedules: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(Vec::new())),
            timers: Arc::new(Mutex::new(HashMap::new())),
            permits,
        }
    }

    /// Loads persisted state and re-arms every enabled schedule.
    ///
    /// Runs left non-terminal by a previous process are reconciled to
    /// `Failed`; their gateway jobs are unreachable after a restart.
    ///
    /// # Errors
    ///
    /// Returns store errors; the scheduler is unusable without its state.
    pub async fn start(&self) -> CoreResult<()> {
        let schedules = self.store.load_schedules().await?;
        let mut runs = self.store.load_runs().await?;

        let mut interrupted = 0usize;
        let now = Utc::now();
        for run in runs.iter_mut().filter(|r| !r.status.is_terminal()) {
            // Ignore the impossible transition error: the filter guarantees
            // the run is not terminal.
            let _ = run.fail(now, "interrupted by process restart");
            interrupted += 1;
        }
        if interrupted > 0 {
            tracing::warn!(count = interrupted, "reconciled interrupted runs to failed");
            self.store.save_runs(&runs).await?;
        }

        *self.runs.write() = runs;
        {
            let mut map = self.schedules.write();
            for schedule in schedules {
                map.insert(schedule.id, schedule);
            }
        }

        let enabled: Vec<ScheduleId> = self
            .schedules
            .read()
            .values()
            .filter(|s| s.enabled)
            .map(|s| s.id)
            .collect();
        for id in &enabled {
            self.arm(*id);
        }
        tracing::info!(
            schedules = self.schedules.read().len(),
            armed = enabled.len(),
            "scheduler started"
        );
        Ok(())
    }

    /// Cancels every pending timer. In-flight executions run to completion
    /// or timeout; there is no mid-execution cancellation.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        for (id, handle) in timers.drain() {
            handle.abort();
            tracing::debug!(schedule_id = %id, "timer cancelled");
        }
        tracing::info!("scheduler stopped");
    }

    /// Validates and persists a new schedule, arming it when enabled.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad name, retention window, or
    /// trigger; nothing is persisted in that case.
    pub async fn create_schedule(&self, new: NewSchedule) -> CoreResult<ScheduleId> {
        let now = Utc::now();
        let schedule = ScheduleConfig {
            id: ScheduleId::new(),
            name: new.name,
            trigger: new.trigger,
            backup: new.backup,
            enabled: new.enabled,
            retention_days: new.retention_days,
            notify_on_success: new.notify_on_success,
            notify_on_failure: new.notify_on_failure,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };
        schedule.validate()?;

        let id = schedule.id;
        self.schedules.write().insert(id, schedule.clone());
        self.persist_schedules().await?;
        if schedule.enabled {
            self.arm(id);
        }
        tracing::info!(schedule_id = %id, name = %schedule.name, trigger = %schedule.trigger, "schedule created");
        Ok(id)
    }

    /// Applies a partial update, re-validating and re-arming as needed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and validation errors for a
    /// merge that produces an invalid schedule; the stored schedule is
    /// untouched on error.
    pub async fn update_schedule(&self, id: ScheduleId, update: ScheduleUpdate) -> CoreResult<()> {
        let rearm = update.affects_arming();
        let updated = {
            let mut map = self.schedules.write();
            let current = map
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found("schedule", id.to_string()))?;
            let mut candidate = current.clone();
            update.apply_to(&mut candidate);
            candidate.validate()?;
            *current = candidate.clone();
            candidate
        };
        self.persist_schedules().await?;

        if rearm {
            if updated.enabled {
                self.arm(id);
            } else {
                self.disarm(id);
            }
        }
        tracing::info!(schedule_id = %id, enabled = updated.enabled, "schedule updated");
        Ok(())
    }

    /// Removes a schedule and cancels its pending fire. Historical runs are
    /// left in place for audit.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_schedule(&self, id: ScheduleId) -> CoreResult<()> {
        let removed = self.schedules.write().remove(&id);
        if removed.is_none() {
            return Err(CoreError::not_found("schedule", id.to_string()));
        }
        self.disarm(id);
        self.persist_schedules().await?;
        tracing::info!(schedule_id = %id, "schedule deleted");
        Ok(())
    }

    /// Fetches one schedule.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get_schedule(&self, id: ScheduleId) -> CoreResult<ScheduleConfig> {
        self.schedule_snapshot(id)
            .ok_or_else(|| CoreError::not_found("schedule", id.to_string()))
    }

    /// All schedules, oldest first.
    #[must_use]
    pub fn list_schedules(&self) -> Vec<ScheduleConfig> {
        let mut schedules: Vec<ScheduleConfig> = self.schedules.read().values().cloned().collect();
        schedules.sort_by_key(|s| s.created_at);
        schedules
    }

    /// Most recent runs first, at most `limit`.
    #[must_use]
    pub fn run_history(&self, limit: usize) -> Vec<ScheduledBackupRun> {
        let runs = self.runs.read();
        let mut history: Vec<ScheduledBackupRun> = runs.iter().cloned().collect();
        history.sort_by_key(|r| std::cmp::Reverse(r.scheduled_at));
        history.truncate(limit);
        history
    }

    /// True when the schedule currently has an armed timer.
    #[must_use]
    pub fn is_armed(&self, id: ScheduleId) -> bool {
        self.timers.lock().contains_key(&id)
    }

    /// Creates a run and starts executing it in the background.
    ///
    /// The returned run id can be watched through [`Scheduler::run_history`];
    /// execution errors are captured into the run, never raised here.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` for a
    /// disabled schedule without `force`; no run is created in either case.
    pub async fn execute_schedule(&self, id: ScheduleId, force: bool) -> CoreResult<RunId> {
        let schedule = self.get_schedule(id)?;
        if !schedule.enabled && !force {
            return Err(CoreError::invalid_state(format!(
                "schedule {id} is disabled; pass force to run it anyway"
            )));
        }

        let run = ScheduledBackupRun::pending(id, Utc::now());
        let run_id = run.id;
        self.record_run(run).await?;
        tokio::spawn(self.clone().run_execution(schedule, run_id));
        Ok(run_id)
    }

    // ------------------------------------------------------------------
    // Arming
    // ------------------------------------------------------------------

    fn arm(&self, id: ScheduleId) {
        self.disarm(id);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.trigger_loop(id).await });
        self.timers.lock().insert(id, handle);
    }

    fn disarm(&self, id: ScheduleId) {
        if let Some(handle) = self.timers.lock().remove(&id) {
            handle.abort();
        }
    }

    fn schedule_snapshot(&self, id: ScheduleId) -> Option<ScheduleConfig> {
        self.schedules.read().get(&id).cloned()
    }

    /// Self-perpetuating fire chain for one schedule. Exits when the
    /// schedule disappears, is disabled, or its trigger stops resolving.
    async fn trigger_loop(self, id: ScheduleId) {
        loop {
            let Some(schedule) = self.schedule_snapshot(id) else {
                break;
            };
            if !schedule.enabled {
                break;
            }

            let due = match schedule.trigger.next_fire(Utc::now()) {
                Ok(due) => due,
                Err(err) => {
                    tracing::error!(schedule_id = %id, error = %err, "trigger no longer resolves; disarming");
                    break;
                }
            };
            let wait = (due - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // The schedule may have been deleted or disabled while we slept.
            let Some(current) = self.schedule_snapshot(id) else {
                break;
            };
            if !current.enabled {
                break;
            }

            let run = ScheduledBackupRun::pending(id, due);
            let run_id = run.id;
            if let Err(err) = self.record_run(run).await {
                tracing::error!(schedule_id = %id, error = %err, "could not persist fired run; will retry at next occurrence");
                continue;
            }
            tracing::info!(schedule_id = %id, run_id = %run_id, due = %due, "schedule fired");
            tokio::spawn(self.clone().run_execution(current, run_id));
        }
        // A concurrent re-arm may already have replaced this entry; only
        // remove the map slot when it still holds this task's handle.
        let mut timers = self.timers.lock();
        if let Some(handle) = timers.get(&id) {
            if tokio::task::try_id() == Some(handle.id()) {
                timers.remove(&id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Drives one run to a terminal state. Never returns an error: every
    /// failure is captured into the run so the trigger loop cannot crash.
    async fn run_execution(self, schedule: ScheduleConfig, run_id: RunId) {
        let _permit = match self.config.overflow {
            OverflowPolicy::Queue => match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    self.update_run(run_id, |run, now| run.fail(now, "scheduler shut down"))
                        .await;
                    return;
                }
            },
            OverflowPolicy::Skip => match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(
                        schedule_id = %schedule.id,
                        run_id = %run_id,
                        cap = self.config.max_concurrent_jobs,
                        "concurrency cap reached; skipping run"
                    );
                    self.update_run(run_id, |run, now| run.skip(now, "concurrency cap reached"))
                        .await;
                    return;
                }
            },
        };

        self.update_run(run_id, |run, now| run.start(now)).await;

        match self.perform_backup(&schedule).await {
            Ok(artifact) => {
                let artifact_for_run = artifact.clone();
                self.update_run(run_id, move |run, now| run.complete(now, artifact_for_run))
                    .await;
                tracing::info!(
                    schedule_id = %schedule.id,
                    run_id = %run_id,
                    backup_id = %artifact.id,
                    size_bytes = artifact.size_bytes,
                    "backup completed"
                );
                self.dispatch(
                    &schedule.notify_on_success,
                    &format!("Backup completed: {}", schedule.name),
                    &format!(
                        "Backup {} completed ({} bytes).",
                        artifact.name, artifact.size_bytes
                    ),
                )
                .await;
                if let Err(err) = self.cleanup_expired_artifacts(&schedule).await {
                    tracing::warn!(schedule_id = %schedule.id, error = %err, "retention cleanup failed");
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(
                    schedule_id = %schedule.id,
                    run_id = %run_id,
                    error = %message,
                    "backup failed"
                );
                let captured = message.clone();
                self.update_run(run_id, move |run, now| run.fail(now, captured))
                    .await;
                self.dispatch(
                    &schedule.notify_on_failure,
                    &format!("Backup failed: {}", schedule.name),
                    &format!("Schedule {} failed: {message}", schedule.name),
                )
                .await;
            }
        }
    }

    /// Starts the gateway job and polls it to completion under the
    /// configured deadline. Timing out is a failure like any other.
    async fn perform_backup(&self, schedule: &ScheduleConfig) -> CoreResult<ArtifactMeta> {
        let name = format!(
            "{}-{}",
            schedule.name_slug(),
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        let job_id = self
            .gateway
            .create_full_backup(&name, &schedule.backup, &[schedule.artifact_tag()])
            .await?;

        let deadline = tokio::time::Instant::now() + self.config.job_timeout();
        loop {
            let job = self.gateway.get_job(&job_id).await?;
            match job.status {
                JobStatus::Completed => {
                    return job.artifact.ok_or_else(|| {
                        CoreError::gateway(format!(
                            "job {job_id} completed without artifact metadata"
                        ))
                    });
                }
                JobStatus::Failed => {
                    return Err(CoreError::gateway(
                        job.error.unwrap_or_else(|| format!("job {job_id} failed")),
                    ));
                }
                JobStatus::Pending | JobStatus::Running => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(CoreError::JobTimeout {
                            job_id,
                            timeout_secs: self.config.job_timeout_secs,
                        });
                    }
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }
    }

    /// Deletes artifacts tagged to this schedule that are older than its
    /// retention window. Individual delete failures are logged, never fatal.
    async fn cleanup_expired_artifacts(&self, schedule: &ScheduleConfig) -> CoreResult<()> {
        let cutoff = Utc::now() - Duration::days(i64::from(schedule.retention_days));
        let tag = schedule.artifact_tag();
        let artifacts = self.gateway.list_backups().await?;

        for artifact in artifacts
            .iter()
            .filter(|a| a.has_tag(&tag) && a.created_at < cutoff)
        {
            match self.gateway.delete_backup(&artifact.id).await {
                Ok(()) => {
                    tracing::info!(
                        schedule_id = %schedule.id,
                        backup_id = %artifact.id,
                        created_at = %artifact.created_at,
                        "expired artifact deleted"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        schedule_id = %schedule.id,
                        backup_id = %artifact.id,
                        error = %err,
                        "could not delete expired artifact"
                    );
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Run bookkeeping
    // ------------------------------------------------------------------

    /// Appends a run, prunes history past the retention window, persists.
    async fn record_run(&self, run: ScheduledBackupRun) -> CoreResult<()> {
        let snapshot = {
            let mut runs = self.runs.write();
            let cutoff = Utc::now() - Duration::days(i64::from(self.config.run_retention_days));
            runs.retain(|r| r.scheduled_at >= cutoff || !r.status.is_terminal());
            runs.push(run);
            runs.clone()
        };
        self.store.save_runs(&snapshot).await
    }

    /// Applies a transition to a run and persists the collection. Both an
    /// invalid transition and a persistence failure are logged; background
    /// execution has no caller to report to.
    async fn update_run<F>(&self, run_id: RunId, apply: F)
    where
        F: FnOnce(&mut ScheduledBackupRun, DateTime<Utc>) -> CoreResult<()>,
    {
        let snapshot = {
            let mut runs = self.runs.write();
            match runs.iter_mut().find(|r| r.id == run_id) {
                Some(run) => {
                    if let Err(err) = apply(run, Utc::now()) {
                        tracing::warn!(run_id = %run_id, error = %err, "rejected run transition");
                    }
                }
                None => {
                    tracing::warn!(run_id = %run_id, "run vanished from history before transition");
                }
            }
            runs.clone()
        };
        if let Err(err) = self.store.save_runs(&snapshot).await {
            tracing::error!(run_id = %run_id, error = %err, "could not persist run state");
        }
    }

    async fn persist_schedules(&self) -> CoreResult<()> {
        let snapshot = self.list_schedules();
        self.store.save_schedules(&snapshot).await
    }

    async fn dispatch(&self, recipients: &[String], subject: &str, body: &str) {
        if let Err(err) = self.notifier.notify(recipients, subject, body).await {
            tracing::warn!(subject, error = %err, "notification dispatch failed");
        }
    }
}
