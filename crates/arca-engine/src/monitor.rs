//! Periodic health evaluation, metrics collection, and alerting.
//!
//! Every cycle runs four ordered steps: health check → metrics collection →
//! alert evaluation → cleanup. A failing step is logged and the cycle moves
//! on; the loop never stops on its own. The monitor reads scheduler-owned
//! schedules and run history through the store (append-only from its point
//! of view) and exclusively owns health checks, alerts, and metrics.

use std::collections::HashSet;
use std::sync::Arc;

use arca_core::{
    AlertId, AlertKind, AlertSeverity, BackupAlert, BackupHealthCheck, BackupMetrics, CheckResult,
    CheckStatus, CoreError, CoreResult, HealthStatus, HealthSummary, MetricsId, MonitorConfig,
    RunStatus, ScheduleConfig, ScheduledBackupRun,
};
use arca_store::ScheduleStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;

use crate::disk::DiskProbe;
use crate::gateway::BackupGateway;

/// Evaluates backup-system health and raises alerts when it degrades.
///
/// Cheap to clone; all state is behind `Arc`s.
#[derive(Clone)]
pub struct Monitor {
    config: MonitorConfig,
    store: Arc<dyn ScheduleStore>,
    gateway: Arc<dyn BackupGateway>,
    disk: Arc<dyn DiskProbe>,
    alerts: Arc<RwLock<Vec<BackupAlert>>>,
    metrics: Arc<RwLock<Vec<BackupMetrics>>>,
    checks: Arc<RwLock<Vec<BackupHealthCheck>>>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Monitor {
    /// Creates a monitor; no I/O happens until [`Monitor::start`] or an
    /// explicit operation.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn ScheduleStore>,
        gateway: Arc<dyn BackupGateway>,
        disk: Arc<dyn DiskProbe>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            disk,
            alerts: Arc::new(RwLock::new(Vec::new())),
            metrics: Arc::new(RwLock::new(Vec::new())),
            checks: Arc::new(RwLock::new(Vec::new())),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Loads persisted monitoring state into memory.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn reload(&self) -> CoreResult<()> {
        *self.alerts.write() = self.store.load_alerts().await?;
        *self.metrics.write() = self.store.load_metrics().await?;
        *self.checks.write() = self.store.load_health_checks().await?;
        Ok(())
    }

    /// Loads persisted monitoring state and starts the periodic cycle.
    ///
    /// # Errors
    ///
    /// Returns store errors from the initial load.
    pub async fn start(&self) -> CoreResult<()> {
        self.reload().await?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!("monitor cycle already running");
            return Ok(());
        }

        let monitor = self.clone();
        let interval = self.config.cycle_interval();
        *worker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.run_cycle().await;
            }
        }));
        tracing::info!(interval_secs = self.config.cycle_interval_secs, "monitor started");
        Ok(())
    }

    /// Stops the periodic cycle. Explicit operations keep working.
    pub fn shutdown(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            tracing::info!("monitor stopped");
        }
    }

    /// One full monitoring cycle. Each step's error is logged and swallowed
    /// so the loop continues indefinitely.
    pub async fn run_cycle(&self) {
        if let Err(err) = self.run_health_check().await {
            tracing::error!(error = %err, "health check failed");
        }
        if let Err(err) = self.collect_metrics().await {
            tracing::error!(error = %err, "metrics collection failed");
        }
        if let Err(err) = self.check_alerts().await {
            tracing::error!(error = %err, "alert evaluation failed");
        }
        if let Err(err) = self.cleanup_old_data().await {
            tracing::error!(error = %err, "monitoring data cleanup failed");
        }
    }

    // ------------------------------------------------------------------
    // Health evaluation
    // ------------------------------------------------------------------

    /// Evaluates the five sub-checks and appends a fresh snapshot to the
    /// persisted history.
    ///
    /// # Errors
    ///
    /// Returns gateway or store errors; partial evaluations are discarded.
    pub async fn run_health_check(&self) -> CoreResult<BackupHealthCheck> {
        let now = Utc::now();
        let artifacts = self.gateway.list_backups().await?;
        let schedules = self.store.load_schedules().await?;
        let runs = self.store.load_runs().await?;

        let recent_backups = self.check_recent_backups(&artifacts, now);
        let (backup_integrity, healthy, corrupted) = self.check_integrity(&artifacts).await;
        let (disk_space, disk) = self.check_disk_space();
        let (schedule_health, missed) = self.check_schedule_health(&schedules, &runs, now);
        let (performance, avg_run_secs) = self.check_performance(&runs);

        let summary = HealthSummary {
            total_backups: artifacts.len() as u64,
            healthy_backups: healthy,
            corrupted_backups: corrupted,
            missed_schedules: missed,
            avg_run_secs,
            disk_used_bytes: disk.map_or(0, |d| d.used_bytes()),
            disk_available_bytes: disk.map_or(0, |d| d.available_bytes),
        };
        let check = BackupHealthCheck::new(
            now,
            recent_backups,
            backup_integrity,
            disk_space,
            schedule_health,
            performance,
            summary,
        );

        tracing::info!(status = ?check.status, "health check completed");
        let snapshot = {
            let mut checks = self.checks.write();
            checks.push(check.clone());
            checks.clone()
        };
        self.store.save_health_checks(&snapshot).await?;
        Ok(check)
    }

    fn check_recent_backups(&self, artifacts: &[arca_core::ArtifactMeta], now: DateTime<Utc>) -> CheckResult {
        let max_age = Duration::hours(i64::from(self.config.max_backup_age_hours));
        match artifacts.iter().map(|a| a.created_at).max() {
            Some(newest) if now - newest <= max_age => CheckResult::pass(format!(
                "most recent backup is {}m old",
                (now - newest).num_minutes()
            )),
            Some(newest) => CheckResult::fail(format!(
                "no backup in the last {}h (newest is from {newest})",
                self.config.max_backup_age_hours
            )),
            None => CheckResult::fail(format!(
                "no backups exist (required within {}h)",
                self.config.max_backup_age_hours
            )),
        }
    }

    /// Validates the most recent artifacts; returns (result, healthy count,
    /// corrupted count). A gateway error during validation counts the
    /// artifact as corrupted rather than aborting the whole check.
    async fn check_integrity(
        &self,
        artifacts: &[arca_core::ArtifactMeta],
    ) -> (CheckResult, u64, u64) {
        let mut recent: Vec<&arca_core::ArtifactMeta> = artifacts.iter().collect();
        recent.sort_by_key(|a| std::cmp::Reverse(a.created_at));
        recent.truncate(self.config.integrity_sample);

        let mut bad: Vec<String> = Vec::new();
        for artifact in &recent {
            match self.gateway.validate_backup(&artifact.id).await {
                Ok(report) if report.is_valid => {}
                Ok(_) => bad.push(artifact.id.clone()),
                Err(err) => {
                    tracing::warn!(backup_id = %artifact.id, error = %err, "validation call failed");
                    bad.push(artifact.id.clone());
                }
            }
        }

        let healthy = (recent.len() - bad.len()) as u64;
        let corrupted = bad.len() as u64;
        let result = if bad.is_empty() {
            CheckResult::pass(format!("{} recent artifacts validated", recent.len()))
        } else {
            CheckResult::fail(format!("invalid artifacts: {}", bad.join(", ")))
        };
        (result, healthy, corrupted)
    }

    fn check_disk_space(&self) -> (CheckResult, Option<crate::disk::DiskSample>) {
        let threshold = self.config.min_disk_bytes;
        match self.disk.sample() {
            Ok(sample) => {
                let result = if sample.available_bytes < threshold {
                    CheckResult::fail(format!(
                        "{} bytes available, below threshold {threshold}",
                        sample.available_bytes
                    ))
                } else if sample.available_bytes < threshold * 2 {
                    CheckResult::warning(format!(
                        "{} bytes available, below 2x threshold {threshold}",
                        sample.available_bytes
                    ))
                } else {
                    CheckResult::pass(format!("{} bytes available", sample.available_bytes))
                };
                (result, Some(sample))
            }
            Err(err) => (
                CheckResult::fail(format!("disk probe failed: {err}")),
                None,
            ),
        }
    }

    /// A schedule is missed when its last completed run (or its creation,
    /// if it never ran) plus one trigger period is already in the past.
    fn check_schedule_health(
        &self,
        schedules: &[ScheduleConfig],
        runs: &[ScheduledBackupRun],
        now: DateTime<Utc>,
    ) -> (CheckResult, u64) {
        let mut missed: Vec<String> = Vec::new();
        for schedule in schedules.iter().filter(|s| s.enabled) {
            let last_completed = runs
                .iter()
                .filter(|r| r.schedule_id == schedule.id && r.status == RunStatus::Completed)
                .map(|r| r.scheduled_at)
                .max();
            let anchor = last_completed.unwrap_or(schedule.created_at);
            if anchor + schedule.trigger.period() < now {
                missed.push(schedule.name.clone());
            }
        }

        let count = missed.len() as u64;
        let result = if missed.is_empty() {
            CheckResult::pass("all enabled schedules on time")
        } else {
            CheckResult::fail(format!("missed schedules: {}", missed.join(", ")))
        };
        (result, count)
    }

    fn check_performance(&self, runs: &[ScheduledBackupRun]) -> (CheckResult, f64) {
        let durations: Vec<f64> = runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .filter_map(|r| r.duration())
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .collect();
        if durations.is_empty() {
            return (CheckResult::pass("no completed runs to evaluate"), 0.0);
        }

        let avg = durations.iter().sum::<f64>() / durations.len() as f64;
        let max = self.config.max_backup_secs as f64;
        let result = if avg > max {
            CheckResult::warning(format!(
                "average run duration {avg:.0}s exceeds limit {max:.0}s"
            ))
        } else {
            CheckResult::pass(format!("average run duration {avg:.0}s"))
        };
        (result, avg)
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// Samples current totals into a new metrics entry and persists it.
    ///
    /// # Errors
    ///
    /// Returns gateway or store errors.
    pub async fn collect_metrics(&self) -> CoreResult<BackupMetrics> {
        let artifacts = self.gateway.list_backups().await?;
        let schedules = self.store.load_schedules().await?;
        let runs = self.store.load_runs().await?;
        let disk = self.disk.sample().ok();

        let successful_runs = runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .count() as u64;
        let failed_runs = runs.iter().filter(|r| r.status == RunStatus::Failed).count() as u64;

        let avg_backup_bytes = if artifacts.is_empty() {
            0.0
        } else {
            artifacts.iter().map(|a| a.size_bytes as f64).sum::<f64>() / artifacts.len() as f64
        };

        let durations: Vec<f64> = runs
            .iter()
            .filter(|r| r.status == RunStatus::Completed)
            .filter_map(|r| r.duration())
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .collect();
        let avg_run_secs = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        let fired = successful_runs + failed_runs;
        let schedule_compliance = if fired == 0 {
            1.0
        } else {
            successful_runs as f64 / fired as f64
        };

        let sample = BackupMetrics {
            id: MetricsId::new(),
            timestamp: Utc::now(),
            total_backups: artifacts.len() as u64,
            successful_runs,
            failed_runs,
            avg_backup_bytes,
            avg_run_secs,
            disk_used_bytes: disk.map_or(0, |d| d.used_bytes()),
            compression_ratio: compression_ratio(&artifacts, &schedules, &runs),
            schedule_compliance,
            performance_score: BackupMetrics::performance_score(
                successful_runs,
                failed_runs,
                avg_run_secs,
                self.config.max_backup_secs,
            ),
        };

        let snapshot = {
            let mut metrics = self.metrics.write();
            metrics.push(sample.clone());
            metrics.clone()
        };
        self.store.save_metrics(&snapshot).await?;
        tracing::debug!(performance_score = sample.performance_score, "metrics collected");
        Ok(sample)
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Stores a new unresolved alert.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn create_alert(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> CoreResult<AlertId> {
        let alert = BackupAlert::new(kind, severity, title, message, metadata);
        let id = alert.id;
        tracing::warn!(
            alert_id = %id,
            kind = alert.kind.as_str(),
            severity = ?alert.severity,
            title = %alert.title,
            "alert raised"
        );
        let snapshot = {
            let mut alerts = self.alerts.write();
            alerts.push(alert);
            alerts.clone()
        };
        self.store.save_alerts(&snapshot).await?;
        Ok(id)
    }

    /// Marks an alert resolved.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `InvalidState` when already
    /// resolved; the collection is unchanged in both cases.
    pub async fn resolve_alert(&self, id: AlertId) -> CoreResult<()> {
        let snapshot = {
            let mut alerts = self.alerts.write();
            let alert = alerts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| CoreError::not_found("alert", id.to_string()))?;
            alert.resolve(Utc::now())?;
            alerts.clone()
        };
        self.store.save_alerts(&snapshot).await?;
        tracing::info!(alert_id = %id, "alert resolved");
        Ok(())
    }

    /// Inspects the most recent health check and raises alerts for degraded
    /// conditions. While an unresolved alert with the same `(kind, scope)`
    /// exists, the duplicate is suppressed; a fresh alert is only created
    /// after the previous one is resolved.
    ///
    /// # Errors
    ///
    /// Returns store errors from persisting new alerts.
    pub async fn check_alerts(&self) -> CoreResult<Vec<AlertId>> {
        let Some(check) = self.latest_health_check() else {
            return Ok(vec![]);
        };

        let open: HashSet<(AlertKind, String)> = self
            .alerts
            .read()
            .iter()
            .filter(|a| !a.resolved)
            .map(|a| (a.kind, a.scope().to_string()))
            .collect();
        let mut raised = Vec::new();

        if check.status == HealthStatus::Critical
            && !open.contains(&(AlertKind::BackupFailed, "system".to_string()))
        {
            let id = self
                .create_alert(
                    AlertKind::BackupFailed,
                    AlertSeverity::Critical,
                    "Backup system critical",
                    "Latest health check reported a critical status",
                    metadata_with_scope("system", Map::new()),
                )
                .await?;
            raised.push(id);
        }

        if check.disk_space.status == CheckStatus::Fail
            && !open.contains(&(AlertKind::DiskSpaceLow, "disk".to_string()))
        {
            let mut extra = Map::new();
            extra.insert(
                "available_bytes".to_string(),
                json!(check.summary.disk_available_bytes),
            );
            extra.insert("threshold_bytes".to_string(), json!(self.config.min_disk_bytes));
            let id = self
                .create_alert(
                    AlertKind::DiskSpaceLow,
                    AlertSeverity::High,
                    "Low disk space",
                    check.disk_space.message.clone(),
                    metadata_with_scope("disk", extra),
                )
                .await?;
            raised.push(id);
        }

        if check.performance.status == CheckStatus::Warning
            && !open.contains(&(AlertKind::PerformanceDegraded, "performance".to_string()))
        {
            let mut extra = Map::new();
            extra.insert("avg_run_secs".to_string(), json!(check.summary.avg_run_secs));
            extra.insert("max_backup_secs".to_string(), json!(self.config.max_backup_secs));
            let id = self
                .create_alert(
                    AlertKind::PerformanceDegraded,
                    AlertSeverity::Medium,
                    "Backup performance degraded",
                    check.performance.message.clone(),
                    metadata_with_scope("performance", extra),
                )
                .await?;
            raised.push(id);
        }

        if check.schedule_health.status == CheckStatus::Fail
            && !open.contains(&(AlertKind::ScheduleMissed, "schedules".to_string()))
        {
            let mut extra = Map::new();
            extra.insert(
                "missed_schedules".to_string(),
                json!(check.summary.missed_schedules),
            );
            let id = self
                .create_alert(
                    AlertKind::ScheduleMissed,
                    AlertSeverity::High,
                    "Schedules missed",
                    check.schedule_health.message.clone(),
                    metadata_with_scope("schedules", extra),
                )
                .await?;
            raised.push(id);
        }

        if check.backup_integrity.status == CheckStatus::Fail
            && !open.contains(&(AlertKind::BackupCorrupted, "integrity".to_string()))
        {
            let mut extra = Map::new();
            extra.insert(
                "corrupted_backups".to_string(),
                json!(check.summary.corrupted_backups),
            );
            let id = self
                .create_alert(
                    AlertKind::BackupCorrupted,
                    AlertSeverity::Critical,
                    "Backup integrity failure",
                    check.backup_integrity.message.clone(),
                    metadata_with_scope("integrity", extra),
                )
                .await?;
            raised.push(id);
        }

        Ok(raised)
    }

    // ------------------------------------------------------------------
    // Cleanup and accessors
    // ------------------------------------------------------------------

    /// Prunes expired metrics, resolved alerts past their retention, and
    /// stale health-check history. Unresolved alerts are never pruned.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn cleanup_old_data(&self) -> CoreResult<()> {
        let now = Utc::now();
        let metrics_cutoff = now - Duration::days(i64::from(self.config.metrics_retention_days));
        let alert_cutoff = now - Duration::days(i64::from(self.config.alert_retention_days));

        let (metrics_snapshot, metrics_removed) = {
            let mut metrics = self.metrics.write();
            let before = metrics.len();
            metrics.retain(|m| m.timestamp >= metrics_cutoff);
            (metrics.clone(), before - metrics.len())
        };
        let (alerts_snapshot, alerts_removed) = {
            let mut alerts = self.alerts.write();
            let before = alerts.len();
            alerts.retain(|a| {
                !a.resolved || a.resolved_at.unwrap_or(a.timestamp) >= alert_cutoff
            });
            (alerts.clone(), before - alerts.len())
        };
        let (checks_snapshot, checks_removed) = {
            let mut checks = self.checks.write();
            let before = checks.len();
            checks.retain(|c| c.timestamp >= metrics_cutoff);
            (checks.clone(), before - checks.len())
        };

        if metrics_removed > 0 {
            self.store.save_metrics(&metrics_snapshot).await?;
        }
        if alerts_removed > 0 {
            self.store.save_alerts(&alerts_snapshot).await?;
        }
        if checks_removed > 0 {
            self.store.save_health_checks(&checks_snapshot).await?;
        }
        if metrics_removed + alerts_removed + checks_removed > 0 {
            tracing::debug!(
                metrics_removed,
                alerts_removed,
                checks_removed,
                "old monitoring data pruned"
            );
        }
        Ok(())
    }

    /// Most recent health check, if any.
    #[must_use]
    pub fn latest_health_check(&self) -> Option<BackupHealthCheck> {
        self.checks.read().last().cloned()
    }

    /// Unresolved alerts, newest first.
    #[must_use]
    pub fn active_alerts(&self) -> Vec<BackupAlert> {
        let mut active: Vec<BackupAlert> = self
            .alerts
            .read()
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        active.sort_by_key(|a| std::cmp::Reverse(a.timestamp));
        active
    }

    /// All alerts, resolved included, newest first.
    #[must_use]
    pub fn alert_history(&self) -> Vec<BackupAlert> {
        let mut all = self.alerts.read().clone();
        all.sort_by_key(|a| std::cmp::Reverse(a.timestamp));
        all
    }

    /// Collected metrics samples, oldest first.
    #[must_use]
    pub fn metrics_history(&self) -> Vec<BackupMetrics> {
        self.metrics.read().clone()
    }
}

fn metadata_with_scope(scope: &str, mut extra: Map<String, Value>) -> Map<String, Value> {
    extra.insert("scope".to_string(), json!(scope));
    extra
}

/// Fraction of stored bytes produced by compress-enabled schedules, derived
/// by joining artifacts to their runs' owning schedules. 0.0 when nothing is
/// stored or no producer is known.
fn compression_ratio(
    artifacts: &[arca_core::ArtifactMeta],
    schedules: &[ScheduleConfig],
    runs: &[ScheduledBackupRun],
) -> f64 {
    let total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
    if total == 0 {
        return 0.0;
    }

    let compressed: u64 = artifacts
        .iter()
        .filter(|artifact| {
            runs.iter()
                .find(|r| r.backup_id.as_deref() == Some(artifact.id.as_str()))
                .and_then(|run| schedules.iter().find(|s| s.id == run.schedule_id))
                .is_some_and(|schedule| schedule.backup.compress)
        })
        .map(|a| a.size_bytes)
        .sum();
    compressed as f64 / total as f64
}
