//! In-memory store used by tests.

use arca_core::{
    BackupAlert, BackupHealthCheck, BackupMetrics, CoreResult, ScheduleConfig, ScheduledBackupRun,
};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::ScheduleStore;

/// Non-durable `ScheduleStore` backed by `parking_lot` locks.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    schedules: RwLock<Vec<ScheduleConfig>>,
    runs: RwLock<Vec<ScheduledBackupRun>>,
    alerts: RwLock<Vec<BackupAlert>>,
    metrics: RwLock<Vec<BackupMetrics>>,
    health_checks: RwLock<Vec<BackupHealthCheck>>,
}

impl MemoryScheduleStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load_schedules(&self) -> CoreResult<Vec<ScheduleConfig>> {
        Ok(self.schedules.read().clone())
    }

    async fn save_schedules(&self, schedules: &[ScheduleConfig]) -> CoreResult<()> {
        *self.schedules.write() = schedules.to_vec();
        Ok(())
    }

    async fn load_runs(&self) -> CoreResult<Vec<ScheduledBackupRun>> {
        Ok(self.runs.read().clone())
    }

    async fn save_runs(&self, runs: &[ScheduledBackupRun]) -> CoreResult<()> {
        *self.runs.write() = runs.to_vec();
        Ok(())
    }

    async fn load_alerts(&self) -> CoreResult<Vec<BackupAlert>> {
        Ok(self.alerts.read().clone())
    }

    async fn save_alerts(&self, alerts: &[BackupAlert]) -> CoreResult<()> {
        *self.alerts.write() = alerts.to_vec();
        Ok(())
    }

    async fn load_metrics(&self) -> CoreResult<Vec<BackupMetrics>> {
        Ok(self.metrics.read().clone())
    }

    async fn save_metrics(&self, metrics: &[BackupMetrics]) -> CoreResult<()> {
        *self.metrics.write() = metrics.to_vec();
        Ok(())
    }

    async fn load_health_checks(&self) -> CoreResult<Vec<BackupHealthCheck>> {
        Ok(self.health_checks.read().clone())
    }

    async fn save_health_checks(&self, checks: &[BackupHealthCheck]) -> CoreResult<()> {
        *self.health_checks.write() = checks.to_vec();
        Ok(())
    }
}
