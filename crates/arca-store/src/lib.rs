//! Durable persistence for schedules, runs, alerts, metrics, and health
//! checks.
//!
//! Each entity kind is stored as one serialized ordered collection and fully
//! rewritten on every save. The design assumes a single writer process;
//! concurrent external writers would race (single-instance deployment
//! assumption).

pub mod file;
pub mod memory;

use arca_core::{
    BackupAlert, BackupHealthCheck, BackupMetrics, CoreResult, ScheduleConfig, ScheduledBackupRun,
};
use async_trait::async_trait;

pub use file::FileScheduleStore;
pub use memory::MemoryScheduleStore;

/// Interface for backup lifecycle persistence backends.
///
/// Loads return the full collection (empty when nothing was ever saved);
/// saves replace the full collection. The scheduler owns schedules and runs,
/// the monitor owns alerts, metrics, and health checks; neither writes the
/// other's collections.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Load all schedule definitions.
    async fn load_schedules(&self) -> CoreResult<Vec<ScheduleConfig>>;

    /// Replace all schedule definitions.
    async fn save_schedules(&self, schedules: &[ScheduleConfig]) -> CoreResult<()>;

    /// Load the run history.
    async fn load_runs(&self) -> CoreResult<Vec<ScheduledBackupRun>>;

    /// Replace the run history.
    async fn save_runs(&self, runs: &[ScheduledBackupRun]) -> CoreResult<()>;

    /// Load all alerts, resolved and unresolved.
    async fn load_alerts(&self) -> CoreResult<Vec<BackupAlert>>;

    /// Replace all alerts.
    async fn save_alerts(&self, alerts: &[BackupAlert]) -> CoreResult<()>;

    /// Load the metrics history.
    async fn load_metrics(&self) -> CoreResult<Vec<BackupMetrics>>;

    /// Replace the metrics history.
    async fn save_metrics(&self, metrics: &[BackupMetrics]) -> CoreResult<()>;

    /// Load the health-check history.
    async fn load_health_checks(&self) -> CoreResult<Vec<BackupHealthCheck>>;

    /// Replace the health-check history.
    async fn save_health_checks(&self, checks: &[BackupHealthCheck]) -> CoreResult<()>;
}
