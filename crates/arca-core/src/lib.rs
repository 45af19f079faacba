//! Core domain types for the Arca backup lifecycle manager.

pub mod alert;
pub mod artifact;
pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod metrics;
pub mod run;
pub mod schedule;
pub mod trigger;

pub use alert::{AlertKind, AlertSeverity, BackupAlert};
pub use artifact::ArtifactMeta;
pub use config::{ArcaConfig, MonitorConfig, OverflowPolicy, SchedulerConfig, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use health::{BackupHealthCheck, CheckResult, CheckStatus, HealthStatus, HealthSummary};
pub use ids::{AlertId, CheckId, MetricsId, RunId, ScheduleId};
pub use metrics::BackupMetrics;
pub use run::{RunStatus, ScheduledBackupRun};
pub use schedule::{BackupFormat, BackupJobConfig, ScheduleConfig, ScheduleUpdate};
pub use trigger::Trigger;
