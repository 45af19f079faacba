//! Scheduling, monitoring, and recovery engine for the Arca backup
//! lifecycle manager.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──fires──▶ BackupGateway ──produces──▶ artifacts
//!     │ runs                                          │
//!     ▼                                               ▼
//! ScheduleStore ◀──health/alerts/metrics── Monitor ◀──reads
//! ```
//!
//! The scheduler fires runs and records their outcomes; the monitor
//! periodically reads that state (plus the gateway's artifact list and disk
//! capacity) to derive health checks, alerts, and metrics. Both persist
//! through `arca-store` but own disjoint entity kinds.

pub mod disk;
pub mod gateway;
pub mod monitor;
pub mod notify;
pub mod recovery;
pub mod scheduler;

pub use disk::{DiskProbe, DiskSample, FixedDiskProbe, SystemDiskProbe};
pub use gateway::{
    BackupGateway, BackupJob, JobOutcome, JobStatus, MemoryBackupGateway, RecoveryOptions,
    RecoveryPlan, ValidationReport,
};
pub use monitor::Monitor;
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use recovery::RecoveryService;
pub use scheduler::{NewSchedule, Scheduler};
