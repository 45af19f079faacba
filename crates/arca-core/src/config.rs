//! Configuration for the backup lifecycle core.
//!
//! Supports, in order of precedence:
//! - `ARCA`-prefixed environment variables (e.g.
//!   `ARCA__SCHEDULER__MAX_CONCURRENT_JOBS=4`)
//! - a config file named by the `ARCA_CONFIG` environment variable
//! - `./config/arca.yaml`
//! - hardcoded defaults

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What to do with a fire when the concurrency cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for a permit; the run executes late rather than never.
    Queue,
    /// Record the run as skipped and wait for the next fire.
    Skip,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Queue
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// System-wide bound on concurrently executing backup jobs.
    pub max_concurrent_jobs: usize,
    /// Behavior when the bound is reached.
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Interval between gateway job status polls, in seconds.
    pub poll_interval_secs: u64,
    /// Hard deadline for one backup job, in seconds.
    pub job_timeout_secs: u64,
    /// Runs older than this many days are purged from history.
    pub run_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            overflow: OverflowPolicy::Queue,
            poll_interval_secs: 5,
            job_timeout_secs: 3600,
            run_retention_days: 30,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Job timeout as a `Duration`.
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Monitor tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Interval between monitoring cycles, in seconds.
    pub cycle_interval_secs: u64,
    /// `recent_backups` fails when no artifact is younger than this.
    pub max_backup_age_hours: u32,
    /// How many of the most recent artifacts `backup_integrity` validates.
    pub integrity_sample: usize,
    /// `disk_space` fails below this many available bytes; warns below 2x.
    pub min_disk_bytes: u64,
    /// `performance` warns when average run duration exceeds this.
    pub max_backup_secs: u64,
    /// Metrics samples older than this many days are pruned.
    pub metrics_retention_days: u32,
    /// Resolved alerts older than this many days are pruned.
    pub alert_retention_days: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300,
            max_backup_age_hours: 24,
            integrity_sample: 10,
            min_disk_bytes: 10 * 1024 * 1024 * 1024,
            max_backup_secs: 1800,
            metrics_retention_days: 30,
            alert_retention_days: 7,
        }
    }
}

impl MonitorConfig {
    /// Cycle interval as a `Duration`.
    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

/// Persistence location.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Directory holding the per-entity-kind JSON files.
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Root configuration for the backup lifecycle core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArcaConfig {
    /// Scheduler tuning.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Monitor tuning.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Persistence location.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ArcaConfig {
    /// Loads configuration from defaults, optional files, and environment
    /// overrides, then validates it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a source cannot be parsed or validation
    /// fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Ok(config_path) = std::env::var("ARCA_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }
        builder = builder.add_source(File::with_name("./config/arca").required(false));

        builder = builder.add_source(
            Environment::with_prefix("ARCA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ArcaConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let scheduler = SchedulerConfig::default();
        let monitor = MonitorConfig::default();
        builder
            .set_default("scheduler.max_concurrent_jobs", scheduler.max_concurrent_jobs as u64)?
            .set_default("scheduler.overflow", "queue")?
            .set_default("scheduler.poll_interval_secs", scheduler.poll_interval_secs)?
            .set_default("scheduler.job_timeout_secs", scheduler.job_timeout_secs)?
            .set_default("scheduler.run_retention_days", u64::from(scheduler.run_retention_days))?
            .set_default("monitor.cycle_interval_secs", monitor.cycle_interval_secs)?
            .set_default("monitor.max_backup_age_hours", u64::from(monitor.max_backup_age_hours))?
            .set_default("monitor.integrity_sample", monitor.integrity_sample as u64)?
            .set_default("monitor.min_disk_bytes", monitor.min_disk_bytes)?
            .set_default("monitor.max_backup_secs", monitor.max_backup_secs)?
            .set_default("monitor.metrics_retention_days", u64::from(monitor.metrics_retention_days))?
            .set_default("monitor.alert_retention_days", u64::from(monitor.alert_retention_days))?
            .set_default("store.data_dir", "./data")
    }

    /// Rejects configurations that would stall or disable the loops.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(ConfigError::Message(
                "scheduler.max_concurrent_jobs must be at least 1".into(),
            ));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.job_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.job_timeout_secs must be at least 1".into(),
            ));
        }
        if self.scheduler.run_retention_days == 0 {
            return Err(ConfigError::Message(
                "scheduler.run_retention_days must be at least 1".into(),
            ));
        }
        if self.monitor.cycle_interval_secs == 0 {
            return Err(ConfigError::Message(
                "monitor.cycle_interval_secs must be at least 1".into(),
            ));
        }
        if self.monitor.metrics_retention_days == 0 || self.monitor.alert_retention_days == 0 {
            return Err(ConfigError::Message(
                "monitor retention windows must be at least 1 day".into(),
            ));
        }
        Ok(())
    }
}
