//! File-backed store: one JSON file per entity kind.
//!
//! Saves serialize the whole collection to a `.tmp` sibling and atomically
//! rename it over the target, so a crash mid-write never leaves a truncated
//! file behind. Loads treat a missing file as an empty collection.

use std::path::{Path, PathBuf};

use arca_core::{
    BackupAlert, BackupHealthCheck, BackupMetrics, CoreError, CoreResult, ScheduleConfig,
    ScheduledBackupRun,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ScheduleStore;

const SCHEDULES_FILE: &str = "schedules.json";
const RUNS_FILE: &str = "runs.json";
const ALERTS_FILE: &str = "alerts.json";
const METRICS_FILE: &str = "metrics.json";
const HEALTH_CHECKS_FILE: &str = "health-checks.json";

/// JSON-file persistence under a single data directory.
#[derive(Debug, Clone)]
pub struct FileScheduleStore {
    dir: PathBuf,
}

impl FileScheduleStore {
    /// Opens (and creates, if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Data directory this store writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load_collection<T: DeserializeOwned>(&self, file: &str) -> CoreResult<Vec<T>> {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|err| CoreError::Deserialization(format!("{}: {err}", path.display())))
    }

    async fn save_collection<T: Serialize>(&self, file: &str, items: &[T]) -> CoreResult<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!(file = %path.display(), items = items.len(), "collection saved");
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn load_schedules(&self) -> CoreResult<Vec<ScheduleConfig>> {
        self.load_collection(SCHEDULES_FILE).await
    }

    async fn save_schedules(&self, schedules: &[ScheduleConfig]) -> CoreResult<()> {
        self.save_collection(SCHEDULES_FILE, schedules).await
    }

    async fn load_runs(&self) -> CoreResult<Vec<ScheduledBackupRun>> {
        self.load_collection(RUNS_FILE).await
    }

    async fn save_runs(&self, runs: &[ScheduledBackupRun]) -> CoreResult<()> {
        self.save_collection(RUNS_FILE, runs).await
    }

    async fn load_alerts(&self) -> CoreResult<Vec<BackupAlert>> {
        self.load_collection(ALERTS_FILE).await
    }

    async fn save_alerts(&self, alerts: &[BackupAlert]) -> CoreResult<()> {
        self.save_collection(ALERTS_FILE, alerts).await
    }

    async fn load_metrics(&self) -> CoreResult<Vec<BackupMetrics>> {
        self.load_collection(METRICS_FILE).await
    }

    async fn save_metrics(&self, metrics: &[BackupMetrics]) -> CoreResult<()> {
        self.save_collection(METRICS_FILE, metrics).await
    }

    async fn load_health_checks(&self) -> CoreResult<Vec<BackupHealthCheck>> {
        self.load_collection(HEALTH_CHECKS_FILE).await
    }

    async fn save_health_checks(&self, checks: &[BackupHealthCheck]) -> CoreResult<()> {
        self.save_collection(HEALTH_CHECKS_FILE, checks).await
    }
}
