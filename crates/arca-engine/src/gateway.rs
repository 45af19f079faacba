//! Contract for the external backup gateway.
//!
//! The gateway owns byte-level backup creation, validation, deletion, and
//! restore. This module defines the narrow asynchronous interface the
//! scheduler and monitor consume, plus an in-memory implementation used by
//! tests and the dev daemon.

use std::collections::HashMap;
use std::sync::Arc;

use arca_core::{ArtifactMeta, BackupJobConfig, CoreError, CoreResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a gateway job (backup or recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not yet started.
    Pending,
    /// In flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// True for states that never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Observable state of an asynchronous gateway job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJob {
    /// Gateway-assigned job identifier.
    pub id: String,
    /// Current state.
    pub status: JobStatus,
    /// Completion estimate, 0-100.
    pub progress: u8,
    /// Failure description when `status` is `Failed`.
    pub error: Option<String>,
    /// Produced artifact when `status` is `Completed`.
    pub artifact: Option<ArtifactMeta>,
}

/// Result of validating one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the artifact passed all checks.
    pub is_valid: bool,
    /// Validation failures, empty when valid.
    pub errors: Vec<String>,
}

/// Options for a restore operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryOptions {
    /// Restore into this database instead of the original.
    pub target_database: Option<String>,
    /// Restrict the restore to these tables; empty means all.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Plan and validate without touching data.
    #[serde(default)]
    pub dry_run: bool,
}

/// Ordered description of what a restore would do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    /// Artifact the plan restores from.
    pub backup_id: String,
    /// Human-readable steps, in execution order.
    pub steps: Vec<String>,
    /// Rough duration estimate in seconds.
    pub estimated_duration_secs: u64,
}

/// Narrow interface to the external backup gateway.
#[async_trait]
pub trait BackupGateway: Send + Sync {
    /// Starts an asynchronous full backup and returns the job identifier.
    async fn create_full_backup(
        &self,
        name: &str,
        config: &BackupJobConfig,
        tags: &[String],
    ) -> CoreResult<String>;

    /// Returns the current state of a backup job.
    async fn get_job(&self, job_id: &str) -> CoreResult<BackupJob>;

    /// Lists all artifacts the gateway holds.
    async fn list_backups(&self) -> CoreResult<Vec<ArtifactMeta>>;

    /// Validates one artifact's integrity.
    async fn validate_backup(&self, backup_id: &str) -> CoreResult<ValidationReport>;

    /// Deletes one artifact.
    async fn delete_backup(&self, backup_id: &str) -> CoreResult<()>;

    /// Produces a restore plan for one artifact.
    async fn create_recovery_plan(
        &self,
        backup_id: &str,
        options: &RecoveryOptions,
    ) -> CoreResult<RecoveryPlan>;

    /// Starts an asynchronous restore and returns the job identifier.
    async fn execute_recovery(
        &self,
        backup_id: &str,
        options: &RecoveryOptions,
    ) -> CoreResult<String>;

    /// Returns the current state of a recovery job.
    async fn get_recovery_job(&self, job_id: &str) -> CoreResult<BackupJob>;
}

/// Scripted outcome for the next jobs a [`MemoryBackupGateway`] creates.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Job completes and produces an artifact of the given size.
    Succeed {
        /// Artifact size in bytes.
        size_bytes: u64,
    },
    /// Job fails with the given error.
    Fail {
        /// Error surfaced through the job handle.
        error: String,
    },
}

impl Default for JobOutcome {
    fn default() -> Self {
        Self::Succeed { size_bytes: 1 << 20 }
    }
}

#[derive(Debug)]
struct PendingJob {
    job: BackupJob,
    /// `get_job` reports `Running` this many more times before settling.
    polls_remaining: u32,
    outcome: JobOutcome,
    name: String,
    kind: String,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct GatewayState {
    artifacts: Vec<ArtifactMeta>,
    jobs: HashMap<String, PendingJob>,
    recovery_jobs: HashMap<String, BackupJob>,
    corrupted: Vec<String>,
    deleted: Vec<String>,
    outcome: JobOutcome,
    polls_until_done: u32,
}

/// In-memory gateway for tests and dev deployments.
///
/// Jobs settle after a scriptable number of `get_job` polls; artifacts live
/// in a plain vector. Not durable.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackupGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl MemoryBackupGateway {
    /// Construct an empty gateway where jobs succeed on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome of jobs created from now on.
    pub fn set_outcome(&self, outcome: JobOutcome) {
        self.state.write().outcome = outcome;
    }

    /// Makes future jobs report `Running` for `polls` polls before settling.
    pub fn set_polls_until_done(&self, polls: u32) {
        self.state.write().polls_until_done = polls;
    }

    /// Registers a pre-existing artifact.
    pub fn seed_artifact(&self, artifact: ArtifactMeta) {
        self.state.write().artifacts.push(artifact);
    }

    /// Marks an artifact as corrupt for `validate_backup`.
    pub fn mark_corrupted(&self, backup_id: impl Into<String>) {
        self.state.write().corrupted.push(backup_id.into());
    }

    /// Identifiers passed to `delete_backup`, in call order.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        self.state.read().deleted.clone()
    }
}

#[async_trait]
impl BackupGateway for MemoryBackupGateway {
    async fn create_full_backup(
        &self,
        name: &str,
        config: &BackupJobConfig,
        tags: &[String],
    ) -> CoreResult<String> {
        let mut state = self.state.write();
        let job_id = format!("job-{}", Uuid::new_v4());
        let job = BackupJob {
            id: job_id.clone(),
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            artifact: None,
        };
        let pending = PendingJob {
            job,
            polls_remaining: state.polls_until_done,
            outcome: state.outcome.clone(),
            name: name.to_string(),
            kind: config.format.as_str().to_string(),
            tags: tags.to_vec(),
        };
        state.jobs.insert(job_id.clone(), pending);
        Ok(job_id)
    }

    async fn get_job(&self, job_id: &str) -> CoreResult<BackupJob> {
        let mut state = self.state.write();
        let pending = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found("job", job_id))?;

        if pending.job.status.is_terminal() {
            return Ok(pending.job.clone());
        }
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            pending.job.status = JobStatus::Running;
            pending.job.progress = 50;
            return Ok(pending.job.clone());
        }

        match pending.outcome.clone() {
            JobOutcome::Succeed { size_bytes } => {
                let artifact = ArtifactMeta {
                    id: format!("bk-{}", Uuid::new_v4()),
                    name: pending.name.clone(),
                    kind: pending.kind.clone(),
                    size_bytes,
                    created_at: Utc::now(),
                    tags: pending.tags.clone(),
                };
                pending.job.status = JobStatus::Completed;
                pending.job.progress = 100;
                pending.job.artifact = Some(artifact.clone());
                let job = pending.job.clone();
                state.artifacts.push(artifact);
                Ok(job)
            }
            JobOutcome::Fail { error } => {
                pending.job.status = JobStatus::Failed;
                pending.job.error = Some(error);
                Ok(pending.job.clone())
            }
        }
    }

    async fn list_backups(&self) -> CoreResult<Vec<ArtifactMeta>> {
        Ok(self.state.read().artifacts.clone())
    }

    async fn validate_backup(&self, backup_id: &str) -> CoreResult<ValidationReport> {
        let state = self.state.read();
        if !state.artifacts.iter().any(|a| a.id == backup_id) {
            return Err(CoreError::not_found("backup", backup_id));
        }
        if state.corrupted.iter().any(|id| id == backup_id) {
            return Ok(ValidationReport {
                is_valid: false,
                errors: vec![format!("checksum mismatch for {backup_id}")],
            });
        }
        Ok(ValidationReport {
            is_valid: true,
            errors: vec![],
        })
    }

    async fn delete_backup(&self, backup_id: &str) -> CoreResult<()> {
        let mut state = self.state.write();
        let before = state.artifacts.len();
        state.artifacts.retain(|a| a.id != backup_id);
        if state.artifacts.len() == before {
            return Err(CoreError::not_found("backup", backup_id));
        }
        state.deleted.push(backup_id.to_string());
        Ok(())
    }

    async fn create_recovery_plan(
        &self,
        backup_id: &str,
        options: &RecoveryOptions,
    ) -> CoreResult<RecoveryPlan> {
        let state = self.state.read();
        let artifact = state
            .artifacts
            .iter()
            .find(|a| a.id == backup_id)
            .ok_or_else(|| CoreError::not_found("backup", backup_id))?;

        let mut steps = vec![format!("validate artifact {}", artifact.id)];
        if options.tables.is_empty() {
            steps.push("restore all tables".to_string());
        } else {
            steps.push(format!("restore tables: {}", options.tables.join(", ")));
        }
        Ok(RecoveryPlan {
            backup_id: backup_id.to_string(),
            steps,
            estimated_duration_secs: artifact.size_bytes / (50 * 1024 * 1024) + 1,
        })
    }

    async fn execute_recovery(
        &self,
        backup_id: &str,
        _options: &RecoveryOptions,
    ) -> CoreResult<String> {
        let mut state = self.state.write();
        if !state.artifacts.iter().any(|a| a.id == backup_id) {
            return Err(CoreError::not_found("backup", backup_id));
        }
        let job_id = format!("rec-{}", Uuid::new_v4());
        state.recovery_jobs.insert(
            job_id.clone(),
            BackupJob {
                id: job_id.clone(),
                status: JobStatus::Completed,
                progress: 100,
                error: None,
                artifact: None,
            },
        );
        Ok(job_id)
    }

    async fn get_recovery_job(&self, job_id: &str) -> CoreResult<BackupJob> {
        self.state
            .read()
            .recovery_jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("recovery job", job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_settles_after_scripted_polls() {
        let gateway = MemoryBackupGateway::new();
        gateway.set_polls_until_done(2);

        let job_id = gateway
            .create_full_backup("nightly-20250310", &BackupJobConfig::default(), &[])
            .await
            .unwrap();

        assert_eq!(gateway.get_job(&job_id).await.unwrap().status, JobStatus::Running);
        assert_eq!(gateway.get_job(&job_id).await.unwrap().status, JobStatus::Running);
        let done = gateway.get_job(&job_id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.artifact.is_some());
        assert_eq!(gateway.list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_outcome_reports_error_and_no_artifact() {
        let gateway = MemoryBackupGateway::new();
        gateway.set_outcome(JobOutcome::Fail {
            error: "disk full".to_string(),
        });

        let job_id = gateway
            .create_full_backup("nightly", &BackupJobConfig::default(), &[])
            .await
            .unwrap();
        let job = gateway.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert!(gateway.list_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validate_flags_corrupted_artifacts() {
        let gateway = MemoryBackupGateway::new();
        gateway.seed_artifact(ArtifactMeta {
            id: "bk-1".to_string(),
            name: "n".to_string(),
            kind: "full".to_string(),
            size_bytes: 1,
            created_at: Utc::now(),
            tags: vec![],
        });
        gateway.mark_corrupted("bk-1");

        let report = gateway.validate_backup("bk-1").await.unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn delete_unknown_backup_is_not_found() {
        let gateway = MemoryBackupGateway::new();
        assert!(gateway.delete_backup("missing").await.is_err());
    }
}
