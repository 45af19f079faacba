//! Thin restore surface over the backup gateway.
//!
//! The gateway performs the actual restore; this service only validates that
//! the requested artifact exists before delegating, so callers get a
//! `NotFound` instead of an opaque gateway failure.

use std::sync::Arc;

use arca_core::{CoreError, CoreResult};

use crate::gateway::{BackupGateway, BackupJob, RecoveryOptions, RecoveryPlan};

/// Pass-through recovery operations consumed by the CLI layer.
#[derive(Clone)]
pub struct RecoveryService {
    gateway: Arc<dyn BackupGateway>,
}

impl RecoveryService {
    /// Wraps a gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn BackupGateway>) -> Self {
        Self { gateway }
    }

    /// Produces a restore plan for an existing artifact.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the artifact does not exist, otherwise
    /// gateway errors.
    pub async fn plan_recovery(
        &self,
        backup_id: &str,
        options: &RecoveryOptions,
    ) -> CoreResult<RecoveryPlan> {
        self.ensure_artifact(backup_id).await?;
        self.gateway.create_recovery_plan(backup_id, options).await
    }

    /// Starts a restore and returns the gateway job identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the artifact does not exist, otherwise
    /// gateway errors.
    pub async fn execute_recovery(
        &self,
        backup_id: &str,
        options: &RecoveryOptions,
    ) -> CoreResult<String> {
        self.ensure_artifact(backup_id).await?;
        let job_id = self.gateway.execute_recovery(backup_id, options).await?;
        tracing::info!(backup_id, job_id = %job_id, dry_run = options.dry_run, "recovery started");
        Ok(job_id)
    }

    /// Current state of a recovery job.
    ///
    /// # Errors
    ///
    /// Returns gateway errors, including `NotFound` for unknown jobs.
    pub async fn recovery_status(&self, job_id: &str) -> CoreResult<BackupJob> {
        self.gateway.get_recovery_job(job_id).await
    }

    async fn ensure_artifact(&self, backup_id: &str) -> CoreResult<()> {
        let known = self
            .gateway
            .list_backups()
            .await?
            .iter()
            .any(|a| a.id == backup_id);
        if !known {
            return Err(CoreError::not_found("backup", backup_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{JobStatus, MemoryBackupGateway};
    use arca_core::ArtifactMeta;
    use chrono::Utc;

    fn service_with_artifact() -> RecoveryService {
        let gateway = MemoryBackupGateway::new();
        gateway.seed_artifact(ArtifactMeta {
            id: "bk-1".to_string(),
            name: "nightly".to_string(),
            kind: "full".to_string(),
            size_bytes: 1024,
            created_at: Utc::now(),
            tags: vec![],
        });
        RecoveryService::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn plan_requires_an_existing_artifact() {
        let service = service_with_artifact();
        assert!(matches!(
            service
                .plan_recovery("missing", &RecoveryOptions::default())
                .await
                .unwrap_err(),
            CoreError::NotFound { .. }
        ));

        let plan = service
            .plan_recovery("bk-1", &RecoveryOptions::default())
            .await
            .unwrap();
        assert_eq!(plan.backup_id, "bk-1");
        assert!(!plan.steps.is_empty());
    }

    #[tokio::test]
    async fn execute_returns_a_trackable_job() {
        let service = service_with_artifact();
        let job_id = service
            .execute_recovery("bk-1", &RecoveryOptions::default())
            .await
            .unwrap();
        let job = service.recovery_status(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
