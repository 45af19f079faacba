use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactMeta;
use crate::error::{CoreError, CoreResult};
use crate::ids::{RunId, ScheduleId};

/// Lifecycle state of one execution attempt.
///
/// Transitions are monotonic: `Pending → Running → {Completed, Failed}`,
/// or `Pending → Skipped`. A terminal state never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet started.
    Pending,
    /// Backup job in flight.
    Running,
    /// Artifact produced.
    Completed,
    /// Job failed or timed out; see the run's `error`.
    Failed,
    /// Deferred away under the `Skip` overflow policy.
    Skipped,
}

impl RunStatus {
    /// True for states that never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// One execution attempt of a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledBackupRun {
    /// Stable run identifier.
    pub id: RunId,
    /// Owning schedule.
    pub schedule_id: ScheduleId,
    /// When the fire was due (or requested, for forced runs).
    pub scheduled_at: DateTime<Utc>,
    /// Set when the run transitions to `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the run reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Gateway artifact identifier, once produced.
    pub backup_id: Option<String>,
    /// Human-readable failure description.
    pub error: Option<String>,
    /// Metadata of the produced artifact.
    pub artifact: Option<ArtifactMeta>,
}

impl ScheduledBackupRun {
    /// Creates a fresh `Pending` run for a schedule fire.
    #[must_use]
    pub fn pending(schedule_id: ScheduleId, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: RunId::new(),
            schedule_id,
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: RunStatus::Pending,
            backup_id: None,
            error: None,
            artifact: None,
        }
    }

    /// Wall-clock duration, available once the run started and finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Marks the run as started.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` unless the run is `Pending`.
    pub fn start(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_not_terminal()?;
        if self.status != RunStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "run {} cannot start from {:?}",
                self.id, self.status
            )));
        }
        self.status = RunStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// Marks the run as completed with the produced artifact.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` when the run is already terminal.
    pub fn complete(&mut self, now: DateTime<Utc>, artifact: ArtifactMeta) -> CoreResult<()> {
        self.ensure_not_terminal()?;
        self.status = RunStatus::Completed;
        self.completed_at = Some(now);
        self.backup_id = Some(artifact.id.clone());
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Marks the run as failed with a captured error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` when the run is already terminal.
    pub fn fail(&mut self, now: DateTime<Utc>, error: impl Into<String>) -> CoreResult<()> {
        self.ensure_not_terminal()?;
        self.status = RunStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(error.into());
        Ok(())
    }

    /// Marks a pending run as skipped (concurrency cap, `Skip` policy).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` unless the run is `Pending`.
    pub fn skip(&mut self, now: DateTime<Utc>, reason: impl Into<String>) -> CoreResult<()> {
        if self.status != RunStatus::Pending {
            return Err(CoreError::invalid_state(format!(
                "run {} cannot be skipped from {:?}",
                self.id, self.status
            )));
        }
        self.status = RunStatus::Skipped;
        self.completed_at = Some(now);
        self.error = Some(reason.into());
        Ok(())
    }

    fn ensure_not_terminal(&self) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::invalid_state(format!(
                "run {} already finished as {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}
