use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CheckId;

/// Outcome of a single health sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Degraded but operational.
    Warning,
    /// Check failed.
    Fail,
}

/// Overall system health, derived from sub-check outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All checks passed.
    Healthy,
    /// At least one warning, no failures.
    Warning,
    /// At least one failed check.
    Critical,
}

impl HealthStatus {
    /// Worst-of rule: any `Fail` → `Critical`, else any `Warning` →
    /// `Warning`, else `Healthy`.
    #[must_use]
    pub fn derive(checks: &[CheckStatus]) -> Self {
        if checks.contains(&CheckStatus::Fail) {
            Self::Critical
        } else if checks.contains(&CheckStatus::Warning) {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// One named sub-check with a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Outcome.
    pub status: CheckStatus,
    /// What was observed.
    pub message: String,
}

impl CheckResult {
    /// Convenience constructor for a passing check.
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    /// Convenience constructor for a warning check.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            message: message.into(),
        }
    }

    /// Convenience constructor for a failed check.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }
}

/// Aggregate counters computed alongside a health check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Artifacts known to the gateway.
    pub total_backups: u64,
    /// Artifacts that passed integrity validation.
    pub healthy_backups: u64,
    /// Artifacts that failed integrity validation.
    pub corrupted_backups: u64,
    /// Enabled schedules past their expected next run.
    pub missed_schedules: u64,
    /// Average duration of recently completed runs, in seconds.
    pub avg_run_secs: f64,
    /// Bytes consumed by backup storage.
    pub disk_used_bytes: u64,
    /// Bytes still available on backup storage.
    pub disk_available_bytes: u64,
}

/// A point-in-time snapshot of backup-system wellness.
///
/// Never mutated after creation; appended to a bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHealthCheck {
    /// Stable snapshot identifier.
    pub id: CheckId,
    /// When the evaluation ran.
    pub timestamp: DateTime<Utc>,
    /// Derived overall status.
    pub status: HealthStatus,
    /// Was an artifact produced recently enough.
    pub recent_backups: CheckResult,
    /// Do the most recent artifacts validate.
    pub backup_integrity: CheckResult,
    /// Is backup storage above the free-space threshold.
    pub disk_space: CheckResult,
    /// Are enabled schedules firing on time.
    pub schedule_health: CheckResult,
    /// Are run durations within the configured bound.
    pub performance: CheckResult,
    /// Aggregate counters.
    pub summary: HealthSummary,
}

impl BackupHealthCheck {
    /// Assembles a snapshot, deriving the overall status from the five
    /// sub-checks.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: DateTime<Utc>,
        recent_backups: CheckResult,
        backup_integrity: CheckResult,
        disk_space: CheckResult,
        schedule_health: CheckResult,
        performance: CheckResult,
        summary: HealthSummary,
    ) -> Self {
        let status = HealthStatus::derive(&[
            recent_backups.status,
            backup_integrity.status,
            disk_space.status,
            schedule_health.status,
            performance.status,
        ]);
        Self {
            id: CheckId::new(),
            timestamp,
            status,
            recent_backups,
            backup_integrity,
            disk_space,
            schedule_health,
            performance,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_worst_of() {
        use CheckStatus::{Fail, Pass, Warning};
        assert_eq!(HealthStatus::derive(&[Pass, Pass, Pass]), HealthStatus::Healthy);
        assert_eq!(
            HealthStatus::derive(&[Pass, Warning, Pass]),
            HealthStatus::Warning
        );
        assert_eq!(
            HealthStatus::derive(&[Warning, Pass, Fail]),
            HealthStatus::Critical
        );
        assert_eq!(HealthStatus::derive(&[Fail, Fail, Fail]), HealthStatus::Critical);
    }

    #[test]
    fn single_fail_makes_snapshot_critical() {
        let check = BackupHealthCheck::new(
            Utc::now(),
            CheckResult::pass("recent backup present"),
            CheckResult::fail("artifact bk-3 failed validation"),
            CheckResult::pass("disk ok"),
            CheckResult::pass("schedules on time"),
            CheckResult::pass("durations nominal"),
            HealthSummary::default(),
        );
        assert_eq!(check.status, HealthStatus::Critical);
    }

    #[test]
    fn warnings_without_failures_are_warning() {
        let check = BackupHealthCheck::new(
            Utc::now(),
            CheckResult::pass("ok"),
            CheckResult::pass("ok"),
            CheckResult::warning("disk below 2x threshold"),
            CheckResult::pass("ok"),
            CheckResult::warning("slow runs"),
            HealthSummary::default(),
        );
        assert_eq!(check.status, HealthStatus::Warning);
    }
}
