use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MetricsId;

/// One periodic numeric sample of backup-system behavior.
///
/// Appended every monitoring cycle and pruned after the metrics retention
/// window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetrics {
    /// Stable sample identifier.
    pub id: MetricsId,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Artifacts known to the gateway.
    pub total_backups: u64,
    /// Completed runs in retained history.
    pub successful_runs: u64,
    /// Failed runs in retained history.
    pub failed_runs: u64,
    /// Average artifact size in bytes.
    pub avg_backup_bytes: f64,
    /// Average completed-run duration in seconds.
    pub avg_run_secs: f64,
    /// Bytes consumed by backup storage.
    pub disk_used_bytes: u64,
    /// Fraction of stored bytes produced by compressed jobs (0.0-1.0).
    pub compression_ratio: f64,
    /// Fraction of fired runs that completed (0.0-1.0).
    pub schedule_compliance: f64,
    /// Composite 0-100 score; see `performance_score`.
    pub performance_score: f64,
}

impl BackupMetrics {
    /// Composite score: start from 100, subtract penalties for run failures
    /// and for average durations above the configured bound.
    #[must_use]
    pub fn performance_score(
        successful_runs: u64,
        failed_runs: u64,
        avg_run_secs: f64,
        max_backup_secs: u64,
    ) -> f64 {
        let total = successful_runs + failed_runs;
        let failure_rate = if total == 0 {
            0.0
        } else {
            failed_runs as f64 / total as f64
        };
        let overtime = if max_backup_secs == 0 || avg_run_secs <= max_backup_secs as f64 {
            0.0
        } else {
            ((avg_run_secs / max_backup_secs as f64) - 1.0).min(1.0)
        };
        (100.0 - failure_rate * 50.0 - overtime * 30.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_history_scores_100() {
        assert_eq!(BackupMetrics::performance_score(10, 0, 60.0, 1800), 100.0);
    }

    #[test]
    fn failures_and_overtime_reduce_score() {
        let with_failures = BackupMetrics::performance_score(5, 5, 60.0, 1800);
        assert_eq!(with_failures, 75.0);

        let slow = BackupMetrics::performance_score(10, 0, 3600.0, 1800);
        assert_eq!(slow, 70.0);
    }

    #[test]
    fn empty_history_is_not_penalized() {
        assert_eq!(BackupMetrics::performance_score(0, 0, 0.0, 1800), 100.0);
    }
}
