use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::ids::AlertId;

/// Condition class an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Backups are failing or none were produced in the required window.
    BackupFailed,
    /// One or more recent artifacts failed integrity validation.
    BackupCorrupted,
    /// An enabled schedule missed its expected run.
    ScheduleMissed,
    /// Available backup storage is below the configured threshold.
    DiskSpaceLow,
    /// Run durations exceed the configured maximum.
    PerformanceDegraded,
}

impl AlertKind {
    /// Canonical snake_case string used in logs and metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BackupFailed => "backup_failed",
            Self::BackupCorrupted => "backup_corrupted",
            Self::ScheduleMissed => "schedule_missed",
            Self::DiskSpaceLow => "disk_space_low",
            Self::PerformanceDegraded => "performance_degraded",
        }
    }
}

/// How urgently an alert needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational.
    Low,
    /// Should be looked at soon.
    Medium,
    /// Needs prompt attention.
    High,
    /// Backups are at risk right now.
    Critical,
}

/// An actionable, explicitly-resolvable problem notice.
///
/// Resolved alerts are immutable apart from the resolution timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupAlert {
    /// Stable alert identifier.
    pub id: AlertId,
    /// Condition class.
    pub kind: AlertKind,
    /// Urgency.
    pub severity: AlertSeverity,
    /// Short headline.
    pub title: String,
    /// Full description of the detected condition.
    pub message: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Whether an operator resolved the alert.
    pub resolved: bool,
    /// When the alert was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Structured context (measured values, thresholds, scope).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BackupAlert {
    /// Creates an unresolved alert stamped with the current time.
    #[must_use]
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
            metadata,
        }
    }

    /// Deduplication scope, stored under the `"scope"` metadata key.
    ///
    /// While an unresolved alert with the same `(kind, scope)` pair exists,
    /// the monitor suppresses duplicates for the same ongoing condition.
    #[must_use]
    pub fn scope(&self) -> &str {
        self.metadata
            .get("scope")
            .and_then(Value::as_str)
            .unwrap_or("system")
    }

    /// Marks the alert resolved.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` when already resolved.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.resolved {
            return Err(CoreError::invalid_state(format!(
                "alert {} is already resolved",
                self.id
            )));
        }
        self.resolved = true;
        self.resolved_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_ordering_matches_urgency() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }

    #[test]
    fn resolve_sets_flag_and_timestamp_once() {
        let mut alert = BackupAlert::new(
            AlertKind::DiskSpaceLow,
            AlertSeverity::High,
            "Low disk space",
            "5 GiB available, threshold 10 GiB",
            Map::new(),
        );
        alert.resolve(Utc::now()).unwrap();
        assert!(alert.resolved);
        assert!(alert.resolved_at.is_some());
        assert!(alert.resolve(Utc::now()).is_err());
    }

    #[test]
    fn scope_defaults_to_system() {
        let alert = BackupAlert::new(
            AlertKind::BackupFailed,
            AlertSeverity::Critical,
            "t",
            "m",
            Map::new(),
        );
        assert_eq!(alert.scope(), "system");

        let mut metadata = Map::new();
        metadata.insert("scope".to_string(), json!("disk"));
        let alert = BackupAlert::new(
            AlertKind::DiskSpaceLow,
            AlertSeverity::High,
            "t",
            "m",
            metadata,
        );
        assert_eq!(alert.scope(), "disk");
    }
}
