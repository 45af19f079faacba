use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::ScheduleId;
use crate::trigger::Trigger;

/// What a backup job captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    /// Schema and data.
    Full,
    /// Schema only.
    Schema,
    /// Data only.
    Data,
}

impl Default for BackupFormat {
    fn default() -> Self {
        Self::Full
    }
}

impl BackupFormat {
    /// Returns the canonical lowercase string used in artifact metadata.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Schema => "schema",
            Self::Data => "data",
        }
    }
}

/// Backup job parameters embedded in a schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJobConfig {
    /// What the backup captures.
    #[serde(default)]
    pub format: BackupFormat,
    /// Tables to include; empty means all tables.
    #[serde(default)]
    pub include_tables: Vec<String>,
    /// Tables to exclude.
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    /// Whether the artifact is compressed.
    #[serde(default)]
    pub compress: bool,
}

/// A recurring backup policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Stable schedule identifier.
    pub id: ScheduleId,
    /// Human-readable name; also the basis for artifact names.
    pub name: String,
    /// When the schedule fires.
    pub trigger: Trigger,
    /// Backup job parameters.
    pub backup: BackupJobConfig,
    /// Disabled schedules are never auto-fired.
    pub enabled: bool,
    /// Artifacts older than this many days are deleted after a successful run.
    pub retention_days: u32,
    /// Recipients notified on a successful run.
    #[serde(default)]
    pub notify_on_success: Vec<String>,
    /// Recipients notified on a failed run.
    #[serde(default)]
    pub notify_on_failure: Vec<String>,
    /// Free-form operator tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
    /// Update timestamp in UTC.
    pub updated_at: DateTime<Utc>,
}

impl ScheduleConfig {
    /// Validates the schedule definition.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name, a zero retention window,
    /// or a trigger that cannot produce a next fire time.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("schedule name must not be empty".into()));
        }
        if self.retention_days == 0 {
            return Err(CoreError::Validation(
                "retention_days must be at least 1".into(),
            ));
        }
        self.trigger.validate()?;
        // A valid trigger always resolves to a concrete next fire.
        self.trigger.next_fire(Utc::now())?;
        Ok(())
    }

    /// Artifact tag marking backups produced by this schedule.
    #[must_use]
    pub fn artifact_tag(&self) -> String {
        format!("schedule:{}", self.id)
    }

    /// Lowercase slug of the schedule name used in generated backup names.
    #[must_use]
    pub fn name_slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for ch in self.name.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        slug.trim_matches('-').to_string()
    }
}

/// Partial update applied to an existing schedule.
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    /// New name.
    pub name: Option<String>,
    /// New trigger; re-validated before it is applied.
    pub trigger: Option<Trigger>,
    /// New backup job parameters.
    pub backup: Option<BackupJobConfig>,
    /// New enablement state.
    pub enabled: Option<bool>,
    /// New artifact retention window.
    pub retention_days: Option<u32>,
    /// New success recipient list.
    pub notify_on_success: Option<Vec<String>>,
    /// New failure recipient list.
    pub notify_on_failure: Option<Vec<String>>,
    /// New tag list.
    pub tags: Option<Vec<String>>,
}

impl ScheduleUpdate {
    /// True when the update changes how or whether the schedule fires.
    #[must_use]
    pub fn affects_arming(&self) -> bool {
        self.trigger.is_some() || self.enabled.is_some()
    }

    /// Merges the update into `schedule`, bumping `updated_at`.
    pub fn apply_to(self, schedule: &mut ScheduleConfig) {
        if let Some(name) = self.name {
            schedule.name = name;
        }
        if let Some(trigger) = self.trigger {
            schedule.trigger = trigger;
        }
        if let Some(backup) = self.backup {
            schedule.backup = backup;
        }
        if let Some(enabled) = self.enabled {
            schedule.enabled = enabled;
        }
        if let Some(retention_days) = self.retention_days {
            schedule.retention_days = retention_days;
        }
        if let Some(recipients) = self.notify_on_success {
            schedule.notify_on_success = recipients;
        }
        if let Some(recipients) = self.notify_on_failure {
            schedule.notify_on_failure = recipients;
        }
        if let Some(tags) = self.tags {
            schedule.tags = tags;
        }
        schedule.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScheduleConfig {
        ScheduleConfig {
            id: ScheduleId::new(),
            name: "Nightly Orders".to_string(),
            trigger: Trigger::Daily { hour: 2, minute: 0 },
            backup: BackupJobConfig::default(),
            enabled: true,
            retention_days: 7,
            notify_on_success: vec![],
            notify_on_failure: vec!["ops@example.com".to_string()],
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_schedule() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_name_and_zero_retention() {
        let mut schedule = sample();
        schedule.name = "  ".to_string();
        assert!(schedule.validate().is_err());

        let mut schedule = sample();
        schedule.retention_days = 0;
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_trigger() {
        let mut schedule = sample();
        schedule.trigger = Trigger::Daily { hour: 99, minute: 0 };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn name_slug_collapses_non_alphanumerics() {
        let mut schedule = sample();
        schedule.name = "Nightly  Orders / EU".to_string();
        assert_eq!(schedule.name_slug(), "nightly-orders-eu");
    }

    #[test]
    fn update_merges_only_set_fields() {
        let mut schedule = sample();
        let before = schedule.updated_at;
        let update = ScheduleUpdate {
            enabled: Some(false),
            retention_days: Some(30),
            ..ScheduleUpdate::default()
        };
        assert!(update.affects_arming());
        update.apply_to(&mut schedule);
        assert!(!schedule.enabled);
        assert_eq!(schedule.retention_days, 30);
        assert_eq!(schedule.name, "Nightly Orders");
        assert!(schedule.updated_at >= before);
    }
}
