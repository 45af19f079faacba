//! Recurrence triggers for backup schedules.
//!
//! Schedules describe when they fire with an explicit `Trigger` value rather
//! than a cron expression string. Each variant maps to a fixed period, and
//! `next_fire` computes the first occurrence strictly after a reference
//! instant, so re-arming a timer after a fire never reschedules the same
//! occurrence twice.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// When a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire every `minutes` minutes, measured from the previous fire.
    Every {
        /// Interval in minutes (at least 1).
        minutes: u32,
    },
    /// Fire once per hour at the given minute.
    Hourly {
        /// Minute of the hour (0-59).
        minute: u32,
    },
    /// Fire once per day at the given time of day (UTC).
    Daily {
        /// Hour of the day (0-23).
        hour: u32,
        /// Minute of the hour (0-59).
        minute: u32,
    },
    /// Fire once per week on the given weekday and time of day (UTC).
    Weekly {
        /// Day of the week.
        weekday: Weekday,
        /// Hour of the day (0-23).
        hour: u32,
        /// Minute of the hour (0-59).
        minute: u32,
    },
}

impl Trigger {
    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTrigger` when a field is out of range.
    pub fn validate(&self) -> CoreResult<()> {
        match *self {
            Self::Every { minutes } => {
                if minutes == 0 {
                    return Err(CoreError::invalid_trigger("interval must be at least 1 minute"));
                }
            }
            Self::Hourly { minute } => check_minute(minute)?,
            Self::Daily { hour, minute } | Self::Weekly { hour, minute, .. } => {
                check_hour(hour)?;
                check_minute(minute)?;
            }
        }
        Ok(())
    }

    /// Returns the nominal period between two consecutive fires.
    #[must_use]
    pub fn period(&self) -> Duration {
        match *self {
            Self::Every { minutes } => Duration::minutes(i64::from(minutes)),
            Self::Hourly { .. } => Duration::hours(1),
            Self::Daily { .. } => Duration::days(1),
            Self::Weekly { .. } => Duration::weeks(1),
        }
    }

    /// Computes the first occurrence strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTrigger` when the trigger fields are out of
    /// range (the same condition `validate` rejects).
    pub fn next_fire(&self, after: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        self.validate()?;

        let next = match *self {
            Self::Every { minutes } => after + Duration::minutes(i64::from(minutes)),
            Self::Hourly { minute } => {
                let mut candidate = at_time(after, after.hour(), minute)?;
                while candidate <= after {
                    candidate += Duration::hours(1);
                }
                candidate
            }
            Self::Daily { hour, minute } => {
                let mut candidate = at_time(after, hour, minute)?;
                if candidate <= after {
                    candidate += Duration::days(1);
                }
                candidate
            }
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let mut candidate = at_time(after, hour, minute)?;
                let ahead = i64::from(
                    (weekday.num_days_from_monday() + 7
                        - candidate.weekday().num_days_from_monday())
                        % 7,
                );
                candidate += Duration::days(ahead);
                if candidate <= after {
                    candidate += Duration::weeks(1);
                }
                candidate
            }
        };

        Ok(next)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Every { minutes } => write!(f, "every {minutes}m"),
            Self::Hourly { minute } => write!(f, "hourly at :{minute:02}"),
            Self::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "weekly on {weekday} at {hour:02}:{minute:02}"),
        }
    }
}

fn check_minute(minute: u32) -> CoreResult<()> {
    if minute > 59 {
        return Err(CoreError::invalid_trigger(format!(
            "minute {minute} out of range 0-59"
        )));
    }
    Ok(())
}

fn check_hour(hour: u32) -> CoreResult<()> {
    if hour > 23 {
        return Err(CoreError::invalid_trigger(format!(
            "hour {hour} out of range 0-23"
        )));
    }
    Ok(())
}

/// Same calendar day as `reference`, at `hour:minute:00` UTC.
fn at_time(reference: DateTime<Utc>, hour: u32, minute: u32) -> CoreResult<DateTime<Utc>> {
    reference
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            CoreError::invalid_trigger(format!("time {hour:02}:{minute:02} is not representable"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn daily_fires_later_today_when_time_not_passed() {
        let trigger = Trigger::Daily { hour: 22, minute: 30 };
        let now = at(2025, 3, 10, 9, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 10, 22, 30, 0));
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_time_passed() {
        let trigger = Trigger::Daily { hour: 3, minute: 0 };
        let now = at(2025, 3, 10, 9, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 11, 3, 0, 0));
    }

    #[test]
    fn daily_is_strictly_after_exact_boundary() {
        let trigger = Trigger::Daily { hour: 3, minute: 0 };
        let now = at(2025, 3, 10, 3, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 11, 3, 0, 0));
    }

    #[test]
    fn hourly_picks_next_hour_when_minute_passed() {
        let trigger = Trigger::Hourly { minute: 15 };
        let now = at(2025, 3, 10, 9, 40, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 10, 10, 15, 0));
    }

    #[test]
    fn hourly_stays_in_hour_when_minute_ahead() {
        let trigger = Trigger::Hourly { minute: 45 };
        let now = at(2025, 3, 10, 9, 40, 12);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 10, 9, 45, 0));
    }

    #[test]
    fn weekly_advances_to_requested_weekday() {
        // 2025-03-10 is a Monday.
        let trigger = Trigger::Weekly {
            weekday: Weekday::Thu,
            hour: 1,
            minute: 0,
        };
        let now = at(2025, 3, 10, 12, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 13, 1, 0, 0));
    }

    #[test]
    fn weekly_rolls_a_full_week_when_already_passed_today() {
        let trigger = Trigger::Weekly {
            weekday: Weekday::Mon,
            hour: 1,
            minute: 0,
        };
        let now = at(2025, 3, 10, 12, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 17, 1, 0, 0));
    }

    #[test]
    fn every_adds_interval_from_reference() {
        let trigger = Trigger::Every { minutes: 90 };
        let now = at(2025, 3, 10, 12, 0, 0);
        assert_eq!(trigger.next_fire(now).unwrap(), at(2025, 3, 10, 13, 30, 0));
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert!(Trigger::Hourly { minute: 60 }.validate().is_err());
        assert!(Trigger::Daily { hour: 24, minute: 0 }.validate().is_err());
        assert!(Trigger::Every { minutes: 0 }.validate().is_err());
        assert!(Trigger::Daily { hour: 23, minute: 59 }.validate().is_ok());
    }

    #[test]
    fn trigger_serde_round_trip() {
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            hour: 4,
            minute: 30,
        };
        let json = serde_json::to_string(&trigger).unwrap();
        let back: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(trigger, back);
    }
}
