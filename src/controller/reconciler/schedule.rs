//! # Scheduling
//!
//! Decides whether an invocation should start a backup.
//!
//! Status writes generate watch events of their own, so every invocation first
//! checks whether a backup is actually due:
//!
//! 1. the spec changed (generation differs from `observedGeneration`)
//! 2. a manual trigger annotation was set that has not been handled yet
//! 3. `nextBackupTime` has been reached
//!
//! Otherwise the invocation requeues for the remaining time.

use crate::constants::BACKUP_NOW_ANNOTATION;
use crate::controller::reconciler::types::TriggerSource;
use crate::crd::PostgresBackup;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Timer events may fire slightly early
const SCHEDULE_TOLERANCE_SECS: i64 = 2;

/// Outcome of [`evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Run a backup now
    Due(TriggerSource),
    /// Nothing to do until `wait` has passed
    NotDue { wait: Duration },
}

/// Value of the manual trigger annotation, if set
#[must_use]
pub fn manual_trigger(backup: &PostgresBackup) -> Option<&str> {
    backup
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(BACKUP_NOW_ANNOTATION))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Decide whether a backup is due at `now`
#[must_use]
pub fn evaluate(backup: &PostgresBackup, now: DateTime<Utc>) -> ScheduleDecision {
    let status = backup.status.as_ref();

    let observed_generation = status.and_then(|s| s.observed_generation);
    if observed_generation.is_none() || observed_generation != backup.metadata.generation {
        return ScheduleDecision::Due(TriggerSource::SpecChange);
    }

    if let Some(trigger) = manual_trigger(backup) {
        if status.and_then(|s| s.handled_trigger.as_deref()) != Some(trigger) {
            return ScheduleDecision::Due(TriggerSource::ManualCli);
        }
    }

    let next_backup = status
        .and_then(|s| s.next_backup_time.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    match next_backup {
        Some(next) if now < next - chrono::Duration::seconds(SCHEDULE_TOLERANCE_SECS) => {
            ScheduleDecision::NotDue {
                wait: (next - now).to_std().unwrap_or_default(),
            }
        }
        // Due, or no usable schedule recorded
        _ => ScheduleDecision::Due(TriggerSource::TimerBased),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PostgresBackupSpec, PostgresBackupStatus, SecretKeyRef};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn backup(generation: i64, status: Option<PostgresBackupStatus>) -> PostgresBackup {
        let secret = SecretKeyRef {
            name: "s".to_string(),
            key: "k".to_string(),
        };
        let mut backup = PostgresBackup::new(
            "nightly",
            PostgresBackupSpec {
                host: "db.internal".to_string(),
                port: 5432,
                user: "app".to_string(),
                db_name: "appdb".to_string(),
                container_name: "backups".to_string(),
                storage_account: "acct1".to_string(),
                postgres_secret: secret.clone(),
                azure_secret: secret,
            },
        );
        backup.metadata.generation = Some(generation);
        backup.status = status;
        backup
    }

    fn completed(next_backup_time: &str) -> PostgresBackupStatus {
        PostgresBackupStatus {
            observed_generation: Some(1),
            next_backup_time: Some(next_backup_time.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_resource_is_due() {
        assert_eq!(
            evaluate(&backup(1, None), now()),
            ScheduleDecision::Due(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_spec_edit_is_due() {
        let backup = backup(2, Some(completed("2026-10-19T12:00:00Z")));
        assert_eq!(
            evaluate(&backup, now()),
            ScheduleDecision::Due(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_status_only_change_waits_for_schedule() {
        let backup = backup(1, Some(completed("2026-10-19T12:00:00Z")));
        assert_eq!(
            evaluate(&backup, now()),
            ScheduleDecision::NotDue {
                wait: Duration::from_secs(24 * 60 * 60)
            }
        );
    }

    #[test]
    fn test_schedule_reached_is_due() {
        let backup = backup(1, Some(completed("2026-10-18T12:00:01Z")));
        assert_eq!(
            evaluate(&backup, now()),
            ScheduleDecision::Due(TriggerSource::TimerBased)
        );
    }

    #[test]
    fn test_unparseable_schedule_is_due() {
        let backup = backup(1, Some(completed("tomorrow")));
        assert_eq!(
            evaluate(&backup, now()),
            ScheduleDecision::Due(TriggerSource::TimerBased)
        );
    }

    #[test]
    fn test_manual_trigger_is_due_once() {
        let mut backup = backup(1, Some(completed("2026-10-19T12:00:00Z")));
        backup.metadata.annotations = Some(BTreeMap::from([(
            BACKUP_NOW_ANNOTATION.to_string(),
            "2026-10-18T11:59:00Z".to_string(),
        )]));
        assert_eq!(
            evaluate(&backup, now()),
            ScheduleDecision::Due(TriggerSource::ManualCli)
        );

        if let Some(status) = backup.status.as_mut() {
            status.handled_trigger = Some("2026-10-18T11:59:00Z".to_string());
        }
        assert!(matches!(
            evaluate(&backup, now()),
            ScheduleDecision::NotDue { .. }
        ));
    }
}
