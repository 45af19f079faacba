//! Integration tests for the scheduler: execution, the concurrency cap,
//! retention cleanup, notifications, and restart reconciliation.

use std::sync::Arc;
use std::time::Duration;

use arca_core::{
    ArtifactMeta, CoreError, OverflowPolicy, RunId, RunStatus, ScheduleId, ScheduleUpdate,
    ScheduledBackupRun, SchedulerConfig, Trigger,
};
use arca_engine::{
    BackupGateway, JobOutcome, MemoryBackupGateway, NewSchedule, RecordingNotifier, Scheduler,
};
use arca_store::{MemoryScheduleStore, ScheduleStore};
use chrono::Utc;

struct Harness {
    scheduler: Scheduler,
    store: Arc<MemoryScheduleStore>,
    gateway: MemoryBackupGateway,
    notifier: Arc<RecordingNotifier>,
}

fn harness(config: SchedulerConfig) -> Harness {
    let store = Arc::new(MemoryScheduleStore::new());
    let gateway = MemoryBackupGateway::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let scheduler = Scheduler::new(
        config,
        store.clone(),
        Arc::new(gateway.clone()),
        notifier.clone(),
    );
    Harness {
        scheduler,
        store,
        gateway,
        notifier,
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_jobs: 2,
        overflow: OverflowPolicy::Queue,
        poll_interval_secs: 1,
        job_timeout_secs: 3600,
        run_retention_days: 30,
    }
}

async fn wait_for_terminal(scheduler: &Scheduler, run_id: RunId) -> ScheduledBackupRun {
    for _ in 0..500 {
        if let Some(run) = scheduler
            .run_history(100)
            .into_iter()
            .find(|r| r.id == run_id)
        {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal state");
}

#[tokio::test]
async fn disabled_schedule_is_rejected_without_force_and_creates_no_run() {
    let h = harness(fast_config());
    let mut new = NewSchedule::new("nightly", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let err = h.scheduler.execute_schedule(id, false).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
    assert!(h.scheduler.run_history(10).is_empty());
    assert!(h.store.load_runs().await.unwrap().is_empty());
    assert!(!h.scheduler.is_armed(id));
}

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let h = harness(fast_config());
    let missing = ScheduleId::new();
    assert!(matches!(
        h.scheduler.execute_schedule(missing, true).await.unwrap_err(),
        CoreError::NotFound { .. }
    ));
    assert!(matches!(
        h.scheduler.delete_schedule(missing).await.unwrap_err(),
        CoreError::NotFound { .. }
    ));
}

#[tokio::test]
async fn forced_run_completes_and_attaches_artifact() {
    let h = harness(fast_config());
    let mut new = NewSchedule::new("nightly orders", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    new.notify_on_success = vec!["ops@example.com".to_string()];
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let run_id = h.scheduler.execute_schedule(id, true).await.unwrap();
    let run = wait_for_terminal(&h.scheduler, run_id).await;

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.started_at.is_some());
    assert!(run.duration().is_some());
    let artifact = run.artifact.expect("completed run carries artifact");
    assert!(artifact.name.starts_with("nightly-orders-"));
    assert!(artifact.has_tag(&format!("schedule:{id}")));

    // Outcome was persisted and the success recipient notified.
    let persisted = h.store.load_runs().await.unwrap();
    assert_eq!(persisted[0].status, RunStatus::Completed);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.starts_with("Backup completed"));
}

#[tokio::test]
async fn failed_job_marks_run_failed_and_notifies_failure_recipients() {
    let h = harness(fast_config());
    h.gateway.set_outcome(JobOutcome::Fail {
        error: "disk full".to_string(),
    });

    let mut new = NewSchedule::new("nightly", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    new.notify_on_failure = vec!["oncall@example.com".to_string()];
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let run_id = h.scheduler.execute_schedule(id, true).await.unwrap();
    let run = wait_for_terminal(&h.scheduler, run_id).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("disk full"));
    assert!(run.artifact.is_none());
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.starts_with("Backup failed"));
}

#[tokio::test(start_paused = true)]
async fn job_exceeding_deadline_fails_with_timeout() {
    let mut config = fast_config();
    config.job_timeout_secs = 3;
    let h = harness(config);
    h.gateway.set_polls_until_done(u32::MAX);

    let mut new = NewSchedule::new("slow", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let run_id = h.scheduler.execute_schedule(id, true).await.unwrap();
    let run = wait_for_terminal(&h.scheduler, run_id).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn skip_policy_skips_fire_past_the_cap() {
    let mut config = fast_config();
    config.max_concurrent_jobs = 1;
    config.overflow = OverflowPolicy::Skip;
    let h = harness(config);
    // First job stays in flight while the second fire arrives.
    h.gateway.set_polls_until_done(u32::MAX);

    let mut new = NewSchedule::new("capped", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let first = h.scheduler.execute_schedule(id, true).await.unwrap();
    // Give the first execution time to take the only permit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.scheduler.execute_schedule(id, true).await.unwrap();

    let skipped = wait_for_terminal(&h.scheduler, second).await;
    assert_eq!(skipped.status, RunStatus::Skipped);
    assert!(skipped.error.as_deref().unwrap().contains("concurrency cap"));

    // The first run is still holding the permit, not skipped.
    let first_run = h
        .scheduler
        .run_history(10)
        .into_iter()
        .find(|r| r.id == first)
        .unwrap();
    assert_ne!(first_run.status, RunStatus::Skipped);
}

#[tokio::test]
async fn queue_policy_runs_both_fires_to_completion() {
    let mut config = fast_config();
    config.max_concurrent_jobs = 1;
    config.overflow = OverflowPolicy::Queue;
    let h = harness(config);

    let mut new = NewSchedule::new("queued", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    let id = h.scheduler.create_schedule(new).await.unwrap();

    let first = h.scheduler.execute_schedule(id, true).await.unwrap();
    let second = h.scheduler.execute_schedule(id, true).await.unwrap();

    assert_eq!(wait_for_terminal(&h.scheduler, first).await.status, RunStatus::Completed);
    assert_eq!(wait_for_terminal(&h.scheduler, second).await.status, RunStatus::Completed);
}

#[tokio::test]
async fn retention_cleanup_deletes_only_expired_tagged_artifacts() {
    let h = harness(fast_config());

    let mut new = NewSchedule::new("retained", Trigger::Daily { hour: 2, minute: 0 });
    new.enabled = false;
    new.retention_days = 7;
    let id = h.scheduler.create_schedule(new).await.unwrap();
    let tag = format!("schedule:{id}");

    // Ten prior artifacts, an hour short of 1..=10 days old, so the 7-day
    // one sits inside the retention window rather than on the cutoff.
    for age in 1..=10u32 {
        h.gateway.seed_artifact(ArtifactMeta {
            id: format!("old-{age}"),
            name: format!("retained-{age}"),
            kind: "full".to_string(),
            size_bytes: 100,
            created_at: Utc::now() - chrono::Duration::days(i64::from(age))
                + chrono::Duration::hours(1),
            tags: vec![tag.clone()],
        });
    }
    // An expired artifact from some other producer must be untouched.
    h.gateway.seed_artifact(ArtifactMeta {
        id: "foreign".to_string(),
        name: "other".to_string(),
        kind: "full".to_string(),
        size_bytes: 100,
        created_at: Utc::now() - chrono::Duration::days(30),
        tags: vec![],
    });

    let run_id = h.scheduler.execute_schedule(id, true).await.unwrap();
    wait_for_terminal(&h.scheduler, run_id).await;
    // Cleanup runs after completion; give it a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut deleted = h.gateway.deleted_ids();
    deleted.sort();
    assert_eq!(deleted, vec!["old-10", "old-8", "old-9"]);

    let remaining = h.gateway.list_backups().await.unwrap();
    let tagged: Vec<_> = remaining.iter().filter(|a| a.has_tag(&tag)).collect();
    // 7 seeded survivors plus the artifact the run just produced.
    assert_eq!(tagged.len(), 8);
    assert!(remaining.iter().any(|a| a.id == "foreign"));
}

#[tokio::test]
async fn schedules_rearm_from_persisted_state_after_restart() {
    let store = Arc::new(MemoryScheduleStore::new());
    let gateway = MemoryBackupGateway::new();
    let notifier = Arc::new(RecordingNotifier::new());

    let id = {
        let scheduler = Scheduler::new(
            fast_config(),
            store.clone(),
            Arc::new(gateway.clone()),
            notifier.clone(),
        );
        scheduler
            .create_schedule(NewSchedule::new(
                "survivor",
                Trigger::Daily { hour: 2, minute: 0 },
            ))
            .await
            .unwrap()
        // Scheduler dropped: the process "restarts".
    };

    // Leave a run that was mid-flight when the process died.
    let mut orphan = ScheduledBackupRun::pending(id, Utc::now());
    orphan.start(Utc::now()).unwrap();
    store.save_runs(&[orphan.clone()]).await.unwrap();

    let scheduler = Scheduler::new(
        fast_config(),
        store.clone(),
        Arc::new(gateway),
        notifier,
    );
    scheduler.start().await.unwrap();

    assert!(scheduler.is_armed(id));
    let schedule = scheduler.get_schedule(id).unwrap();
    assert_eq!(schedule.name, "survivor");

    let runs = store.load_runs().await.unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.as_deref().unwrap().contains("restart"));
    scheduler.shutdown();
}

#[tokio::test]
async fn disabling_and_deleting_cancel_the_timer() {
    let h = harness(fast_config());
    let id = h
        .scheduler
        .create_schedule(NewSchedule::new(
            "armed",
            Trigger::Daily { hour: 23, minute: 59 },
        ))
        .await
        .unwrap();
    assert!(h.scheduler.is_armed(id));

    let update = ScheduleUpdate {
        enabled: Some(false),
        ..ScheduleUpdate::default()
    };
    h.scheduler.update_schedule(id, update).await.unwrap();
    assert!(!h.scheduler.is_armed(id));

    let update = ScheduleUpdate {
        enabled: Some(true),
        ..ScheduleUpdate::default()
    };
    h.scheduler.update_schedule(id, update).await.unwrap();
    assert!(h.scheduler.is_armed(id));

    h.scheduler.delete_schedule(id).await.unwrap();
    assert!(!h.scheduler.is_armed(id));
    assert!(h.store.load_schedules().await.unwrap().is_empty());
}

#[tokio::test]
async fn rapid_rearms_keep_the_current_timer_tracked() {
    let h = harness(fast_config());
    let id = h
        .scheduler
        .create_schedule(NewSchedule::new(
            "rearmed",
            Trigger::Daily { hour: 23, minute: 50 },
        ))
        .await
        .unwrap();

    // Each trigger change disarms and re-arms; superseded timer tasks must
    // not evict the replacement from the timer map as they wind down.
    for minute in 51..=59u32 {
        let update = ScheduleUpdate {
            trigger: Some(Trigger::Daily { hour: 23, minute }),
            ..ScheduleUpdate::default()
        };
        h.scheduler.update_schedule(id, update).await.unwrap();
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(h.scheduler.is_armed(id));

    h.scheduler.shutdown();
    assert!(!h.scheduler.is_armed(id));
}

#[tokio::test]
async fn invalid_update_leaves_schedule_untouched() {
    let h = harness(fast_config());
    let id = h
        .scheduler
        .create_schedule(NewSchedule::new(
            "stable",
            Trigger::Daily { hour: 4, minute: 30 },
        ))
        .await
        .unwrap();

    let update = ScheduleUpdate {
        trigger: Some(Trigger::Daily { hour: 99, minute: 0 }),
        ..ScheduleUpdate::default()
    };
    assert!(h.scheduler.update_schedule(id, update).await.is_err());

    let schedule = h.scheduler.get_schedule(id).unwrap();
    assert_eq!(schedule.trigger, Trigger::Daily { hour: 4, minute: 30 });
}

#[tokio::test(start_paused = true)]
async fn due_fire_produces_exactly_one_run_per_period() {
    let h = harness(fast_config());
    let id = h
        .scheduler
        .create_schedule(NewSchedule::new("minutely", Trigger::Every { minutes: 1 }))
        .await
        .unwrap();
    assert!(h.scheduler.is_armed(id));

    // One period elapses; the next fire is still 45s away.
    tokio::time::sleep(Duration::from_secs(75)).await;

    let runs = h.scheduler.run_history(10);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].schedule_id, id);

    let run = wait_for_terminal(&h.scheduler, runs[0].id).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(h.scheduler.run_history(10).len(), 1);
    h.scheduler.shutdown();
}

#[tokio::test]
async fn no_fire_happens_before_the_due_time() {
    let h = harness(fast_config());
    // Next fire is at least tonight; nothing should run in the next 200ms.
    let id = h
        .scheduler
        .create_schedule(NewSchedule::new(
            "patient",
            Trigger::Daily { hour: 23, minute: 59 },
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.scheduler.run_history(10).is_empty());
    assert!(h.scheduler.is_armed(id));
    h.scheduler.shutdown();
    assert!(!h.scheduler.is_armed(id));
}
