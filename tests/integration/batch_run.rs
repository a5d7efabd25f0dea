//! End-to-end scheduler runs against scripted collaborators.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use historian::activity::{ActivityType, ItemStatus};
use historian::scheduler::{BatchScheduler, FixedCooldown, RunConfig};
use historian::state::{Lifecycle, RunStateHandle};
use historian::RunError;
use tokio::time::Instant;

use crate::support::{mixed_plan, run_config, spec, FixedPlan, RecordingCooldown, ScriptedClient};

struct Harness {
    client: Arc<ScriptedClient>,
    cooldown: Arc<RecordingCooldown>,
    state: RunStateHandle,
    scheduler: BatchScheduler,
}

fn harness(client: ScriptedClient, plan: FixedPlan) -> Harness {
    let state = RunStateHandle::new();
    let client = Arc::new(client.observing(state.clone()));
    let cooldown = Arc::new(RecordingCooldown::new(state.clone()));
    let scheduler = BatchScheduler::new(client.clone(), Arc::new(plan))
        .with_state(state.clone())
        .with_cooldown(cooldown.clone());
    Harness {
        client,
        cooldown,
        state,
        scheduler,
    }
}

fn lines_with_prefix(state: &RunStateHandle, prefix: &str) -> usize {
    state.read(|s| s.logs.lines().filter(|l| l.starts_with(prefix)).count())
}

#[tokio::test]
async fn test_mixed_plan_runs_in_two_chunks_with_one_cooldown() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));

    let summary = h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    assert_eq!(h.client.creates(), 5);
    assert_eq!(h.client.merges(), 2);
    // One pause, taken only after all three specs of the first chunk finished.
    assert_eq!(h.cooldown.pauses(), vec![(0, 3)]);

    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Complete);
    assert_eq!(state.progress, 100.0);
    assert_eq!(state.completed, 5);
    assert_eq!(state.total, 5);
    assert_eq!(state.items.len(), 5);
    assert_eq!(state.stats.issues, 2);
    assert_eq!(state.stats.prs, 2);
    assert_eq!(state.stats.commits, 1);
    assert_eq!(state.logs.last(), Some("ALL OPERATIONS COMPLETED."));

    let merged: Vec<_> = state
        .items
        .iter()
        .filter(|i| i.status == ItemStatus::Merged)
        .map(|i| i.title.as_str())
        .collect();
    assert_eq!(merged.len(), 2);
    assert!(merged.contains(&"B") && merged.contains(&"D"));

    assert_eq!(summary.requested, 5);
    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.created, 5);
    assert_eq!(summary.merged, 2);
    assert_eq!(summary.stats, state.stats);
}

#[tokio::test]
async fn test_cooldown_separates_chunk_logs() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));
    h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    let logs = h.state.snapshot().logs.to_vec();
    let position = |needle: &str| logs.iter().position(|l| l == needle).unwrap();
    let cooldown = position("Cooling down (Rate Limit Protection)...");

    assert!(position("Creating Issue: A...") < cooldown);
    assert!(position("Creating PR: B...") < cooldown);
    assert!(position("Pushing Commit: C...") < cooldown);
    assert!(position("Creating PR: D...") > cooldown);
    assert!(position("Creating Issue: E...") > cooldown);

    let created_before = logs[..cooldown]
        .iter()
        .filter(|l| l.starts_with("SUCCESS: Created"))
        .count();
    assert_eq!(created_before, 3);
    // Three creates plus the dependent merge of B.
    let calls_before = logs[..cooldown]
        .iter()
        .filter(|l| {
            l.starts_with("Creating") || l.starts_with("Pushing") || l.starts_with("Auto-Merging")
        })
        .count();
    assert_eq!(calls_before, 4);
    let pauses = logs.iter().filter(|l| l.starts_with("Cooling down")).count();
    assert_eq!(pauses, 1);
}

#[tokio::test]
async fn test_items_are_newest_first_and_match_stats() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));
    h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    let state = h.state.snapshot();
    // The second chunk finished after the first, so its items lead.
    let leading: Vec<_> = state.items[..2].iter().map(|i| i.title.as_str()).collect();
    assert!(leading.contains(&"D") && leading.contains(&"E"));

    let count = |kind: ActivityType| state.items.iter().filter(|i| i.kind == kind).count() as u32;
    assert_eq!(count(ActivityType::Issue), state.stats.issues);
    assert_eq!(count(ActivityType::PullRequest), state.stats.prs);
    assert_eq!(count(ActivityType::Commit), state.stats.commits);
}

#[tokio::test]
async fn test_missing_token_never_starts() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));
    let config = RunConfig {
        token: String::new(),
        ..run_config(2, 2, 1)
    };

    let err = h.scheduler.start(&config).await.unwrap_err();

    assert!(matches!(err, RunError::CredentialMissing));
    assert_eq!(h.client.verify_calls.load(Ordering::SeqCst), 0);
    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Idle);
    assert_eq!(state.logs.len(), 2);
    assert!(state.logs.last().unwrap().starts_with("ERROR:"));
}

#[tokio::test]
async fn test_blank_token_is_treated_as_missing() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));
    let config = RunConfig {
        token: "   ".to_string(),
        ..run_config(1, 0, 0)
    };

    let err = h.scheduler.start(&config).await.unwrap_err();
    assert!(matches!(err, RunError::CredentialMissing));
    assert_eq!(h.state.read(|s| s.lifecycle), Lifecycle::Idle);
}

#[tokio::test]
async fn test_zero_counts_are_rejected() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));

    let err = h.scheduler.start(&run_config(0, 0, 0)).await.unwrap_err();

    assert!(matches!(err, RunError::NothingRequested));
    assert_eq!(h.client.verify_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.state.read(|s| s.lifecycle), Lifecycle::Idle);
    assert_eq!(lines_with_prefix(&h.state, "ERROR:"), 1);
}

#[tokio::test]
async fn test_authentication_failure_returns_to_idle() {
    let h = harness(
        ScriptedClient::new().rejecting_credentials("401 Bad credentials"),
        FixedPlan::of(mixed_plan()),
    );

    let err = h.scheduler.start(&run_config(2, 2, 1)).await.unwrap_err();

    assert!(matches!(err, RunError::AuthenticationFailure(_)));
    assert_eq!(
        *h.client.lifecycle_at_verify.lock().unwrap(),
        Some(Lifecycle::Running)
    );
    assert_eq!(h.client.creates(), 0);
    assert!(h.cooldown.pauses().is_empty());

    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Idle);
    assert!(state.items.is_empty());
    let critical: Vec<_> = state
        .logs
        .lines()
        .filter(|l| l.starts_with("CRITICAL FAILURE"))
        .collect();
    assert_eq!(critical.len(), 1);
    assert!(critical[0].contains("401 Bad credentials"));
}

#[tokio::test]
async fn test_plan_failure_is_a_setup_failure() {
    let h = harness(ScriptedClient::new(), FixedPlan::failing("quota exceeded"));

    let err = h.scheduler.start(&run_config(1, 1, 1)).await.unwrap_err();

    match err {
        RunError::UnexpectedSetupFailure(msg) => assert!(msg.contains("quota exceeded")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.client.creates(), 0);
    assert_eq!(h.state.read(|s| s.lifecycle), Lifecycle::Idle);
    assert_eq!(lines_with_prefix(&h.state, "CRITICAL FAILURE"), 1);
}

#[tokio::test]
async fn test_empty_plan_is_a_setup_failure() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(Vec::new()));

    let err = h.scheduler.start(&run_config(1, 0, 0)).await.unwrap_err();

    assert!(matches!(err, RunError::UnexpectedSetupFailure(_)));
    assert_eq!(h.state.read(|s| s.lifecycle), Lifecycle::Idle);
}

#[tokio::test]
async fn test_item_failure_is_isolated() {
    let h = harness(ScriptedClient::new().failing("C"), FixedPlan::of(mixed_plan()));

    let summary = h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 4);
    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Complete);
    assert_eq!(state.completed, 5);
    assert_eq!(state.items.len(), 4);
    assert_eq!(state.stats.commits, 0);
    assert!(state
        .logs
        .lines()
        .any(|l| l == "ERROR: Failed to create C - 422 Validation Failed"));
    // Siblings in the same chunk were unaffected.
    assert!(state.items.iter().any(|i| i.title == "A"));
    assert!(state.items.iter().any(|i| i.title == "B"));
}

#[tokio::test]
async fn test_merge_failure_keeps_pull_request_created() {
    let h = harness(
        ScriptedClient::new().failing_merges(),
        FixedPlan::of(mixed_plan()),
    );

    let summary = h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    assert_eq!(h.client.merges(), 2);
    assert_eq!(summary.merge_failures, 2);
    assert_eq!(summary.merged, 0);
    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Complete);
    assert_eq!(state.stats.prs, 2);
    assert!(state
        .items
        .iter()
        .filter(|i| i.kind == ActivityType::PullRequest)
        .all(|i| i.status == ItemStatus::Created));
    assert_eq!(lines_with_prefix(&h.state, "WARNING: Failed to auto-merge"), 2);
}

#[tokio::test]
async fn test_auto_merge_disabled_skips_merges() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));
    let config = RunConfig {
        auto_merge: false,
        ..run_config(2, 2, 1)
    };

    h.scheduler.start(&config).await.unwrap();

    assert_eq!(h.client.merges(), 0);
    assert!(h
        .state
        .read(|s| s.items.iter().all(|i| i.status == ItemStatus::Created)));
}

#[tokio::test]
async fn test_unsupported_types_are_skipped_but_counted() {
    let plan = vec![
        spec(ActivityType::Discussion, "RFC"),
        spec(ActivityType::Issue, "Bug"),
    ];
    let h = harness(ScriptedClient::new(), FixedPlan::of(plan));

    let summary = h.scheduler.start(&run_config(2, 0, 0)).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(h.client.creates(), 1);
    let state = h.state.snapshot();
    assert_eq!(state.completed, 2);
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.stats.discussions, 0);
    assert_eq!(lines_with_prefix(&h.state, "WARNING: Skipping unsupported"), 1);
}

#[tokio::test]
async fn test_short_plan_still_completes_at_full_progress() {
    let plan = vec![spec(ActivityType::Issue, "A"), spec(ActivityType::Commit, "B")];
    let h = harness(ScriptedClient::new(), FixedPlan::of(plan));

    h.scheduler.start(&run_config(3, 1, 1)).await.unwrap();

    let state = h.state.snapshot();
    assert_eq!(state.total, 5);
    assert_eq!(state.completed, 2);
    assert_eq!(state.lifecycle, Lifecycle::Complete);
    assert_eq!(state.progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_bounds_concurrency() {
    let plan: Vec<_> = (0..7)
        .map(|i| spec(ActivityType::Issue, &format!("issue {}", i)))
        .collect();
    let h = harness(
        ScriptedClient::new().with_latency(Duration::from_millis(100)),
        FixedPlan::of(plan),
    );

    h.scheduler.start(&run_config(7, 0, 0)).await.unwrap();

    assert_eq!(h.client.max_in_flight.load(Ordering::SeqCst), 3);
    assert_eq!(h.cooldown.pauses(), vec![(0, 3), (1, 6)]);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_size_one_is_sequential() {
    let plan: Vec<_> = (0..4)
        .map(|i| spec(ActivityType::Commit, &format!("commit {}", i)))
        .collect();
    let h = harness(
        ScriptedClient::new().with_latency(Duration::from_millis(50)),
        FixedPlan::of(plan),
    );
    let config = RunConfig {
        chunk_size: 1,
        ..run_config(0, 0, 4)
    };

    h.scheduler.start(&config).await.unwrap();

    assert_eq!(h.client.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.cooldown.pauses().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_cooldown_waits_between_chunks() {
    let plan: Vec<_> = (0..7)
        .map(|i| spec(ActivityType::Issue, &format!("issue {}", i)))
        .collect();
    let client = Arc::new(ScriptedClient::new());
    let scheduler = BatchScheduler::new(client, Arc::new(FixedPlan::of(plan)))
        .with_cooldown(Arc::new(FixedCooldown));
    let config = RunConfig {
        cooldown: Duration::from_millis(2000),
        ..run_config(7, 0, 0)
    };

    let started = Instant::now();
    scheduler.start(&config).await.unwrap();
    let elapsed = started.elapsed();

    // Three chunks, two pauses.
    assert!(elapsed >= Duration::from_millis(4000), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(6000), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_observers_see_monotonic_progress() {
    let plan: Vec<_> = (0..6)
        .map(|i| spec(ActivityType::Issue, &format!("issue {}", i)))
        .collect();
    let h = harness(
        ScriptedClient::new().with_latency(Duration::from_millis(10)),
        FixedPlan::of(plan),
    );
    let mut rx = h.scheduler.state().subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            seen.push(state.progress);
            if state.lifecycle == Lifecycle::Complete {
                break;
            }
        }
        seen
    });

    h.scheduler.start(&run_config(6, 0, 0)).await.unwrap();
    let seen = watcher.await.unwrap();

    assert!(!seen.is_empty());
    assert!(
        seen.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        seen
    );
    assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(seen.last(), Some(&100.0));
}

#[tokio::test]
async fn test_progress_samples_are_bounded() {
    let plan: Vec<_> = (0..25)
        .map(|i| spec(ActivityType::Commit, &format!("commit {}", i)))
        .collect();
    let h = harness(ScriptedClient::new(), FixedPlan::of(plan));
    let config = RunConfig {
        chunk_size: 4,
        ..run_config(0, 0, 25)
    };

    h.scheduler.start(&config).await.unwrap();

    let state = h.state.snapshot();
    assert_eq!(state.progress_samples.len(), 20);
    assert_eq!(state.progress_samples.back().map(|s| s.completed), Some(25));
    assert_eq!(h.cooldown.pauses().len(), 6);
}

#[tokio::test]
async fn test_cancel_stops_at_next_chunk_boundary() {
    let state = RunStateHandle::new();
    let client = Arc::new(ScriptedClient::new());
    let scheduler = BatchScheduler::new(client.clone(), Arc::new(FixedPlan::of(mixed_plan())))
        .with_state(state.clone());
    let cooldown =
        Arc::new(RecordingCooldown::new(state.clone()).cancelling(scheduler.cancel_handle()));
    let scheduler = scheduler.with_cooldown(cooldown.clone());

    let err = scheduler.start(&run_config(2, 2, 1)).await.unwrap_err();

    assert!(matches!(err, RunError::Cancelled));
    assert_eq!(client.creates(), 3);
    let snapshot = state.snapshot();
    assert_eq!(snapshot.lifecycle, Lifecycle::Idle);
    // Partial results are kept.
    assert_eq!(snapshot.items.len(), 3);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.logs.last(), Some("Run cancelled."));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_while_running_is_rejected() {
    let plan: Vec<_> = (0..3)
        .map(|i| spec(ActivityType::Issue, &format!("issue {}", i)))
        .collect();
    let client = Arc::new(ScriptedClient::new().with_latency(Duration::from_secs(1)));
    let scheduler = Arc::new(BatchScheduler::new(client, Arc::new(FixedPlan::of(plan))));
    let mut rx = scheduler.state().subscribe();

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start(&run_config(3, 0, 0)).await })
    };
    rx.wait_for(|s| s.is_running()).await.unwrap();

    let err = scheduler.start(&run_config(3, 0, 0)).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunning));

    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.created, 3);
    assert_eq!(scheduler.state().read(|s| s.lifecycle), Lifecycle::Complete);
}

#[tokio::test]
async fn test_restart_after_completion_resets_counters_but_keeps_logs() {
    let h = harness(ScriptedClient::new(), FixedPlan::of(mixed_plan()));

    h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();
    h.scheduler.start(&run_config(2, 2, 1)).await.unwrap();

    let state = h.state.snapshot();
    assert_eq!(state.lifecycle, Lifecycle::Complete);
    assert_eq!(state.items.len(), 5);
    assert_eq!(state.stats.issues, 2);
    assert_eq!(state.completed, 5);
    assert_eq!(lines_with_prefix(&h.state, "ALL OPERATIONS COMPLETED."), 2);
    assert_eq!(h.client.creates(), 10);
}
