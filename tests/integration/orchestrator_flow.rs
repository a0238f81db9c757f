//! End-to-end orchestrator runs against a scripted job API, in virtual time.

use hub_audit::client::{
    ClientCall, JobStatusReport, PrimaryStatus, ScriptedJobClient, TriggerResponse,
};
use hub_audit::config::PollingConfig;
use hub_audit::error::{JobApiError, StageFailure};
use hub_audit::guard::PollGuard;
use hub_audit::report::{DependentPhase, Orchestrator, PrimaryPhase};
use hub_audit::types::{
    BundleResource, Hub, HubId, JobId, JobKind, JobStatus, Progress, Session,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::integration::{
    by_id, completed_everything, dependent, dependent_not_applicable, generation_required, hub,
    primary, quota,
};

const INTERVAL: Duration = Duration::from_secs(60);

fn orchestrator(client: &Arc<ScriptedJobClient>) -> Orchestrator {
    Orchestrator::new(client.clone(), Session::new("token"), PollingConfig::default())
}

fn is_quota_call(call: &ClientCall) -> bool {
    matches!(call, ClientCall::CheckQuota { .. })
}

#[tokio::test(start_paused = true)]
async fn triggered_generation_reports_optimistic_then_server_progress() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-1"))))
            .with_quota(Ok(quota(50, 100)))
            .with_trigger(Ok(TriggerResponse { new_session: None }))
            .with_primary_status_by_id(Ok(by_id(JobStatus::InProgress, 35)))
            .with_primary_status_by_id(Ok(by_id(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let orchestrator = Arc::new(orchestrator(&client));
    let mut rx = orchestrator.subscribe();
    let handle = Arc::clone(&orchestrator).spawn(hub("hub-1"));

    let mut seen: Vec<u8> = Vec::new();
    loop {
        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        let progress = state.primary.job.progress.value();
        if seen.last() != Some(&progress) {
            seen.push(progress);
        }
        if state.is_settled() {
            break;
        }
    }
    let state = handle.join().await.unwrap();

    assert!(seen.ends_with(&[2, 35, 100]), "progress sequence {:?}", seen);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(client.trigger_count(), 1);
    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.primary.job.id, Some(JobId::new("job-1")));
}

#[tokio::test(start_paused = true)]
async fn low_quota_blocks_generation_with_a_warning() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_quota(Ok(quota(5, 100))),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(client.trigger_count(), 0);
    assert_eq!(state.primary.phase, PrimaryPhase::Failed);
    assert!(matches!(
        state.primary.failure,
        Some(StageFailure::QuotaInsufficient(_))
    ));
    assert_eq!(
        state.warning.as_deref(),
        Some("Insufficient credits to generate a new report.")
    );
    assert_eq!(state.dependent.phase, DependentPhase::Idle);
    assert_eq!(client.count(|c| c.is_status_check(JobKind::Dependent)), 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_quota_blocks_generation() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_quota(Err(JobApiError::Transport("connection reset".to_string()))),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(client.trigger_count(), 0);
    assert_eq!(client.count(is_quota_call), 1);
    assert_eq!(state.primary.phase, PrimaryPhase::Failed);
    assert!(state.warning.is_some());
}

#[tokio::test(start_paused = true)]
async fn not_applicable_dependent_completes_without_fetching() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-1"))))
            .with_bundle(JobKind::Primary, json!({"rows": 3}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.dependent.phase, DependentPhase::Done);
    assert_eq!(state.dependent.job.status, JobStatus::NotApplicable);
    assert_eq!(state.dependent.job.progress, Progress::COMPLETE);
    assert!(state.dependent.bundle.as_ref().unwrap().is_placeholder());
    assert_eq!(client.fetch_count(JobKind::Dependent), 0);
    assert!(client.calls().contains(&ClientCall::CheckDependentStatus {
        primary_job: JobId::new("job-1"),
        session: "token".to_string(),
    }));
}

#[tokio::test(start_paused = true)]
async fn one_failed_resource_fails_the_primary_stage() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-1"))))
            .with_resource(BundleResource::PrimaryDetail, Ok(json!({"d": 1})))
            .with_resource(BundleResource::PrimaryGraph, Ok(json!({"g": 1})))
            .with_resource(
                BundleResource::PrimaryScores,
                Err(JobApiError::RequestFailed("HTTP 500".to_string())),
            ),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Failed);
    assert!(state.primary.bundle.is_none());
    match &state.primary.failure {
        Some(StageFailure::Aggregation(failure)) => {
            assert_eq!(failure.failed_resources(), vec![BundleResource::PrimaryScores]);
        }
        other => panic!("expected aggregation failure, got {:?}", other),
    }
    assert_eq!(state.dependent.phase, DependentPhase::Idle);
    assert_eq!(client.count(|c| c.is_status_check(JobKind::Dependent)), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_dependent_bundle_leaves_primary_done() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-1"))))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent(JobStatus::Completed, 100)))
            .with_resource(BundleResource::DependentDetail, Ok(json!({})))
            .with_resource(
                BundleResource::DependentGraph,
                Err(JobApiError::NotFound("graph".to_string())),
            ),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert!(state.primary.bundle.is_some());
    assert_eq!(state.dependent.phase, DependentPhase::Failed);
    assert!(state.dependent.bundle.is_none());
}

#[tokio::test(start_paused = true)]
async fn existing_pending_job_is_resumed_without_triggering() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-7"))))
            .with_primary_status_by_id(Ok(by_id(JobStatus::InProgress, 40)))
            .with_primary_status_by_id(Ok(by_id(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Dependent, json!({})),
    );
    let stale = hub("hub-1").with_primary_job(JobId::new("job-old"));
    let start = tokio::time::Instant::now();
    let state = orchestrator(&client).run(&stale).await;

    assert_eq!(client.trigger_count(), 0);
    assert_eq!(client.count(is_quota_call), 0);
    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.dependent.phase, DependentPhase::Done);
    assert_eq!(state.primary.job.id, Some(JobId::new("job-7")));

    // Polls run on the fixed interval, addressed by the server's job id.
    let polls: Vec<_> = client
        .timeline()
        .into_iter()
        .filter(|(_, call)| matches!(call, ClientCall::CheckPrimaryStatusById { .. }))
        .collect();
    assert_eq!(polls.len(), 2);
    assert_eq!(polls[0].0 - start, INTERVAL);
    assert_eq!(polls[1].0 - polls[0].0, INTERVAL);
    assert!(polls.iter().all(|(_, call)| matches!(
        call,
        ClientCall::CheckPrimaryStatusById { job_id, .. } if job_id == &JobId::new("job-7")
    )));
}

#[tokio::test(start_paused = true)]
async fn completed_report_is_fetched_immediately_without_polling() {
    let client = Arc::new(completed_everything());
    let orchestrator = Arc::new(orchestrator(&client));
    let mut rx = orchestrator.subscribe();
    let collector = tokio::spawn(async move {
        let mut phases = vec![rx.borrow_and_update().primary.phase];
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            phases.push(state.primary.phase);
            if state.is_settled() {
                break;
            }
        }
        phases
    });
    let start = tokio::time::Instant::now();
    let state = Arc::clone(&orchestrator)
        .spawn(hub("hub-1"))
        .join()
        .await
        .unwrap();
    let phases = collector.await.unwrap();

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert!(!phases.contains(&PrimaryPhase::Polling));
    assert_eq!(client.trigger_count(), 0);
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatusById { .. })),
        0
    );
    let primary_fetches: Vec<_> = client
        .timeline()
        .into_iter()
        .filter(|(_, call)| {
            matches!(call, ClientCall::FetchResource { resource, .. } if resource.kind() == JobKind::Primary)
        })
        .collect();
    assert!(!primary_fetches.is_empty());
    assert!(primary_fetches.iter().all(|(at, _)| *at == start));
}

#[tokio::test(start_paused = true)]
async fn previous_report_is_not_fetched_after_triggering() {
    let previous = || PrimaryStatus {
        generation_required: true,
        ..primary(JobStatus::Completed, 100, Some("old-job"))
    };
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(previous()))
            .with_primary_status(Ok(previous()))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("new-job"))))
            .with_quota(Ok(quota(50, 100)))
            .with_trigger(Ok(TriggerResponse { new_session: None }))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.primary.job.id, Some(JobId::new("new-job")));
    assert_eq!(client.trigger_count(), 1);
    let fetched: Vec<JobId> = client
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ClientCall::FetchResource { job_id, .. } => Some(job_id),
            _ => None,
        })
        .collect();
    assert!(!fetched.is_empty());
    assert!(fetched.iter().all(|id| id == &JobId::new("new-job")));
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatus { .. })),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn completed_status_without_job_id_is_polled_again() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, None)))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-2"))))
            .with_quota(Ok(quota(50, 100)))
            .with_trigger(Ok(TriggerResponse { new_session: None }))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.primary.job.id, Some(JobId::new("job-2")));
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatus { .. })),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn hub_job_references_fill_in_missing_ids() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::InProgress, 30, None)))
            .with_primary_status_by_id(Ok(by_id(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Dependent, json!({})),
    );
    let known = hub("hub-1")
        .with_primary_job(JobId::new("job-5"))
        .with_dependent_job(JobId::new("dep-5"));
    let state = orchestrator(&client).run(&known).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(state.dependent.phase, DependentPhase::Done);
    assert_eq!(client.trigger_count(), 0);
    assert!(client.calls().contains(&ClientCall::CheckPrimaryStatusById {
        job_id: JobId::new("job-5"),
        hub: HubId::parse("hub-1").unwrap(),
        session: "token".to_string(),
    }));
    assert_eq!(state.dependent.job.id, Some(JobId::new("dep-5")));
    assert!(client.calls().iter().any(|c| matches!(
        c,
        ClientCall::FetchResource { job_id, resource, .. }
            if resource.kind() == JobKind::Dependent && job_id == &JobId::new("dep-5")
    )));
}

#[tokio::test(start_paused = true)]
async fn stale_dependent_reference_is_dropped_with_its_primary() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-9"))))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Dependent, json!({})),
    );
    let stale = hub("hub-1")
        .with_primary_job(JobId::new("job-5"))
        .with_dependent_job(JobId::new("dep-5"));
    let state = orchestrator(&client).run(&stale).await;

    assert_eq!(state.dependent.phase, DependentPhase::Done);
    assert_eq!(state.dependent.job.id, Some(JobId::new("job-9")));
}

#[tokio::test(start_paused = true)]
async fn dependent_is_never_checked_before_primary_is_fetched() {
    let client = Arc::new(completed_everything());
    let state = orchestrator(&client).run(&hub("hub-1")).await;
    assert_eq!(state.dependent.phase, DependentPhase::Done);

    let calls = client.calls();
    let last_primary_fetch = calls
        .iter()
        .rposition(|c| {
            matches!(c, ClientCall::FetchResource { resource, .. } if resource.kind() == JobKind::Primary)
        })
        .unwrap();
    let first_dependent_check = calls
        .iter()
        .position(|c| c.is_status_check(JobKind::Dependent))
        .unwrap();
    assert!(last_primary_fetch < first_dependent_check);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried_next_tick() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::InProgress, 10, Some("job-1"))))
            .with_primary_status_by_id(Err(JobApiError::Transport("timeout".to_string())))
            .with_primary_status_by_id(Err(JobApiError::RateLimited("slow down".to_string())))
            .with_primary_status_by_id(Ok(by_id(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatusById { .. })),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn unrecognized_status_is_treated_as_pending() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-1"))))
            .with_primary_status_by_id(Ok(JobStatusReport {
                status: "recalibrating".into(),
                progress: Progress::new(20),
            }))
            .with_primary_status_by_id(Ok(by_id(JobStatus::Completed, 100)))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatusById { .. })),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn failed_trigger_rearms_and_retries_after_recheck() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-3"))))
            .with_quota(Ok(quota(40, 100)))
            .with_trigger(Err(JobApiError::RequestFailed("HTTP 502".to_string())))
            .with_trigger(Ok(TriggerResponse { new_session: None }))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let state = orchestrator(&client).run(&hub("hub-1")).await;

    assert_eq!(state.primary.phase, PrimaryPhase::Done);
    assert_eq!(client.trigger_count(), 2);
    assert_eq!(client.count(is_quota_call), 2);
}

#[tokio::test(start_paused = true)]
async fn generation_is_triggered_once_per_orchestrator() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-1"))))
            .with_primary_status(Ok(generation_required()))
            .with_primary_status(Ok(primary(JobStatus::Completed, 100, Some("job-2"))))
            .with_quota(Ok(quota(80, 100)))
            .with_trigger(Ok(TriggerResponse { new_session: None }))
            .with_bundle(JobKind::Primary, json!({}))
            .with_dependent_status(Ok(dependent_not_applicable())),
    );
    let orchestrator = orchestrator(&client);
    let first = orchestrator.run(&hub("hub-1")).await;
    let second = orchestrator.run(&hub("hub-1")).await;

    assert_eq!(first.primary.job.id, Some(JobId::new("job-1")));
    assert_eq!(second.primary.phase, PrimaryPhase::Done);
    assert_eq!(second.primary.job.id, Some(JobId::new("job-2")));
    assert_eq!(client.trigger_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_orchestrator_on_shared_guard_does_not_poll() {
    let guard = PollGuard::new();
    let pending = || {
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-1"))))
            .with_primary_status_by_id(Ok(by_id(JobStatus::InProgress, 10)))
    };
    let first_client = Arc::new(pending());
    let first = Arc::new(orchestrator(&first_client).with_guard(guard.clone()));
    let mut rx = first.subscribe();
    let handle = Arc::clone(&first).spawn(hub("hub-1"));
    rx.wait_for(|s| s.primary.phase == PrimaryPhase::Polling)
        .await
        .unwrap();

    let second_client = Arc::new(pending());
    let second = orchestrator(&second_client).with_guard(guard.clone());
    let state = second.run(&hub("hub-1")).await;

    assert!(matches!(
        state.primary.failure,
        Some(StageFailure::AlreadyPolling { kind: JobKind::Primary, .. })
    ));
    assert_eq!(
        second_client.count(|c| matches!(c, ClientCall::CheckPrimaryStatusById { .. })),
        0
    );
    let hub_id = HubId::parse("hub-1").unwrap();
    assert!(guard.is_active(&hub_id, JobKind::Primary));

    handle.abort_polls();
    let first_state = handle.join().await.unwrap();
    assert!(matches!(first_state.primary.failure, Some(StageFailure::Cancelled)));
    assert!(!guard.is_active(&hub_id, JobKind::Primary));
}

#[tokio::test(start_paused = true)]
async fn attempt_ceiling_ends_polling() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-1"))))
            .with_primary_status_by_id(Ok(by_id(JobStatus::InProgress, 10))),
    );
    let polling = PollingConfig {
        interval_secs: 60,
        max_attempts: Some(3),
    };
    let orchestrator = Orchestrator::new(client.clone(), Session::new("token"), polling);
    let state = orchestrator.run(&hub("hub-1")).await;

    assert!(matches!(
        state.primary.failure,
        Some(StageFailure::AttemptsExhausted { attempts: 3 })
    ));
    assert_eq!(
        client.count(|c| matches!(c, ClientCall::CheckPrimaryStatusById { .. })),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_orchestrator_issues_no_polls() {
    let client = Arc::new(
        ScriptedJobClient::new()
            .with_primary_status(Ok(primary(JobStatus::Pending, 0, Some("job-1")))),
    );
    let orchestrator = orchestrator(&client);
    orchestrator.cancel();
    let state = orchestrator.run(&hub("hub-1")).await;

    assert!(matches!(state.primary.failure, Some(StageFailure::Cancelled)));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_hub_makes_no_calls() {
    let client = Arc::new(completed_everything());
    let state = orchestrator(&client)
        .run(&Hub::new(HubId::unassigned()))
        .await;

    assert!(matches!(state.primary.failure, Some(StageFailure::MissingHub)));
    assert!(client.calls().is_empty());
}
