// End-to-end scenarios: real executor, real store, real broker, and a live
// local HTTP fixture for outbound steps.

use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use futures::StreamExt;
use serde_json::json;
use stepline_contracts::{EventType, RunStatus, StepKind, StepStatus, WorkflowStepInput};
use stepline_engine::EngineService;
use stepline_storage::Database;

fn step(name: &str, kind: StepKind, config: serde_json::Value, position: i64) -> WorkflowStepInput {
    WorkflowStepInput {
        id: None,
        name: name.to_string(),
        kind,
        config,
        position,
    }
}

fn delay(name: &str, seconds: f64, position: i64) -> WorkflowStepInput {
    step(name, StepKind::Delay, json!({ "seconds": seconds }), position)
}

fn manual(name: &str, position: i64) -> WorkflowStepInput {
    step(name, StepKind::Manual, json!({}), position)
}

fn http(name: &str, url: &str, position: i64) -> WorkflowStepInput {
    step(name, StepKind::Http, json!({ "url": url }), position)
}

async fn service() -> EngineService {
    EngineService::new(Database::in_memory().await.unwrap())
}

/// Local server standing in for the outside world: /ok answers 200,
/// /fail answers 500.
async fn spawn_http_fixture() -> String {
    let app = Router::new()
        .route("/ok", get(|| async { StatusCode::OK }))
        .route("/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn await_terminal(service: &EngineService, run_id: &str) -> stepline_contracts::RunSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = service.run(run_id).await.unwrap().unwrap();
            if snapshot.run.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not reach a terminal status in time")
}

/// Poll until the run suspends at a manual gate (the awaiting event exists).
async fn await_manual_gate(service: &EngineService, run_id: &str) -> stepline_contracts::RunSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = service.run(run_id).await.unwrap().unwrap();
            if snapshot
                .events
                .iter()
                .any(|e| e.message.contains("awaiting completion"))
            {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run did not reach the manual gate in time")
}

fn event_types(snapshot: &stepline_contracts::RunSnapshot) -> Vec<EventType> {
    snapshot.events.iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn happy_all_automated_run_succeeds() {
    let base = spawn_http_fixture().await;
    let service = service().await;

    let workflow = service
        .create_workflow(
            "all-automated",
            None,
            vec![delay("pause", 0.0, 0), http("ping", &format!("{base}/ok"), 1)],
        )
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let snapshot = await_terminal(&service, &run.id).await;

    assert_eq!(snapshot.run.status, RunStatus::Succeeded);
    assert!(snapshot.run.started_at.is_some());
    assert!(snapshot.run.finished_at.is_some());
    assert!(snapshot
        .step_runs
        .iter()
        .all(|sr| sr.status == StepStatus::Succeeded));

    assert_eq!(
        event_types(&snapshot),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::RunSucceeded,
        ]
    );
}

#[tokio::test]
async fn http_failure_fails_the_run_with_status_in_message() {
    let base = spawn_http_fixture().await;
    let service = service().await;

    let workflow = service
        .create_workflow(
            "http-failure",
            None,
            vec![http("flaky", &format!("{base}/fail"), 0)],
        )
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let snapshot = await_terminal(&service, &run.id).await;

    assert_eq!(snapshot.run.status, RunStatus::Failed);
    assert_eq!(
        event_types(&snapshot),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepFailed,
            EventType::RunFailed,
        ]
    );

    let failed = snapshot
        .events
        .iter()
        .find(|e| e.event_type == EventType::StepFailed)
        .unwrap();
    assert!(failed.message.contains("500"), "message: {}", failed.message);
}

#[tokio::test]
async fn manual_pause_and_resume() {
    let service = service().await;

    let workflow = service
        .create_workflow(
            "manual-gate",
            None,
            vec![delay("before", 0.0, 0), manual("approve", 1), delay("after", 0.0, 2)],
        )
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let paused = await_manual_gate(&service, &run.id).await;

    assert_eq!(paused.run.status, RunStatus::Running);
    assert_eq!(
        event_types(&paused),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::StepStarted,
        ]
    );
    // The gate itself stays PENDING until a human acts.
    assert_eq!(paused.step_runs[1].status, StepStatus::Pending);

    service
        .complete_manual_step(&paused.step_runs[1].id, true)
        .await
        .unwrap();

    let finished = await_terminal(&service, &run.id).await;
    assert_eq!(finished.run.status, RunStatus::Succeeded);
    assert_eq!(
        event_types(&finished),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::RunSucceeded,
        ]
    );
}

#[tokio::test]
async fn manual_failure_fails_the_run_and_leaves_trailing_steps_pending() {
    let service = service().await;

    let workflow = service
        .create_workflow(
            "manual-reject",
            None,
            vec![delay("before", 0.0, 0), manual("approve", 1), delay("after", 0.0, 2)],
        )
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let paused = await_manual_gate(&service, &run.id).await;

    service
        .complete_manual_step(&paused.step_runs[1].id, false)
        .await
        .unwrap();

    let finished = await_terminal(&service, &run.id).await;
    assert_eq!(finished.run.status, RunStatus::Failed);
    assert_eq!(finished.step_runs[1].status, StepStatus::Failed);
    assert_eq!(finished.step_runs[2].status, StepStatus::Pending);

    assert_eq!(
        event_types(&finished),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::StepStarted,
            EventType::StepFailed,
            EventType::RunFailed,
        ]
    );
    let run_failed = finished.events.last().unwrap();
    assert_eq!(run_failed.message, "Run failed by manual step");
}

#[tokio::test]
async fn manual_completion_is_idempotent() {
    let service = service().await;

    let workflow = service
        .create_workflow("manual-idem", None, vec![manual("approve", 0)])
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let paused = await_manual_gate(&service, &run.id).await;
    let gate_id = paused.step_runs[0].id.clone();

    let first = service.complete_manual_step(&gate_id, true).await.unwrap();
    assert_eq!(first.status, StepStatus::Succeeded);

    let finished = await_terminal(&service, &run.id).await;
    let events_before = finished.events.len();

    // Second call returns the step run unchanged and appends nothing.
    let second = service.complete_manual_step(&gate_id, true).await.unwrap();
    assert_eq!(second.status, StepStatus::Succeeded);
    assert_eq!(second.finished_at, first.finished_at);

    let after = service.run(&run.id).await.unwrap().unwrap();
    assert_eq!(after.events.len(), events_before);

    // Flipping the flag after completion does not rewrite history either.
    let flipped = service.complete_manual_step(&gate_id, false).await.unwrap();
    assert_eq!(flipped.status, StepStatus::Succeeded);
}

#[tokio::test]
async fn empty_workflow_succeeds_with_run_events_only() {
    let service = service().await;

    let workflow = service
        .create_workflow("empty", None, vec![])
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let snapshot = await_terminal(&service, &run.id).await;

    assert_eq!(snapshot.run.status, RunStatus::Succeeded);
    assert!(snapshot.run.started_at.is_some());
    assert!(snapshot.run.finished_at.is_some());
    assert!(snapshot.step_runs.is_empty());
    assert_eq!(
        event_types(&snapshot),
        vec![EventType::RunStarted, EventType::RunSucceeded]
    );
}

#[tokio::test]
async fn enqueue_is_idempotent_while_a_pass_is_in_flight() {
    let service = service().await;

    let workflow = service
        .create_workflow("slow", None, vec![delay("nap", 0.5, 0)])
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    for _ in 0..5 {
        service.executor().enqueue(&run.id).await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.executor().active_count().await, 1);

    let snapshot = await_terminal(&service, &run.id).await;
    assert_eq!(snapshot.run.status, RunStatus::Succeeded);

    // One pass, one step: no duplicated progression in the journal.
    assert_eq!(
        event_types(&snapshot),
        vec![
            EventType::RunStarted,
            EventType::StepStarted,
            EventType::StepSucceeded,
            EventType::RunSucceeded,
        ]
    );
    assert_eq!(service.executor().active_count().await, 0);
}

#[tokio::test]
async fn subscription_delivers_snapshots_through_to_terminal() {
    let service = service().await;

    let workflow = service
        .create_workflow("observed", None, vec![manual("approve", 0)])
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let mut updates = service.run_updated(&run.id).await.unwrap();

    // Connecting yields the current state immediately.
    let first = tokio::time::timeout(Duration::from_secs(5), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.run.id, run.id);

    let paused = await_manual_gate(&service, &run.id).await;
    service
        .complete_manual_step(&paused.step_runs[0].id, true)
        .await
        .unwrap();

    // Every published signal produces a fresh snapshot; keep reading until
    // the terminal one shows up.
    let terminal = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = updates.next().await.unwrap();
            if snapshot.run.status.is_terminal() {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(terminal.run.status, RunStatus::Succeeded);
    assert_eq!(terminal.events.last().unwrap().event_type, EventType::RunSucceeded);
}

#[tokio::test]
async fn definition_edits_do_not_touch_live_runs() {
    let service = service().await;

    let workflow = service
        .create_workflow("editable", None, vec![manual("approve", 0)])
        .await
        .unwrap();
    let original_step_id = workflow.steps[0].id.clone();

    let run = service.start_run(&workflow.id).await.unwrap();
    let paused = await_manual_gate(&service, &run.id).await;
    assert_eq!(paused.step_runs[0].workflow_step_id, original_step_id);

    // Replace the step sequence while the run is suspended.
    service
        .update_workflow(
            &workflow.id,
            Some("editable v2".to_string()),
            None,
            vec![delay("brand new", 0.0, 0)],
        )
        .await
        .unwrap();

    // The step run still points at the snapshot of the step it was created
    // from, and completing it still works.
    let current = service.run(&run.id).await.unwrap().unwrap();
    assert_eq!(current.step_runs[0].workflow_step_id, original_step_id);

    service
        .complete_manual_step(&current.step_runs[0].id, true)
        .await
        .unwrap();
    let finished = await_terminal(&service, &run.id).await;
    assert!(finished.run.status.is_terminal());
}

#[tokio::test]
async fn delay_of_zero_advances_normally() {
    let service = service().await;

    let workflow = service
        .create_workflow("instant", None, vec![delay("noop", 0.0, 0)])
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let snapshot = await_terminal(&service, &run.id).await;

    assert_eq!(snapshot.run.status, RunStatus::Succeeded);
    assert_eq!(snapshot.step_runs[0].status, StepStatus::Succeeded);
}

#[tokio::test]
async fn malformed_http_config_fails_the_step_and_run() {
    let service = service().await;

    // HTTP step with no url: saved fine, fails at execution time.
    let workflow = service
        .create_workflow(
            "misconfigured",
            None,
            vec![step("broken", StepKind::Http, json!({}), 0)],
        )
        .await
        .unwrap();

    let run = service.start_run(&workflow.id).await.unwrap();
    let snapshot = await_terminal(&service, &run.id).await;

    assert_eq!(snapshot.run.status, RunStatus::Failed);
    let failed = snapshot
        .events
        .iter()
        .find(|e| e.event_type == EventType::StepFailed)
        .unwrap();
    assert!(failed.message.contains("url"), "message: {}", failed.message);
}
