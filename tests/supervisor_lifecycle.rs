// tests/supervisor_lifecycle.rs

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use common::*;
use rulewarden::errors::RulewardenError;
use rulewarden::exec::CommandOutput;
use rulewarden::types::ProcessState;

type Calls = Arc<Mutex<Vec<(&'static str, i32, ProcessState)>>>;

/// Register a callback that records its name, the exit code and the state
/// visible while it runs.
fn record(supervisor: &rulewarden::supervisor::Supervisor, name: &'static str, calls: &Calls) {
    let calls = Arc::clone(calls);
    let state = supervisor.subscribe_state();
    supervisor.on_exit(move |event| {
        calls.lock().unwrap().push((name, event.code, *state.borrow()));
    });
}

#[tokio::test]
async fn double_start_spawns_once() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.state(), ProcessState::Ready);

    supervisor.start().await.unwrap();
    assert_eq!(supervisor.state(), ProcessState::Ready);
    assert_eq!(spawner.spawn_count(), 1);
    assert_eq!(spawner.completed().len(), 1, "pre-flight runs once");
}

#[tokio::test]
async fn start_runs_preflight_then_engine() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);

    supervisor.start().await.unwrap();

    let preflight = &spawner.completed()[0];
    assert_eq!(preflight.program, "engine");
    assert_eq!(preflight.cwd, PathBuf::from("/opt/engine"));
    assert_eq!(
        preflight.args,
        vec!["index-create", "--config", "/opt/engine/config.yaml"]
    );

    let engine = &spawner.spawned()[0];
    assert_eq!(engine.cwd, PathBuf::from("/opt/engine"));
    assert_eq!(engine.args, vec!["run", "--config", "/opt/engine/config.yaml"]);

    let child = spawner.child(0).await;
    assert_eq!(supervisor.pid(), Some(child.pid()));
}

#[tokio::test]
async fn abandoned_start_leaves_supervisor_startable() {
    init_tracing();
    let (spawner, gate) = FakeSpawner::new().hold_preflight();
    let supervisor = supervisor(&spawner);

    // Poll start() once, so it is parked on the pre-flight, then drop it.
    tokio::select! {
        biased;
        _ = supervisor.start() => panic!("start finished while the pre-flight was held"),
        _ = std::future::ready(()) => {}
    }
    assert_eq!(supervisor.state(), ProcessState::Idle);
    assert_eq!(supervisor.pid(), None);

    drop(gate);
    with_timeout(supervisor.start()).await.unwrap();

    assert_eq!(supervisor.state(), ProcessState::Ready);
    assert_eq!(spawner.spawn_count(), 1);
}

#[tokio::test]
async fn stop_without_engine_is_a_noop() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);

    supervisor.stop();
    supervisor.stop();

    assert_eq!(supervisor.state(), ProcessState::Idle);
    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn graceful_stop_returns_to_idle() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "logger", &calls);

    supervisor.start().await.unwrap();
    let child = spawner.child(0).await;

    supervisor.stop();
    assert_eq!(supervisor.state(), ProcessState::Closing);
    // Already closing: no second interrupt.
    supervisor.stop();

    let state = with_timeout(supervisor.wait_settled()).await;
    assert_eq!(state, ProcessState::Idle);
    assert_eq!(child.interrupts(), 1);
    assert!(!child.was_killed());
    assert_eq!(supervisor.pid(), None);
    assert_eq!(*calls.lock().unwrap(), vec![("logger", 0, ProcessState::Idle)]);
}

#[tokio::test]
async fn callbacks_run_in_order_after_state_update() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "first", &calls);
    record(&supervisor, "second", &calls);
    record(&supervisor, "third", &calls);

    supervisor.start().await.unwrap();
    spawner.child(0).await.exit(0);

    assert_eq!(with_timeout(supervisor.wait_settled()).await, ProcessState::Idle);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            ("first", 0, ProcessState::Idle),
            ("second", 0, ProcessState::Idle),
            ("third", 0, ProcessState::Idle),
        ]
    );
}

#[tokio::test]
async fn unexpected_exit_is_an_error_until_reset() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "cb", &calls);

    supervisor.start().await.unwrap();
    spawner.child(0).await.exit(3);

    assert_eq!(with_timeout(supervisor.wait_settled()).await, ProcessState::Error);
    assert_eq!(*calls.lock().unwrap(), vec![("cb", 3, ProcessState::Error)]);

    // Error is not Idle: start is refused until the failure is acknowledged.
    supervisor.start().await.unwrap();
    assert_eq!(spawner.spawn_count(), 1);

    assert!(supervisor.reset());
    assert!(!supervisor.reset());
    assert_eq!(supervisor.state(), ProcessState::Idle);

    supervisor.start().await.unwrap();
    assert_eq!(spawner.spawn_count(), 2);
    assert_eq!(supervisor.state(), ProcessState::Ready);
}

#[tokio::test]
async fn callbacks_persist_across_restarts() {
    init_tracing();
    let spawner = FakeSpawner::new()
        .with_script(ChildScript::exits_with(0))
        .with_script(ChildScript::exits_with(0));
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "cb", &calls);

    for _ in 0..2 {
        supervisor.start().await.unwrap();
        assert_eq!(with_timeout(supervisor.wait_settled()).await, ProcessState::Idle);
    }

    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(spawner.spawn_count(), 2);
}

#[tokio::test]
async fn spawn_failure_sets_error_without_callbacks() {
    init_tracing();
    let spawner = FakeSpawner::new().failing_spawns("No such file or directory");
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "cb", &calls);

    let err = supervisor.start().await.unwrap_err();

    assert!(matches!(err, RulewardenError::SpawnError { ref program, .. } if program == "engine"));
    assert_eq!(supervisor.state(), ProcessState::Error);
    assert_eq!(supervisor.pid(), None);
    assert!(calls.lock().unwrap().is_empty());

    // Nothing to stop.
    supervisor.stop();
    assert_eq!(supervisor.state(), ProcessState::Error);
}

#[tokio::test]
async fn failing_preflight_does_not_block_start() {
    init_tracing();
    let spawner = FakeSpawner::new().with_preflight(CommandOutput {
        code: 1,
        stdout: String::new(),
        stderr: "index already exists".to_string(),
    });
    let supervisor = supervisor(&spawner);

    supervisor.start().await.unwrap();

    assert_eq!(supervisor.state(), ProcessState::Ready);
    assert_eq!(spawner.spawn_count(), 1);
}

#[tokio::test]
async fn unlaunchable_preflight_does_not_block_start() {
    init_tracing();
    let spawner = FakeSpawner::new().failing_preflight("permission denied");
    let supervisor = supervisor(&spawner);

    supervisor.start().await.unwrap();

    assert_eq!(supervisor.state(), ProcessState::Ready);
    assert_eq!(spawner.spawn_count(), 1);
}

#[tokio::test]
async fn stop_escalates_to_kill_after_timeout() {
    init_tracing();
    let spawner = FakeSpawner::new().exit_on_interrupt(None);
    let supervisor = supervisor_with(ConfigBuilder::new().stop_timeout("50ms").build(), &spawner);
    let calls: Calls = Arc::default();
    record(&supervisor, "cb", &calls);

    supervisor.start().await.unwrap();
    let child = spawner.child(0).await;

    supervisor.stop();
    let state = with_timeout(supervisor.wait_settled()).await;

    assert_eq!(child.interrupts(), 1);
    assert!(child.was_killed());
    assert_eq!(state, ProcessState::Error);
    assert_eq!(*calls.lock().unwrap(), vec![("cb", -1, ProcessState::Error)]);
}

#[tokio::test]
async fn removed_callbacks_are_not_called() {
    init_tracing();
    let spawner = FakeSpawner::new().with_script(ChildScript::exits_with(0));
    let supervisor = supervisor(&spawner);
    let calls: Calls = Arc::default();

    record(&supervisor, "kept", &calls);
    let calls_removed = Arc::clone(&calls);
    let token = supervisor.on_exit(move |event| {
        calls_removed
            .lock()
            .unwrap()
            .push(("removed", event.code, ProcessState::Idle));
    });

    assert!(supervisor.remove_exit_callback(token));
    assert!(!supervisor.remove_exit_callback(token));

    supervisor.start().await.unwrap();
    with_timeout(supervisor.wait_settled()).await;

    assert_eq!(*calls.lock().unwrap(), vec![("kept", 0, ProcessState::Idle)]);
}

#[tokio::test]
async fn state_changes_are_observable() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let supervisor = supervisor(&spawner);
    let mut rx = supervisor.subscribe_state();

    supervisor.start().await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ProcessState::Ready);

    supervisor.stop();
    assert_eq!(*rx.borrow_and_update(), ProcessState::Closing);

    rx.wait_for(|s| *s == ProcessState::Idle).await.unwrap();
}
