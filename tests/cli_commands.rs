// tests/cli_commands.rs

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::*;
use rulewarden::cli::TestRuleArgs;
use rulewarden::fs::mock::MockFileSystem;
use rulewarden::types::{TestFormat, TestType};
use rulewarden::{supervise_engine, test_rule};

fn test_args(rule_file: &str, stream: bool) -> TestRuleArgs {
    TestRuleArgs {
        rule_file: PathBuf::from(rule_file),
        days: None,
        format: TestFormat::Text,
        max_results: 0,
        alert: false,
        test_type: TestType::SchemaOnly,
        stream,
    }
}

#[tokio::test]
async fn test_rule_reads_the_rule_file() {
    init_tracing();
    let spawner = FakeSpawner::new().with_script(ChildScript::exits_with(0).stdout("OK\n"));
    let fs = MockFileSystem::new();
    fs.add_file("/rules/cpu.yaml", "name: cpu");
    let cfg = ConfigBuilder::new().build();

    with_timeout(test_rule(
        &cfg,
        Arc::new(spawner.clone()),
        Arc::new(fs.clone()),
        &test_args("/rules/cpu.yaml", false),
    ))
    .await
    .unwrap();

    let spec = &spawner.spawned()[0];
    assert!(spec.args.contains(&"--schema-only".to_string()));
    // Only the original rule file is left.
    assert_eq!(fs.files(), vec![PathBuf::from("/rules/cpu.yaml")]);
}

#[tokio::test]
async fn test_rule_fails_on_missing_rule_file() {
    init_tracing();
    let spawner = FakeSpawner::new();
    let cfg = ConfigBuilder::new().build();

    let err = test_rule(
        &cfg,
        Arc::new(spawner.clone()),
        Arc::new(MockFileSystem::new()),
        &test_args("/rules/missing.yaml", false),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("does not exist"));
    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn streamed_failure_fails_the_command() {
    init_tracing();
    let spawner = FakeSpawner::new().with_script(ChildScript::exits_with(4).stderr("bad field"));
    let fs = MockFileSystem::new();
    fs.add_file("/rules/bad.yaml", "name: [");
    let cfg = ConfigBuilder::new().build();

    let err = with_timeout(test_rule(
        &cfg,
        Arc::new(spawner),
        Arc::new(fs),
        &test_args("/rules/bad.yaml", true),
    ))
    .await
    .unwrap_err();

    assert!(err.to_string().contains("exit code 4"));
}

#[tokio::test]
async fn supervise_engine_returns_when_engine_exits_cleanly() {
    init_tracing();
    let spawner = FakeSpawner::new().with_script(ChildScript::exits_with(0).stdout("shutting down\n"));
    let cfg = ConfigBuilder::new().build();

    with_timeout(supervise_engine(&cfg, Arc::new(spawner.clone())))
        .await
        .unwrap();

    assert_eq!(spawner.completed().len(), 1);
    assert_eq!(spawner.spawn_count(), 1);
}

#[tokio::test]
async fn supervise_engine_fails_when_engine_crashes() {
    init_tracing();
    let spawner = FakeSpawner::new().with_script(ChildScript::exits_with(3).stderr("lost cluster\n"));
    let cfg = ConfigBuilder::new().build();

    let result = with_timeout(supervise_engine(&cfg, Arc::new(spawner))).await;

    assert!(result.is_err());
}
