// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod ruletest;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, TestRuleArgs};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::exec::{ProcessSpawner, TokioSpawner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::ruletest::{StreamEvent, TestOptions, TestOutcome, TestRunner};
use crate::supervisor::{Supervisor, INDEX_CREATE_SUBCOMMAND, RUN_SUBCOMMAND};
use crate::types::ProcessState;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the real process spawner and filesystem
/// - the supervisor (`run`) or the test runner (`test-rule`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let spawner: Arc<dyn ProcessSpawner> = Arc::new(TokioSpawner);

    match args.command {
        Command::Run { dry_run: true } => {
            print_dry_run(&cfg, spawner);
            Ok(())
        }
        Command::Run { dry_run: false } => supervise_engine(&cfg, spawner).await,
        Command::TestRule(test) => {
            let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
            test_rule(&cfg, spawner, fs, &test).await
        }
    }
}

/// Start the engine and keep it supervised until Ctrl-C or until it exits
/// on its own. Fails if the engine ends up in `Error`.
pub async fn supervise_engine(cfg: &ConfigFile, spawner: Arc<dyn ProcessSpawner>) -> Result<()> {
    let supervisor = Supervisor::new(cfg.engine.clone(), spawner);

    supervisor.on_exit(|event| {
        if event.success() {
            info!(exit_code = event.code, "engine exited cleanly");
        } else {
            warn!(exit_code = event.code, "engine exited with a failure");
        }
    });

    supervisor.start().await?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Ctrl-C received; stopping engine");
                supervisor.stop();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C; waiting for engine to exit"),
        },
        state = supervisor.wait_settled() => {
            debug!(%state, "engine settled without a stop request");
        }
    }

    let state = supervisor.wait_settled().await;
    if state == ProcessState::Error {
        bail!("engine finished in the error state");
    }
    Ok(())
}

/// Test one rule file and print the result to stdout.
///
/// Batch mode prints the engine's output once it exits. Streaming mode
/// prints each event as one JSON line while the engine runs.
pub async fn test_rule(
    cfg: &ConfigFile,
    spawner: Arc<dyn ProcessSpawner>,
    fs: Arc<dyn FileSystem>,
    args: &TestRuleArgs,
) -> Result<()> {
    if !fs.is_file(&args.rule_file) {
        bail!("rule file {:?} does not exist", args.rule_file);
    }
    let rule = fs.read_to_string(&args.rule_file)?;
    let runner = TestRunner::new(cfg, spawner, fs);
    let options = args.options();

    if args.stream {
        stream_rule_test(&runner, &rule, &options).await
    } else {
        let output = runner.run_batch(&rule, &options).await?;
        println!("{}", output.trim_end_matches('\n'));
        Ok(())
    }
}

async fn stream_rule_test(runner: &TestRunner, rule: &str, options: &TestOptions) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", event.to_json()?);
        }
        Ok::<(), serde_json::Error>(())
    });

    let outcome = runner.run_streaming(rule, options, tx).await?;
    printer.await??;

    match outcome {
        TestOutcome::Completed { code: 0, .. } => Ok(()),
        TestOutcome::Completed { code, .. } => bail!("rule test failed with exit code {code}"),
        TestOutcome::Cancelled => bail!("rule test was cancelled"),
    }
}

/// Simple dry-run output: print the resolved config and engine commands.
fn print_dry_run(cfg: &ConfigFile, spawner: Arc<dyn ProcessSpawner>) {
    let es = &cfg.elasticsearch;

    println!("rulewarden dry-run");
    println!("  engine.program = {}", cfg.engine.program);
    println!("  engine.install_path = {}", cfg.engine.install_path.display());
    println!("  engine.config = {}", cfg.engine.config_path().display());
    println!("  engine.stop_timeout = {:?}", cfg.engine.stop_timeout);
    println!(
        "  elasticsearch = {}:{} (ssl: {}, auth: {})",
        es.host,
        es.port,
        es.use_ssl,
        es.username.is_some()
    );
    println!("  test.scratch_dir = {}", cfg.test.scratch_dir.display());
    println!();

    let supervisor = Supervisor::new(cfg.engine.clone(), Arc::clone(&spawner));
    println!("commands:");
    println!("  pre-flight: {}", supervisor.engine_command(INDEX_CREATE_SUBCOMMAND));
    println!("  engine:     {}", supervisor.engine_command(RUN_SUBCOMMAND));

    let runner = TestRunner::new(cfg, spawner, Arc::new(RealFileSystem));
    let sample = runner.command_for(
        &cfg.test.scratch_dir.join("<rule>.yaml"),
        &TestOptions::default(),
    );
    println!("  test-rule:  {sample}");

    debug!("dry-run complete (no execution)");
}
