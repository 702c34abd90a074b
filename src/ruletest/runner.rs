// src/ruletest/runner.rs

//! Execution of one rule test against the engine CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigFile, ElasticsearchConfig, EngineConfig};
use crate::errors::{Result, RulewardenError};
use crate::exec::{ChildIo, ChildProcess, CommandSpec, ProcessSpawner};
use crate::fs::FileSystem;

use super::events::{join_output, StreamEvent};
use super::options::TestOptions;
use super::temp_rule::TempRuleFile;

/// Engine subcommand used for rule tests.
pub const TEST_RULE_SUBCOMMAND: &str = "test-rule";

/// Live consumer of a streaming test. Dropping the receiving side cancels
/// the test.
pub type Subscriber = mpsc::Sender<StreamEvent>;

/// How a streaming test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// The engine exited on its own. `stdout` is joined per the requested
    /// format; `stderr` is newline-joined.
    Completed {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The subscriber went away first; the engine was killed.
    Cancelled,
}

impl TestOutcome {
    pub fn success(&self) -> bool {
        matches!(self, TestOutcome::Completed { code: 0, .. })
    }
}

/// What a single job produced before its temp file was removed.
enum JobResult {
    Exited {
        code: i32,
        stdout: Vec<String>,
        stderr: Vec<String>,
    },
    Cancelled,
}

/// Runs ad-hoc rule tests, each in its own engine process.
///
/// The runner holds no per-test state; concurrent calls each get their own
/// temp file, process and buffers.
pub struct TestRunner {
    engine: EngineConfig,
    elasticsearch: ElasticsearchConfig,
    scratch_dir: PathBuf,
    spawner: Arc<dyn ProcessSpawner>,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("engine", &self.engine)
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    pub fn new(
        config: &ConfigFile,
        spawner: Arc<dyn ProcessSpawner>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            engine: config.engine.clone(),
            elasticsearch: config.elasticsearch.clone(),
            scratch_dir: config.test.scratch_dir.clone(),
            spawner,
            fs,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// The engine invocation for testing the rule stored at `rule_path`.
    pub fn command_for(&self, rule_path: &Path, options: &TestOptions) -> CommandSpec {
        CommandSpec::new(&self.engine.program, &self.engine.install_path)
            .args(self.engine.base_args(TEST_RULE_SUBCOMMAND))
            .args(options.to_args())
            .args([rule_path.to_string_lossy().into_owned()])
            .envs(self.elasticsearch.env_overrides())
    }

    /// Single entry point: batch mode without a subscriber, streaming mode
    /// with one.
    ///
    /// In streaming mode a non-zero exit is reported through the stream and
    /// also returned as `ExitError`; a cancelled stream returns `Cancelled`.
    pub async fn run(
        &self,
        rule: &str,
        options: &TestOptions,
        subscriber: Option<Subscriber>,
    ) -> Result<String> {
        let Some(subscriber) = subscriber else {
            return self.run_batch(rule, options).await;
        };

        match self.run_streaming(rule, options, subscriber).await? {
            TestOutcome::Completed { code: 0, stdout, .. } => Ok(stdout),
            TestOutcome::Completed { code, stderr, .. } => {
                Err(RulewardenError::ExitError { code, stderr })
            }
            TestOutcome::Cancelled => Err(RulewardenError::Cancelled),
        }
    }

    /// Run a test and return the engine's output, or its diagnostics as an
    /// `ExitError` when it exits non-zero.
    pub async fn run_batch(&self, rule: &str, options: &TestOptions) -> Result<String> {
        match self.execute(rule, options, None).await? {
            JobResult::Exited { code: 0, stdout, .. } => Ok(join_output(&stdout, options.format)),
            JobResult::Exited { code, stderr, .. } => {
                let stderr = stderr.join("\n");
                error!(exit_code = code, stderr = %stderr, "rule test failed");
                Err(RulewardenError::ExitError { code, stderr })
            }
            // Only reachable with a subscriber.
            JobResult::Cancelled => Err(RulewardenError::Cancelled),
        }
    }

    /// Run a test, pushing output to `subscriber` as it arrives.
    ///
    /// stdout chunks become `result` events and stderr chunks `progress`
    /// events; a final `exit` event carries the exit code. If the subscriber
    /// disconnects first, the engine is killed, nothing more is sent and the
    /// outcome is `Cancelled`.
    pub async fn run_streaming(
        &self,
        rule: &str,
        options: &TestOptions,
        subscriber: Subscriber,
    ) -> Result<TestOutcome> {
        match self.execute(rule, options, Some(&subscriber)).await? {
            JobResult::Exited {
                code,
                stdout,
                stderr,
            } => {
                if code != 0 {
                    warn!(exit_code = code, "streamed rule test failed");
                }
                if subscriber.send(StreamEvent::exit(code)).await.is_err() {
                    debug!("subscriber left before the exit event");
                }
                Ok(TestOutcome::Completed {
                    code,
                    stdout: join_output(&stdout, options.format),
                    stderr: stderr.join("\n"),
                })
            }
            JobResult::Cancelled => Ok(TestOutcome::Cancelled),
        }
    }

    async fn execute(
        &self,
        rule: &str,
        options: &TestOptions,
        subscriber: Option<&Subscriber>,
    ) -> Result<JobResult> {
        let mut rule_file = TempRuleFile::create(Arc::clone(&self.fs), &self.scratch_dir, rule)?;

        let spec = self.command_for(rule_file.path(), options);
        info!(command = %spec, rule_file = ?rule_file.path(), "starting rule test");

        let mut child = self.spawner.spawn(&spec).inspect_err(|err| {
            error!(program = %spec.program, error = %err, "failed to spawn rule test");
        })?;
        let ChildIo {
            mut stdout,
            mut stderr,
        } = child.take_io().unwrap_or_else(closed_io);

        let mut stdout_chunks = Vec::new();
        let mut stderr_chunks = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut exit_code: Option<i32> = None;

        // Exit alone is not enough: keep draining until both pipes close so
        // no trailing output is lost.
        let code = loop {
            if let Some(code) = exit_code {
                if !stdout_open && !stderr_open {
                    break code;
                }
            }

            // Exit first, then cancellation, then output. Once the exit is
            // known the job completes even if the subscriber leaves while the
            // pipes drain.
            tokio::select! {
                biased;

                status = child.wait(), if exit_code.is_none() => {
                    let code = status?;
                    info!(rule_file = ?rule_file.path(), exit_code = code, "rule test exited");
                    exit_code = Some(code);
                }

                _ = subscriber_closed(subscriber), if exit_code.is_none() => {
                    info!(rule_file = ?rule_file.path(), "subscriber disconnected; cancelling rule test");
                    cancel(child.as_mut()).await;
                    rule_file.remove();
                    return Ok(JobResult::Cancelled);
                }

                chunk = stdout.recv(), if stdout_open => match chunk {
                    Some(chunk) => {
                        debug!(rule_file = ?rule_file.path(), "result: {}", chunk.trim_end());
                        push(subscriber, StreamEvent::Result(chunk.clone())).await;
                        stdout_chunks.push(chunk);
                    }
                    None => stdout_open = false,
                },

                chunk = stderr.recv(), if stderr_open => match chunk {
                    Some(chunk) => {
                        debug!(rule_file = ?rule_file.path(), "progress: {}", chunk.trim_end());
                        push(subscriber, StreamEvent::Progress(chunk.clone())).await;
                        stderr_chunks.push(chunk);
                    }
                    None => stderr_open = false,
                },
            }
        };

        rule_file.remove();

        Ok(JobResult::Exited {
            code,
            stdout: stdout_chunks,
            stderr: stderr_chunks,
        })
    }
}

async fn push(subscriber: Option<&Subscriber>, event: StreamEvent) {
    if let Some(tx) = subscriber {
        // A failed send means the subscriber is gone; the cancellation branch
        // picks that up on the next iteration.
        let _ = tx.send(event).await;
    }
}

async fn subscriber_closed(subscriber: Option<&Subscriber>) {
    match subscriber {
        Some(tx) => tx.closed().await,
        None => std::future::pending().await,
    }
}

async fn cancel(child: &mut dyn ChildProcess) {
    if let Err(e) = child.kill().await {
        warn!(pid = ?child.id(), error = %e, "failed to kill cancelled rule test");
    }
}

fn closed_io() -> ChildIo {
    let (_, stdout) = mpsc::channel(1);
    let (_, stderr) = mpsc::channel(1);
    ChildIo { stdout, stderr }
}
