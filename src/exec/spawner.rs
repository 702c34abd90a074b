// src/exec/spawner.rs

//! Pluggable process-spawning abstraction.
//!
//! The supervisor and the test runner talk to a `ProcessSpawner` instead of
//! `tokio::process::Command` directly. This makes it easy to swap in a fake
//! spawner in tests while keeping the production implementation in
//! [`super::process`].
//!
//! A spawned process is represented by a boxed [`ChildProcess`]:
//! - its stdout/stderr arrive as chunks on mpsc channels ([`ChildIo`]), and
//!   each channel closes once the stream reaches EOF;
//! - `wait()` resolves with the exit code (`-1` when killed by a signal).

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything needed to launch one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Value of an environment override, if set.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a command that was run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Output streams of a running child, delivered as text chunks.
#[derive(Debug)]
pub struct ChildIo {
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
}

/// A running child process.
pub trait ChildProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Take the output channels. Returns `None` after the first call.
    fn take_io(&mut self) -> Option<ChildIo>;

    /// Ask the process to terminate gracefully (SIGINT on unix).
    fn interrupt(&mut self) -> Result<()>;

    /// Forcibly terminate the process and reap it.
    fn kill(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Wait for the process to exit and return its exit code.
    fn wait(&mut self) -> BoxFuture<'_, Result<i32>>;
}

/// Capability to start engine processes.
///
/// Production code uses [`super::TokioSpawner`]; tests provide scripted
/// implementations that don't touch the OS.
pub trait ProcessSpawner: Send + Sync {
    /// Start a process without waiting for it.
    ///
    /// An error here is always a `SpawnError`: nothing was started.
    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ChildProcess>>;

    /// Run a process to completion, capturing its output.
    ///
    /// This blocks the calling thread; async callers go through
    /// `tokio::task::spawn_blocking`.
    fn run_to_completion(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}
