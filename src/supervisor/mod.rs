// src/supervisor/mod.rs

//! Lifecycle management for the long-running engine.
//!
//! A [`Supervisor`] owns at most one engine process and tracks its health as
//! a [`ProcessState`]:
//!
//! ```text
//! Idle --start()--> Starting --spawned--> Ready --stop()--> Closing
//!   ^                   |                   |                  |
//!   |                   +--spawn error--+   +--exit != 0--+    |
//!   |                                   v                 v    |
//!   +------------ exit == 0 --------- Error <--- exit != 0 ----+
//! ```
//!
//! Exit settlement happens on a background monitor task (see [`monitor`]).

mod monitor;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::exec::{CommandSpec, ProcessSpawner};
use crate::types::ProcessState;

/// Engine subcommand run once before every start.
pub const INDEX_CREATE_SUBCOMMAND: &str = "index-create";
/// Engine subcommand for the long-running process.
pub const RUN_SUBCOMMAND: &str = "run";

/// Delivered to exit callbacks each time the engine process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitEvent {
    pub code: i32,
}

impl ExitEvent {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub type ExitCallback = Arc<dyn Fn(&ExitEvent) + Send + Sync>;

/// Token returned by [`Supervisor::on_exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitSubscription(u64);

/// Live engine, as seen from the supervisor.
struct EngineHandle {
    pid: Option<u32>,
    /// Taken by the first `stop()`.
    stop_tx: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct Inner {
    engine: Option<EngineHandle>,
    callbacks: Vec<(ExitSubscription, ExitCallback)>,
    next_subscription: u64,
}

/// State shared between the supervisor and its monitor task.
///
/// `state` is only written while `inner` is locked, so the state and the
/// presence of a handle never disagree for an observer holding the lock.
struct Shared {
    state: watch::Sender<ProcessState>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ProcessState::Idle);
        Self {
            state,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Callers hold `inner` while calling this.
    fn set_state(&self, next: ProcessState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "engine state transition");
        }
    }
}

/// Returns a start that was dropped mid-flight from `Starting` to `Idle`.
struct StartGuard<'a> {
    shared: &'a Shared,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        let inner = self.shared.lock();
        if self.shared.state() == ProcessState::Starting && inner.engine.is_none() {
            warn!("engine start abandoned before the engine was spawned");
            self.shared.set_state(ProcessState::Idle);
        }
    }
}

/// Owns the long-running engine process.
pub struct Supervisor {
    engine: EngineConfig,
    spawner: Arc<dyn ProcessSpawner>,
    shared: Arc<Shared>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("engine", &self.engine)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(engine: EngineConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            engine,
            spawner,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.shared.state()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.shared.state.subscribe()
    }

    /// Pid of the live engine, if any.
    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().engine.as_ref().and_then(|e| e.pid)
    }

    /// The command line used for an engine subcommand.
    pub fn engine_command(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::new(&self.engine.program, &self.engine.install_path)
            .args(self.engine.base_args(subcommand))
    }

    /// Start the engine.
    ///
    /// Only acts from `Idle`; in any other state this logs a warning and
    /// returns `Ok(())` without side effects. The index pre-flight always
    /// runs first and never fails the start. Returns `SpawnError` if the
    /// engine itself could not be launched, leaving the state at `Error`.
    ///
    /// Dropping the future before the engine is spawned puts the state back
    /// to `Idle`.
    pub async fn start(&self) -> Result<()> {
        {
            let _inner = self.shared.lock();
            let state = self.shared.state();
            if state != ProcessState::Idle {
                warn!(%state, "engine start requested while not idle; ignoring");
                return Ok(());
            }
            self.shared.set_state(ProcessState::Starting);
        }
        let _abandoned = StartGuard {
            shared: &self.shared,
        };

        self.create_index().await;

        let spec = self.engine_command(RUN_SUBCOMMAND);
        info!(command = %spec, cwd = ?spec.cwd, "starting engine");

        let mut child = match self.spawner.spawn(&spec) {
            Ok(child) => child,
            Err(err) => {
                error!(program = %spec.program, error = %err, "failed to spawn engine");
                let _inner = self.shared.lock();
                self.shared.set_state(ProcessState::Error);
                return Err(err);
            }
        };

        let pid = child.id();
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut inner = self.shared.lock();
            inner.engine = Some(EngineHandle {
                pid,
                stop_tx: Some(stop_tx),
            });
            self.shared.set_state(ProcessState::Ready);
        }
        info!(pid = ?pid, "engine started");

        if let Some(io) = child.take_io() {
            monitor::forward_output(io, pid);
        }

        tokio::spawn(monitor::supervise(
            child,
            stop_rx,
            Arc::clone(&self.shared),
            self.engine.stop_timeout,
        ));

        Ok(())
    }

    /// Ask the engine to stop.
    ///
    /// Sends an interrupt and moves to `Closing`; the monitor settles the
    /// final state once the process exits, killing it if it is still alive
    /// after `stop_timeout`. Without a live engine this is a no-op.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();

        let Some(engine) = inner.engine.as_mut() else {
            info!("stop requested but no engine is running");
            return;
        };
        let pid = engine.pid;
        let Some(stop_tx) = engine.stop_tx.take() else {
            info!(pid = ?pid, "engine is already stopping");
            return;
        };

        self.shared.set_state(ProcessState::Closing);
        info!(pid = ?pid, "stopping engine");

        if stop_tx.send(()).is_err() {
            debug!(pid = ?pid, "engine monitor already finished");
        }
    }

    /// Acknowledge a failure: `Error` with no live engine goes back to `Idle`.
    ///
    /// Returns whether the state changed.
    pub fn reset(&self) -> bool {
        let inner = self.shared.lock();
        if self.shared.state() == ProcessState::Error && inner.engine.is_none() {
            self.shared.set_state(ProcessState::Idle);
            true
        } else {
            false
        }
    }

    /// Register a callback for every future engine exit.
    ///
    /// Callbacks run in registration order, after the state has been
    /// updated, whatever the exit code. They are not called when the engine
    /// fails to spawn.
    pub fn on_exit<F>(&self, callback: F) -> ExitSubscription
    where
        F: Fn(&ExitEvent) + Send + Sync + 'static,
    {
        let mut inner = self.shared.lock();
        let id = ExitSubscription(inner.next_subscription);
        inner.next_subscription += 1;
        inner.callbacks.push((id, Arc::new(callback)));
        id
    }

    pub fn remove_exit_callback(&self, subscription: ExitSubscription) -> bool {
        let mut inner = self.shared.lock();
        let before = inner.callbacks.len();
        inner.callbacks.retain(|(id, _)| *id != subscription);
        inner.callbacks.len() != before
    }

    /// Wait until the state is `Idle` or `Error` and return it.
    pub async fn wait_settled(&self) -> ProcessState {
        let mut rx = self.subscribe_state();
        match rx.wait_for(|s| s.is_settled()).await {
            Ok(state) => *state,
            // The sender lives in `self.shared`, so this is unreachable while
            // `self` is borrowed; fall back to the current value anyway.
            Err(_) => self.state(),
        }
    }

    async fn create_index(&self) {
        let spec = self.engine_command(INDEX_CREATE_SUBCOMMAND);
        info!(command = %spec, "creating engine index");

        let spawner = Arc::clone(&self.spawner);
        let result = tokio::task::spawn_blocking(move || spawner.run_to_completion(&spec)).await;

        match result {
            Ok(Ok(output)) if output.success() => {
                debug!(stdout = %output.stdout.trim_end(), "index creation output");
                info!("engine index ready");
            }
            Ok(Ok(output)) => {
                error!(
                    exit_code = output.code,
                    stdout = %output.stdout.trim_end(),
                    stderr = %output.stderr.trim_end(),
                    "engine index creation failed"
                );
                warn!("starting engine anyway; alert state persistence may not work");
            }
            Ok(Err(err)) => {
                error!(error = %err, "could not run engine index creation");
                warn!("starting engine anyway; alert state persistence may not work");
            }
            Err(join_err) => {
                error!(error = %join_err, "engine index creation task failed");
                warn!("starting engine anyway; alert state persistence may not work");
            }
        }
    }
}
