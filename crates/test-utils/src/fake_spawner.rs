use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};

use tokio::sync::{mpsc, watch};
use rulewarden::errors::{Result, RulewardenError};
use rulewarden::exec::{
    BoxFuture, ChildIo, ChildProcess, CommandOutput, CommandSpec, ProcessSpawner,
};

const FIRST_PID: u32 = 4000;
const OUTPUT_CAPACITY: usize = 64;

/// Output and exit code a fake child plays back as soon as it is spawned.
///
/// With `exit_code == None` the child stays alive after emitting its output
/// and has to be finished through its [`ChildControl`].
#[derive(Debug, Clone, Default)]
pub struct ChildScript {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
}

impl ChildScript {
    pub fn exits_with(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    pub fn stays_alive() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, chunk: &str) -> Self {
        self.stdout.push(chunk.to_string());
        self
    }

    pub fn stderr(mut self, chunk: &str) -> Self {
        self.stderr.push(chunk.to_string());
        self
    }
}

struct SpawnerState {
    spawned: Vec<CommandSpec>,
    completed: Vec<CommandSpec>,
    children: Vec<ChildControl>,
    scripts: VecDeque<ChildScript>,
    spawn_error: Option<String>,
    preflight: std::result::Result<CommandOutput, String>,
    exit_on_interrupt: Option<i32>,
    preflight_gate: Option<Arc<Mutex<std_mpsc::Receiver<()>>>>,
    next_pid: u32,
}

/// Holds run-to-completion commands until it is dropped.
pub struct PreflightGate {
    _release: std_mpsc::Sender<()>,
}

/// A scripted `ProcessSpawner` that never touches the OS.
///
/// - records every spawned command and every run-to-completion command
/// - hands out a [`ChildControl`] per spawned child so tests can emit output,
///   finish the process and inspect interrupts / kills
/// - children exit with code 0 on interrupt unless configured otherwise
#[derive(Clone)]
pub struct FakeSpawner {
    state: Arc<Mutex<SpawnerState>>,
    spawn_count: Arc<watch::Sender<usize>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        let (spawn_count, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(SpawnerState {
                spawned: Vec::new(),
                completed: Vec::new(),
                children: Vec::new(),
                scripts: VecDeque::new(),
                spawn_error: None,
                preflight: Ok(CommandOutput {
                    code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
                exit_on_interrupt: Some(0),
                preflight_gate: None,
                next_pid: FIRST_PID,
            })),
            spawn_count: Arc::new(spawn_count),
        }
    }

    /// Queue a script for the next spawn that has none yet.
    pub fn with_script(self, script: ChildScript) -> Self {
        self.state.lock().unwrap().scripts.push_back(script);
        self
    }

    /// Make every spawn fail with `SpawnError`.
    pub fn failing_spawns(self, reason: &str) -> Self {
        self.state.lock().unwrap().spawn_error = Some(reason.to_string());
        self
    }

    /// Result returned by run-to-completion commands.
    pub fn with_preflight(self, output: CommandOutput) -> Self {
        self.state.lock().unwrap().preflight = Ok(output);
        self
    }

    /// Make run-to-completion commands fail to launch.
    pub fn failing_preflight(self, reason: &str) -> Self {
        self.state.lock().unwrap().preflight = Err(reason.to_string());
        self
    }

    /// Exit code children report after an interrupt; `None` ignores it.
    pub fn exit_on_interrupt(self, code: Option<i32>) -> Self {
        self.state.lock().unwrap().exit_on_interrupt = code;
        self
    }

    /// Block run-to-completion commands until the returned gate is dropped.
    pub fn hold_preflight(self) -> (Self, PreflightGate) {
        let (release, held) = std_mpsc::channel();
        self.state.lock().unwrap().preflight_gate = Some(Arc::new(Mutex::new(held)));
        (self, PreflightGate { _release: release })
    }

    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn completed(&self) -> Vec<CommandSpec> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn spawn_count(&self) -> usize {
        *self.spawn_count.borrow()
    }

    /// Control handle of the `index`-th spawned child, waiting for the spawn
    /// if it hasn't happened yet.
    pub async fn child(&self, index: usize) -> ChildControl {
        let mut rx = self.spawn_count.subscribe();
        rx.wait_for(|n| *n > index)
            .await
            .expect("spawn counter is never dropped");
        self.state.lock().unwrap().children[index].clone()
    }
}

impl Default for FakeSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ChildProcess>> {
        let (child, control, script) = {
            let mut state = self.state.lock().unwrap();
            if let Some(reason) = state.spawn_error.clone() {
                return Err(RulewardenError::SpawnError {
                    program: spec.program.clone(),
                    reason,
                });
            }

            let pid = state.next_pid;
            state.next_pid += 1;
            let (child, control) = fake_child(pid, spec.clone(), state.exit_on_interrupt);

            state.spawned.push(spec.clone());
            state.children.push(control.clone());
            (child, control, state.scripts.pop_front())
        };

        if let Some(script) = script {
            for chunk in &script.stdout {
                control.emit_stdout(chunk);
            }
            for chunk in &script.stderr {
                control.emit_stderr(chunk);
            }
            if let Some(code) = script.exit_code {
                control.exit(code);
            }
        }

        self.spawn_count.send_modify(|n| *n += 1);
        Ok(Box::new(child))
    }

    fn run_to_completion(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.completed.push(spec.clone());
            state.preflight_gate.clone()
        };
        if let Some(gate) = gate {
            // Nothing is ever sent; this returns once the gate is dropped.
            let _ = gate.lock().unwrap().recv();
        }

        let state = self.state.lock().unwrap();
        state
            .preflight
            .clone()
            .map_err(|reason| RulewardenError::SpawnError {
                program: spec.program.clone(),
                reason,
            })
    }
}

struct ChildShared {
    pid: u32,
    spec: CommandSpec,
    stdout: Mutex<Option<mpsc::Sender<String>>>,
    stderr: Mutex<Option<mpsc::Sender<String>>>,
    exit: watch::Sender<Option<i32>>,
    exit_on_interrupt: Option<i32>,
    interrupts: AtomicUsize,
    killed: AtomicBool,
}

/// Test-side handle to a fake child.
#[derive(Clone)]
pub struct ChildControl {
    shared: Arc<ChildShared>,
}

impl ChildControl {
    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.shared.spec
    }

    /// Emit a stdout chunk. Ignored once the child has exited.
    pub fn emit_stdout(&self, chunk: &str) {
        send_chunk(&self.shared.stdout, chunk);
    }

    /// Emit a stderr chunk. Ignored once the child has exited.
    pub fn emit_stderr(&self, chunk: &str) {
        send_chunk(&self.shared.stderr, chunk);
    }

    /// Close both output streams and report `code` from `wait()`. Only the
    /// first exit counts.
    pub fn exit(&self, code: i32) {
        self.close_output();
        self.exit_leaving_output_open(code);
    }

    /// Report `code` from `wait()` while the pipes stay open, like a process
    /// whose output has not been drained yet.
    pub fn exit_leaving_output_open(&self, code: i32) {
        self.shared.exit.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(code);
                true
            } else {
                false
            }
        });
    }

    /// Close both output streams.
    pub fn close_output(&self) {
        self.shared.stdout.lock().unwrap().take();
        self.shared.stderr.lock().unwrap().take();
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.shared.exit.borrow()
    }

    pub fn interrupts(&self) -> usize {
        self.shared.interrupts.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    /// Wait until an interrupt has been delivered.
    pub async fn interrupted(&self) {
        while self.interrupts() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

fn send_chunk(sender: &Mutex<Option<mpsc::Sender<String>>>, chunk: &str) {
    if let Some(tx) = sender.lock().unwrap().as_ref() {
        // The reader may already be gone, e.g. after a cancelled test.
        let _ = tx.try_send(chunk.to_string());
    }
}

fn fake_child(pid: u32, spec: CommandSpec, exit_on_interrupt: Option<i32>) -> (FakeChild, ChildControl) {
    let (stdout_tx, stdout_rx) = mpsc::channel(OUTPUT_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel(OUTPUT_CAPACITY);
    let (exit, _) = watch::channel(None);

    let shared = Arc::new(ChildShared {
        pid,
        spec,
        stdout: Mutex::new(Some(stdout_tx)),
        stderr: Mutex::new(Some(stderr_tx)),
        exit,
        exit_on_interrupt,
        interrupts: AtomicUsize::new(0),
        killed: AtomicBool::new(false),
    });

    let child = FakeChild {
        control: ChildControl {
            shared: Arc::clone(&shared),
        },
        io: Some(ChildIo {
            stdout: stdout_rx,
            stderr: stderr_rx,
        }),
    };
    (child, ChildControl { shared })
}

struct FakeChild {
    control: ChildControl,
    io: Option<ChildIo>,
}

impl ChildProcess for FakeChild {
    fn id(&self) -> Option<u32> {
        match self.control.exit_code() {
            Some(_) => None,
            None => Some(self.control.pid()),
        }
    }

    fn take_io(&mut self) -> Option<ChildIo> {
        self.io.take()
    }

    fn interrupt(&mut self) -> Result<()> {
        self.control.shared.interrupts.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.control.shared.exit_on_interrupt {
            self.control.exit(code);
        }
        Ok(())
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.control.shared.killed.store(true, Ordering::SeqCst);
            self.control.exit(-1);
            Ok(())
        })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32>> {
        let mut rx = self.control.shared.exit.subscribe();
        Box::pin(async move {
            let code = rx
                .wait_for(Option::is_some)
                .await
                .map(|code| *code)
                .map_err(|e| RulewardenError::Other(e.into()))?;
            Ok(code.unwrap_or(-1))
        })
    }
}
