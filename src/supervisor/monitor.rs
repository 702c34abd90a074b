// src/supervisor/monitor.rs

//! Background task that owns the engine child and settles its exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{ChildIo, ChildProcess};
use crate::types::ProcessState;

use super::{ExitCallback, ExitEvent, Shared};

/// Forward engine output to the log, one event per line. Fire-and-forget.
pub(super) fn forward_output(io: ChildIo, pid: Option<u32>) {
    tokio::spawn(log_lines(io.stdout, pid, false));
    tokio::spawn(log_lines(io.stderr, pid, true));
}

async fn log_lines(mut rx: mpsc::Receiver<String>, pid: Option<u32>, is_stderr: bool) {
    let mut buffer = LineBuffer::default();
    while let Some(chunk) = rx.recv().await {
        for line in buffer.push(&chunk) {
            log_line(&line, pid, is_stderr);
        }
    }
    if let Some(line) = buffer.finish() {
        log_line(&line, pid, is_stderr);
    }
}

fn log_line(line: &str, pid: Option<u32>, is_stderr: bool) {
    if line.trim().is_empty() {
        return;
    }
    if is_stderr {
        warn!(target: "rulewarden::engine", pid = ?pid, "{}", line);
    } else {
        info!(target: "rulewarden::engine", pid = ?pid, "{}", line);
    }
}

/// Reassembles lines from output chunks that may split a line anywhere.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Append a chunk and return every line it completes.
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);
        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete.lines().map(str::to_string).collect()
    }

    /// The unterminated tail left when the stream closes.
    fn finish(self) -> Option<String> {
        let line = self.pending.trim_end_matches('\r');
        (!line.is_empty()).then(|| line.to_string())
    }
}

/// Wait for the engine to exit, honouring a stop request.
///
/// A stop request delivers an interrupt; if the engine is still alive after
/// `stop_timeout` it is killed. Either way the exit is settled through
/// [`settle`].
pub(super) async fn supervise(
    mut child: Box<dyn ChildProcess>,
    mut stop_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    stop_timeout: Duration,
) {
    let pid = child.id();
    let mut stop_seen = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,

            request = &mut stop_rx, if !stop_seen => {
                stop_seen = true;
                if request.is_err() {
                    // Supervisor dropped its handle; keep watching the process.
                    debug!(pid = ?pid, "stop channel closed without a request");
                    continue;
                }

                if let Err(e) = child.interrupt() {
                    warn!(pid = ?pid, error = %e, "failed to interrupt engine");
                }

                match tokio::time::timeout(stop_timeout, child.wait()).await {
                    Ok(status) => break status,
                    Err(_) => {
                        warn!(
                            pid = ?pid,
                            timeout = ?stop_timeout,
                            "engine ignored interrupt; killing it"
                        );
                        if let Err(e) = child.kill().await {
                            error!(pid = ?pid, error = %e, "failed to kill engine");
                        }
                        break child.wait().await;
                    }
                }
            }
        }
    };

    settle(&shared, pid, status);
}

/// Record the outcome of the engine process and notify exit callbacks.
///
/// State is updated and the handle cleared before any callback runs; the
/// callbacks themselves run without the lock held.
fn settle(shared: &Shared, pid: Option<u32>, status: Result<i32>) {
    let (event, callbacks): (ExitEvent, Vec<ExitCallback>) = {
        let mut inner = shared.lock();
        inner.engine = None;

        match status {
            Ok(code) => {
                if code == 0 {
                    info!(pid = ?pid, exit_code = code, "engine exited");
                    shared.set_state(ProcessState::Idle);
                } else {
                    error!(pid = ?pid, exit_code = code, "engine exited with an error");
                    shared.set_state(ProcessState::Error);
                }
                let callbacks = inner.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect();
                (ExitEvent { code }, callbacks)
            }
            Err(err) => {
                error!(pid = ?pid, error = %err, "lost track of engine process");
                shared.set_state(ProcessState::Error);
                return;
            }
        }
    };

    for callback in callbacks {
        callback(&event);
    }
}
