// src/exec/process.rs

//! Real process spawning on top of `tokio::process`.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{Result, RulewardenError};
use crate::exec::spawner::{
    BoxFuture, ChildIo, ChildProcess, CommandOutput, CommandSpec, ProcessSpawner,
};

const READ_CHUNK: usize = 8 * 1024;

/// Spawner used in production.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner;

impl ProcessSpawner for TokioSpawner {
    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ChildProcess>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| spawn_error(spec, e))?;
        debug!(program = %spec.program, pid = ?child.id(), "process spawned");

        let io = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => Some(ChildIo {
                stdout: pump(stdout),
                stderr: pump(stderr),
            }),
            _ => None,
        };

        Ok(Box::new(TokioChild { child, io }))
    }

    fn run_to_completion(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = std::process::Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(spec, e))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn spawn_error(spec: &CommandSpec, err: std::io::Error) -> RulewardenError {
    RulewardenError::SpawnError {
        program: spec.program.clone(),
        reason: err.to_string(),
    }
}

/// Forward a pipe to a channel chunk by chunk until EOF.
///
/// The channel closes when the pipe does, which is how consumers learn the
/// stream has ended.
fn pump<R>(mut reader: R) -> mpsc::Receiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if tx.send(chunk).await.is_err() {
                        trace!("output receiver dropped; stop reading");
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "error reading child output");
                    break;
                }
            }
        }
    });

    rx
}

struct TokioChild {
    child: Child,
    io: Option<ChildIo>,
}

impl ChildProcess for TokioChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_io(&mut self) -> Option<ChildIo> {
        self.io.take()
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // No pid means the child was already reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| {
            RulewardenError::Other(anyhow::anyhow!("sending SIGINT to pid {pid}: {e}"))
        })
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> Result<()> {
        self.child.start_kill().map_err(RulewardenError::from)
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.child.kill().await.map_err(RulewardenError::from) })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<i32>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(status.code().unwrap_or(-1))
        })
    }
}
