use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Result, TransportError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The three byte streams of a spawned worker.
#[derive(Debug)]
pub struct WorkerPipes {
    /// Command input (controller → worker).
    pub stdin: ChildStdin,
    /// Event output (worker → controller). Carries only framed protocol data.
    pub stdout: ChildStdout,
    /// Free-form diagnostic text.
    pub stderr: ChildStderr,
}

/// Handle to a running worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    program: PathBuf,
}

impl WorkerProcess {
    /// Spawn `program` with `args`, capturing stdin, stdout and stderr.
    pub fn spawn<I, S>(program: impl AsRef<Path>, args: I) -> Result<(Self, WorkerPipes)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref().to_path_buf();
        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pipes = match take_pipes(&mut child) {
            Ok(pipes) => pipes,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };

        tracing::debug!(pid = child.id(), program = %program.display(), "worker spawned");
        Ok((Self { child, program }, pipes))
    }

    /// OS process id of the worker.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Path the worker was started from.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Wait up to `timeout` for the worker to exit on its own.
    ///
    /// Returns `Ok(None)` if it is still running when the timeout elapses.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Forcibly terminate the worker and reap it.
    pub fn kill(&mut self) -> Result<ExitStatus> {
        match self.child.kill() {
            Ok(()) => {}
            // Already exited; `wait` below reaps it.
            Err(err) if err.kind() == ErrorKind::InvalidInput => {}
            Err(err) => return Err(err.into()),
        }
        Ok(self.child.wait()?)
    }
}

fn take_pipes(child: &mut Child) -> Result<WorkerPipes> {
    let stdin = child
        .stdin
        .take()
        .ok_or(TransportError::MissingPipe("stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or(TransportError::MissingPipe("stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or(TransportError::MissingPipe("stderr"))?;
    Ok(WorkerPipes {
        stdin,
        stdout,
        stderr,
    })
}
