use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::process::{ChildStderr, ChildStdin, ChildStdout};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pipecast_protocol::{
    EnvelopeReader, EnvelopeSink, MediaKind, Message, ProtocolError, SessionConfig,
};
use pipecast_transport::{WorkerPipes, WorkerProcess};

use crate::dispatch::dispatch;
use crate::error::{ControllerError, Result};
use crate::pacer::Pacer;
use crate::sender::{MediaSender, MediaSink};
use crate::source::LoopingSource;
use crate::state::ConnectionState;

/// Program and leading arguments used to start a worker.
///
/// The session configuration is appended as flags when the worker spawns.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// A running worker plus the two threads reading its output.
pub struct Controller {
    pub(crate) process: WorkerProcess,
    pub(crate) sender: MediaSender<ChildStdin>,
    pub(crate) state: ConnectionState,
    pub(crate) readers: Vec<(&'static str, JoinHandle<()>)>,
    pub(crate) reaped: bool,
    config: SessionConfig,
}

impl Controller {
    /// Start the worker and its diagnostic and event readers.
    pub fn spawn(command: WorkerCommand, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let mut args = command.args;
        args.extend(config.to_worker_args().into_iter().map(OsString::from));
        let (process, pipes) = WorkerProcess::spawn(&command.program, &args)?;
        tracing::info!(
            pid = process.id(),
            program = %command.program.display(),
            channel = %config.channel_name,
            "worker started"
        );

        let WorkerPipes {
            stdin,
            stdout,
            stderr,
        } = pipes;
        let mut controller = Self {
            process,
            sender: MediaSender::new(EnvelopeSink::new(stdin)),
            state: ConnectionState::new(),
            readers: Vec::with_capacity(2),
            reaped: false,
            config,
        };

        // On error the partially built controller is dropped, which kills
        // the worker and lets any started reader see EOF.
        controller.start_reader("diagnostics", move || forward_diagnostics(stderr))?;
        let state = controller.state.clone();
        controller.start_reader("events", move || read_events(stdout, state))?;
        Ok(controller)
    }

    /// Block until the worker reports `connected`.
    ///
    /// Fails with [`ControllerError::ConnectTimeout`] after `timeout`. The
    /// worker keeps running either way; the caller decides what to do next.
    pub fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        self.state.wait_until_connected(timeout)?;
        tracing::info!(pid = self.process.id(), "worker connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    pub fn sender(&self) -> MediaSender<ChildStdin> {
        self.sender.clone()
    }

    pub fn sink(&self) -> Arc<dyn MediaSink> {
        Arc::new(self.sender.clone())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn worker_id(&self) -> u32 {
        self.process.id()
    }

    /// Open a raw media file sized for this session's `kind` stream.
    pub fn open_source(
        &self,
        kind: MediaKind,
        path: impl AsRef<Path>,
    ) -> Result<LoopingSource<BufReader<File>>> {
        LoopingSource::open(path, self.config.frame_size(kind))
    }

    /// Build a pacer for `kind` that sends into this worker.
    pub fn pacer<R: Read + Seek>(&self, kind: MediaKind, source: LoopingSource<R>) -> Pacer<R> {
        let interval = match kind {
            MediaKind::Audio => self.config.audio.frame_interval(),
            MediaKind::Video => self.config.video.frame_interval(),
        };
        Pacer::new(kind, source, interval, self.sink(), self.state())
    }

    fn start_reader<F>(&mut self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("pipecast-{name}"))
            .spawn(body)
            .map_err(|source| ControllerError::Thread { name, source })?;
        self.readers.push((name, handle));
        Ok(())
    }

    pub(crate) fn join_readers(&mut self) {
        for (name, handle) in self.readers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(reader = name, "reader thread panicked");
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        self.sender.close();
        if let Err(err) = self.process.kill() {
            tracing::warn!(error = %err, "failed to kill worker on drop");
        }
        self.join_readers();
    }
}

fn forward_diagnostics(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.is_empty() {
                    tracing::info!(source = "worker-stderr", "{text}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, "worker diagnostic stream failed");
                break;
            }
        }
    }
    tracing::debug!("worker diagnostic stream closed");
}

fn read_events(stdout: ChildStdout, state: ConnectionState) {
    let mut reader = EnvelopeReader::new(stdout);
    loop {
        match reader.read_envelope() {
            Ok(Some(envelope)) => match Message::try_from(envelope) {
                Ok(message) => {
                    dispatch(message, &state);
                }
                Err(err) => tracing::warn!(error = %err, "undecodable message from worker"),
            },
            Ok(None) => continue,
            Err(err @ ProtocolError::Malformed { .. }) => {
                tracing::warn!(error = %err, "undecodable message from worker");
            }
            Err(err) if err.is_stream_closed() => {
                tracing::debug!("worker event stream closed");
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "worker event stream corrupted");
                break;
            }
        }
    }
    state.mark_worker_gone();
}
