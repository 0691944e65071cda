use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pipecast_protocol::{EnvelopeSink, LogLevel, LogResponse, Message, StatusResponse};

/// Outbound half of the worker protocol.
///
/// Clones share one [`EnvelopeSink`], so the command loop and the event pump
/// serialize on the same writer lock. Write failures are logged and dropped:
/// a vanished controller must not take the worker down mid-cleanup.
pub struct Emitter<W> {
    sink: EnvelopeSink<W>,
    muted: Arc<AtomicBool>,
}

impl<W> Clone for Emitter<W> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            muted: Arc::clone(&self.muted),
        }
    }
}

impl<W: Write> Emitter<W> {
    pub fn new(sink: EnvelopeSink<W>) -> Self {
        Self {
            sink,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self, status: StatusResponse) {
        self.emit(&Message::Status(status));
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(&Message::Log(LogResponse::new(level, message)));
    }

    pub fn log_response(&self, log: LogResponse) {
        self.emit(&Message::Log(log));
    }

    /// Stop writing for good. Used once the controller has hung up.
    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn emit(&self, message: &Message) {
        if self.is_muted() {
            return;
        }
        match self.sink.send(message) {
            Ok(()) => {}
            Err(err) if err.is_broken_pipe() => {
                tracing::debug!(kind = %message.kind(), "controller gone, muting output");
                self.mute();
            }
            Err(err) => {
                tracing::warn!(kind = %message.kind(), error = %err, "failed to send message");
            }
        }
    }
}
