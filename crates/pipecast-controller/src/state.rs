use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pipecast_protocol::ConnectionStatus;

use crate::error::{ControllerError, Result};

#[derive(Debug, Default)]
struct Flags {
    connected: bool,
    closing: bool,
    worker_gone: bool,
}

/// The controller's view of the worker's connection.
///
/// Clones share one flag set. The lock is held only for the flag update
/// itself, never across I/O.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    inner: Arc<(Mutex<Flags>, Condvar)>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a worker status and return the resulting connected flag.
    ///
    /// `connected` sets the flag, `disconnected`, `failed` and
    /// `connection-lost` clear it, and every other status leaves it alone.
    pub fn apply(&self, status: ConnectionStatus) -> bool {
        let mut flags = self.lock();
        if let Some(connected) = status.connected_effect() {
            flags.connected = connected && !flags.closing;
            if flags.connected {
                self.inner.1.notify_all();
            }
        }
        flags.connected
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Clear the flag for good. Pacers stop sending and waiters return.
    pub fn begin_close(&self) {
        let mut flags = self.lock();
        flags.closing = true;
        flags.connected = false;
        self.inner.1.notify_all();
    }

    pub fn is_closing(&self) -> bool {
        self.lock().closing
    }

    /// Record that the worker's event stream has ended.
    pub fn mark_worker_gone(&self) {
        let mut flags = self.lock();
        flags.worker_gone = true;
        flags.connected = false;
        self.inner.1.notify_all();
    }

    pub fn is_worker_gone(&self) -> bool {
        self.lock().worker_gone
    }

    /// Block until the worker reports `connected`, or `timeout` elapses.
    pub fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        let guard = self.lock();
        let (flags, _) = self
            .inner
            .1
            .wait_timeout_while(guard, timeout, |f| {
                !f.connected && !f.closing && !f.worker_gone
            })
            .unwrap_or_else(PoisonError::into_inner);

        if flags.connected {
            Ok(())
        } else if flags.closing {
            Err(ControllerError::Closing)
        } else if flags.worker_gone {
            Err(ControllerError::WorkerExited)
        } else {
            Err(ControllerError::ConnectTimeout(timeout))
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
