use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pipecast_protocol::SessionConfig;

use crate::backend::RtcConnection;
use crate::state::WorkerState;

/// State shared by the command loop and the event pump.
pub(crate) struct Session {
    pub(crate) config: SessionConfig,
    connection: Mutex<Option<Arc<dyn RtcConnection>>>,
    state: Mutex<WorkerState>,
}

impl Session {
    pub(crate) fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            state: Mutex::new(WorkerState::Idle),
        }
    }

    /// Current connection, if one is live.
    pub(crate) fn connection(&self) -> Option<Arc<dyn RtcConnection>> {
        lock(&self.connection).clone()
    }

    pub(crate) fn attach(&self, connection: Arc<dyn RtcConnection>) {
        *lock(&self.connection) = Some(connection);
    }

    /// Detach the connection so no new work reaches it.
    pub(crate) fn detach(&self) -> Option<Arc<dyn RtcConnection>> {
        lock(&self.connection).take()
    }

    pub(crate) fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, next: WorkerState) -> WorkerState {
        let mut state = lock(&self.state);
        let from = *state;
        *state = from.transition(next);
        if *state != from {
            tracing::debug!(from = %from, to = %*state, "session state changed");
        }
        *state
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
