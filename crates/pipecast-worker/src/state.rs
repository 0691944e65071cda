use std::fmt;

/// Where one worker session is in its lifecycle.
///
/// ```text
/// Idle -> Connecting -> Connected <-> Reconnecting
///                           |
///                 Disconnected / Failed -> Closed
/// ```
///
/// `Closed` is terminal: later transitions are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
    Closed,
}

impl WorkerState {
    /// Apply a transition, returning the resulting state.
    pub fn transition(self, next: WorkerState) -> WorkerState {
        if self == WorkerState::Closed {
            return self;
        }
        next
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Connecting => "connecting",
            WorkerState::Connected => "connected",
            WorkerState::Reconnecting => "reconnecting",
            WorkerState::Disconnected => "disconnected",
            WorkerState::Failed => "failed",
            WorkerState::Closed => "closed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
