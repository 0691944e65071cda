//! Worker side of pipecast.
//!
//! The worker owns one connection to a real-time media transport. It reads
//! commands from its input stream, pushes media frames into the connection,
//! and reports connection lifecycle events back on its output stream.
//!
//! The transport itself is reached only through the [`RtcBackend`] and
//! [`RtcConnection`] traits. Lifecycle callbacks are delivered by the backend
//! through an [`EventSender`] onto a queue drained by a single event pump
//! thread, which shares the output writer lock with the command loop.

pub mod backend;
pub mod emitter;
pub mod error;
pub mod event;
mod pump;
mod session;
pub mod runtime;
pub mod sim;
pub mod state;

pub use backend::{check, AudioFrame, RtcBackend, RtcCode, RtcConnection, RtcResult, VideoFrame};
pub use emitter::Emitter;
pub use error::{Result, SetupStep, WorkerError};
pub use event::{report_for, ConnectionEvent, EventReport, EventSender};
pub use runtime::{ExitReason, PushStats, WorkerRuntime};
pub use sim::{SimulatedBackend, SimulatedCall};
pub use state::WorkerState;
