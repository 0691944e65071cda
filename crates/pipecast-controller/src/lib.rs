//! Controller side of pipecast.
//!
//! A [`Controller`] spawns the worker process, watches its diagnostic and
//! event streams from two reader threads, and exposes a [`MediaSender`] for
//! writing frames. Two [`Pacer`]s read raw audio and video from looping file
//! sources and send one frame per tick while the worker reports a live
//! connection. [`Controller::shutdown`] stops everything in a fixed order.

pub mod controller;
pub mod dispatch;
pub mod error;
pub mod pacer;
pub mod sender;
pub mod shutdown;
pub mod source;
pub mod state;

pub use controller::{Controller, WorkerCommand};
pub use dispatch::dispatch;
pub use error::{ControllerError, Result};
pub use pacer::{spawn_pacer, Pacer, PacerHandle, PacerStats, StopSignal, Tick};
pub use sender::{MediaSender, MediaSink};
pub use shutdown::{stop_and_close, ShutdownConfig, ShutdownReport, WorkerExit};
pub use source::LoopingSource;
pub use state::ConnectionState;
