//! Byte-stream transport between a pipecast controller and its worker.
//!
//! The controller spawns the worker with three pipes (command input, event
//! output, diagnostics). The worker speaks the protocol over its own
//! stdin/stdout after reserving stdout so nothing else can write to it.
//!
//! This is the lowest layer of pipecast. Framing lives in `pipecast-frame`.

pub mod error;
pub mod process;
pub mod stdio;

pub use error::{Result, TransportError};
pub use process::{WorkerPipes, WorkerProcess};
pub use stdio::reserve_stdout;
