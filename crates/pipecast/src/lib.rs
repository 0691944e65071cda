//! Paced raw audio/video publishing through a supervised worker process.
//!
//! A controller process reads raw PCM and YUV 4:2:0 files, paces them at
//! their natural frame rates and streams them as length-prefixed envelopes
//! into a worker process, which owns the real-time transport connection and
//! reports connection state back.
//!
//! # Crate Structure
//!
//! - [`transport`] - Worker process spawning and stdout reservation
//! - [`frame`] - Length-prefixed framing over byte streams
//! - [`protocol`] - Envelope schema, session configuration, stream endpoints
//! - [`worker`] - Worker runtime behind a transport SDK trait
//! - [`controller`] - Worker supervision, frame pacers, ordered shutdown

/// Re-export transport types.
pub mod transport {
    pub use pipecast_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipecast_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use pipecast_protocol::*;
}

/// Re-export worker types.
pub mod worker {
    pub use pipecast_worker::*;
}

/// Re-export controller types.
pub mod controller {
    pub use pipecast_controller::*;
}
