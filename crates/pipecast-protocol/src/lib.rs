//! Message schema for the pipecast controller/worker protocol.
//!
//! Every frame on a pipe carries one [`Envelope`]: a message type, a payload
//! type and opaque payload bytes. [`Message`] is the typed view of an
//! envelope, one variant per message kind.
//!
//! | Kind | Direction | Payload |
//! |---|---|---|
//! | `WriteVideoSample` | controller → worker | [`MediaSample`] |
//! | `WriteAudioSample` | controller → worker | [`MediaSample`] |
//! | `Close` | controller → worker | none |
//! | `StatusResponse` | worker → controller | [`StatusResponse`] |
//! | `LogResponse` | worker → controller | [`LogResponse`] |

pub mod config;
pub mod envelope;
pub mod error;
pub mod kind;
pub mod message;
pub mod payload;
pub mod status;
pub mod stream;

pub use config::{AudioConfig, MediaKind, SessionConfig, VideoCodec, VideoConfig};
pub use envelope::{Envelope, ENVELOPE_HEADER_SIZE};
pub use error::{ProtocolError, Result};
pub use kind::{MessageKind, PayloadKind};
pub use message::Message;
pub use payload::{LogResponse, MediaSample, StatusResponse};
pub use status::{ConnectionStatus, LogLevel};
pub use stream::{EnvelopeReader, EnvelopeSink};
