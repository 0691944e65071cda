use std::fmt;

use serde::Serialize;

/// Connection-state values reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionStatus {
    InitializedSuccess = 0,
    InitializedFailure = 1,
    Connected = 2,
    Disconnected = 3,
    Connecting = 4,
    Reconnecting = 5,
    Reconnected = 6,
    ConnectionLost = 7,
    Failed = 8,
    TokenWillExpire = 9,
    TokenExpired = 10,
}

impl ConnectionStatus {
    pub fn from_wire(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::InitializedSuccess,
            1 => Self::InitializedFailure,
            2 => Self::Connected,
            3 => Self::Disconnected,
            4 => Self::Connecting,
            5 => Self::Reconnecting,
            6 => Self::Reconnected,
            7 => Self::ConnectionLost,
            8 => Self::Failed,
            9 => Self::TokenWillExpire,
            10 => Self::TokenExpired,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Effect of this status on the controller's connected flag.
    ///
    /// `Some(true)` sets it, `Some(false)` clears it, `None` leaves it alone.
    pub fn connected_effect(self) -> Option<bool> {
        match self {
            Self::Connected => Some(true),
            Self::Disconnected | Self::Failed | Self::ConnectionLost => Some(false),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InitializedSuccess => "INITIALIZED_SUCCESS",
            Self::InitializedFailure => "INITIALIZED_FAILURE",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Reconnecting => "RECONNECTING",
            Self::Reconnected => "RECONNECTED",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::Failed => "FAILED",
            Self::TokenWillExpire => "TOKEN_WILL_EXPIRE",
            Self::TokenExpired => "TOKEN_EXPIRED",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Severity of a worker log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Warn),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
