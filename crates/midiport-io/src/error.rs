//! Error types for the MIDI port layer.

use thiserror::Error;

/// Failure reported by a native backend, carrying the backend's own message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("native MIDI backend error: {message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Misuse of a port: destroyed, unsupported on this platform, stale
    /// descriptor that no longer resolves, duplicate callback.
    #[error("MIDI port error: {0}")]
    Port(String),

    #[error(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    Message(#[from] midiport_core::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn destroyed() -> Self {
        Error::Port("port already destroyed".to_string())
    }

    pub fn is_port_error(&self) -> bool {
        matches!(self, Error::Port(_))
    }

    pub fn is_native_error(&self) -> bool {
        matches!(self, Error::Native(_))
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for NativeError {
    fn from(e: midir::InitError) -> Self {
        NativeError::new(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::PortInfoError> for NativeError {
    fn from(e: midir::PortInfoError) -> Self {
        NativeError::new(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::SendError> for NativeError {
    fn from(e: midir::SendError) -> Self {
        NativeError::new(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
