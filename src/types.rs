//! Shared error type.

use std::fmt;
use std::io;

/// Errors that can occur while proxying or exercising serial devices
#[derive(Debug)]
pub enum SproxyError {
    /// Transport layer error (serial device, pseudo-terminal)
    Transport(String),
    /// Invalid or missing configuration
    Config(String),
    /// Operating system error outside the transport itself
    Io(io::Error),
}

impl fmt::Display for SproxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SproxyError::Transport(msg) => write!(f, "transport error: {msg}"),
            SproxyError::Config(msg) => write!(f, "configuration error: {msg}"),
            SproxyError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for SproxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SproxyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SproxyError {
    fn from(err: io::Error) -> Self {
        SproxyError::Io(err)
    }
}
