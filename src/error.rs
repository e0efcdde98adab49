//! Error taxonomy for the entry stream
//!
//! Errors are scoped: entry-scoped failures are reported and the session
//! moves on to the next frame, session-scoped failures end the connection,
//! startup failures end the process.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("unsafe path rejected: {path:?} ({reason})")]
    UnsafePath { path: String, reason: &'static str },

    #[error("entry {path:?} failed: {message}")]
    Entry { path: String, message: String },

    #[error("size mismatch for {path:?}: expected {expected} bytes, received {received}")]
    SizeMismatch {
        path: String,
        expected: u64,
        received: u64,
    },

    #[error("stream error: {0}")]
    Stream(#[from] io::Error),

    #[error("stream desynchronized: {0}")]
    Desync(String),

    #[error("startup failed: {0}")]
    Startup(String),
}

impl TransferError {
    pub fn unsafe_path(path: &str, reason: &'static str) -> Self {
        Self::UnsafePath {
            path: path.to_string(),
            reason,
        }
    }

    pub fn entry(path: &str, message: impl ToString) -> Self {
        Self::Entry {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// The wire path (or unknown marker) the error is about, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnsafePath { path, .. }
            | Self::Entry { path, .. }
            | Self::SizeMismatch { path, .. } => Some(path),
            Self::Stream(_) | Self::Desync(_) | Self::Startup(_) => None,
        }
    }

    /// True when the connection cannot be read any further.
    ///
    /// `SizeMismatch` is only raised once the stream has ended early, so it
    /// ends the session as well.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::Stream(_) | Self::Desync(_) | Self::SizeMismatch { .. } | Self::Startup(_)
        )
    }
}
