//! Error types for ipcmsg.
//!
//! Centralized error handling using thiserror. Every failure a single
//! invocation can hit is one of these kinds; none of them is retried.

use std::path::PathBuf;
use thiserror::Error;

/// All error types that can occur while locating a server or exchanging a
/// message with it.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Discovery exhausted every candidate socket without a match.
    #[error("no matching server found")]
    NoMatch,

    /// The resolved socket path did not exist at connect time.
    #[error("socket path does not exist: {}", path.display())]
    EndpointNotFound { path: PathBuf },

    /// Connecting to the socket was rejected by filesystem permissions.
    #[error("permission denied connecting to {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The connection closed, timed out, or came up short mid-frame. The
    /// in-flight request is failed as a whole; partial frames are never
    /// surfaced.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame carried structurally invalid data.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Result type alias for ipcmsg operations.
pub type Result<T> = std::result::Result<T, IpcError>;
