//! Server error types.

use std::io;

use thiserror::Error;

/// Errors that stop a listener or the server as a whole.
///
/// Per-session transport failures never surface here; they end the session
/// through the regular quit path.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket setup or a listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The dispatcher loop is no longer accepting connections.
    #[error("dispatcher stopped")]
    DispatcherGone,
}
