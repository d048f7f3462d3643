//! Error types for the ServerQuery client.
//!
//! Protocol-level failures reported by the server (a non-zero `error id=`)
//! are *not* errors at this layer: they come back as a [`crate::Status`] inside
//! a [`crate::Response`] so callers can decide how far a failure should reach.
//! Everything here means the session itself is unusable.

use std::time::Duration;

use thiserror::Error;

/// Convenience type alias for Results using [`QueryError`].
pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Transport and framing errors of a ServerQuery session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    /// I/O error during connect, read or write.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server did not answer within the configured timeout.
    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A line exceeded the maximum accepted length.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Actual length in bytes.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },

    /// A line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos}")]
    InvalidUtf8 {
        /// Byte position of the first invalid sequence.
        byte_pos: usize,
    },

    /// The first line after connecting was not the ServerQuery banner.
    #[error("unexpected banner {0:?}, not a ServerQuery endpoint")]
    UnexpectedBanner(String),

    /// An `error` status line could not be parsed.
    #[error("malformed status line: {0:?}")]
    MalformedStatus(String),
}
