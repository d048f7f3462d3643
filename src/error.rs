//! Error handling for the polling loop.
//!
//! Only errors that end a cycle early are represented here. Non-ok statuses
//! on per-server queries are recovered where they happen and never leave the
//! server they belong to.

use thiserror::Error;
use ts3_query::{QueryError, Status};

/// Errors that abort one polling cycle. None of them stops the process.
#[derive(Debug, Error)]
pub enum PollError {
    /// The ServerQuery login was rejected.
    #[error("login as {username:?} rejected: {status}")]
    Authentication { username: String, status: Status },

    /// A command that the whole cycle depends on failed.
    #[error("{command} failed: {status}")]
    Protocol { command: String, status: Status },

    /// The connection broke or timed out; the session is discarded.
    #[error("transport error: {0}")]
    Transport(#[from] QueryError),
}

impl PollError {
    /// Get a static error code string for logging and metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Protocol { .. } => "protocol",
            Self::Transport(_) => "transport",
        }
    }
}

/// Result type for polling operations.
pub type PollResult<T> = Result<T, PollError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: u32, msg: &str) -> Status {
        Status {
            id,
            msg: msg.to_string(),
            extra_msg: None,
        }
    }

    #[test]
    fn test_authentication_display() {
        let err = PollError::Authentication {
            username: "serveradmin".to_string(),
            status: status(520, "invalid loginname or password"),
        };
        assert_eq!(
            err.to_string(),
            "login as \"serveradmin\" rejected: id=520 msg=invalid loginname or password"
        );
        assert_eq!(err.error_code(), "authentication");
    }

    #[test]
    fn test_transport_conversion() {
        let err: PollError = QueryError::ConnectionClosed.into();
        assert!(matches!(err, PollError::Transport(QueryError::ConnectionClosed)));
        assert_eq!(err.error_code(), "transport");
    }

    #[test]
    fn test_protocol_display() {
        let err = PollError::Protocol {
            command: "serverlist".to_string(),
            status: status(1024, "invalid serverID"),
        };
        assert_eq!(err.to_string(), "serverlist failed: id=1024 msg=invalid serverID");
    }
}
