// ABOUTME: SSH transport error types.
// ABOUTME: Covers connection, host key, authentication, and channel open failures.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("host key rejected for {0}")]
    HostKeyRejected(String),

    #[error("authentication failed for user {user:?}: no offered key was accepted")]
    AuthenticationFailed { user: String },

    #[error("forwarding failed: {0}")]
    ForwardFailed(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

impl Error {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Rejections by the intermediary's policy (host key, credentials) are
    /// final; network-level failures and refused forwards are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::ForwardFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
