// ABOUTME: Crate-wide error types for sshproxy.
// ABOUTME: Distinguishes which hop of a tunnelled dial failed.

use crate::ssh;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The secure session to the intermediary could not be established.
    #[error("failed to establish SSH session to {address}: {source}")]
    Transport {
        address: String,
        #[source]
        source: ssh::Error,
    },

    /// The intermediary could not open the stream to the destination.
    #[error("failed to open forwarded stream to {destination} via {via}: {source}")]
    Forward {
        destination: String,
        via: String,
        #[source]
        source: ssh::Error,
    },

    #[error("invalid destination address: {0:?}")]
    InvalidAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Error::Transport { source, .. } | Error::Forward { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
