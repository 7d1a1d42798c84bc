// ABOUTME: Host key verification policies for the intermediary's SSH identity.
// ABOUTME: Built-in accept-all and deny-all policies plus a custom callback.

use russh::keys::ssh_key::PublicKey;
use std::fmt;
use std::sync::Arc;

/// The identity presented by the intermediary during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct HostKeyCheck<'a> {
    pub host: &'a str,
    pub port: u16,
    pub key: &'a PublicKey,
}

type VerifyFn = dyn Fn(&HostKeyCheck<'_>) -> bool + Send + Sync;

/// Decides whether to trust the intermediary's host key.
#[derive(Clone, Default)]
pub enum HostKeyPolicy {
    /// Trust any host key.
    #[default]
    AcceptAll,
    /// Reject every host key, so no session can be established.
    DenyAll,
    /// Caller-supplied verification, e.g. backed by a trust store.
    Custom(Arc<VerifyFn>),
}

impl HostKeyPolicy {
    pub fn custom<F>(verify: F) -> Self
    where
        F: Fn(&HostKeyCheck<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(verify))
    }

    pub fn verify(&self, check: &HostKeyCheck<'_>) -> bool {
        match self {
            HostKeyPolicy::AcceptAll => true,
            HostKeyPolicy::DenyAll => false,
            HostKeyPolicy::Custom(verify) => verify(check),
        }
    }
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKeyPolicy::AcceptAll => f.write_str("AcceptAll"),
            HostKeyPolicy::DenyAll => f.write_str("DenyAll"),
            HostKeyPolicy::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}
