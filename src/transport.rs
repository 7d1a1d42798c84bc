// ABOUTME: Transport seam between the tunnel dialer and an SSH implementation.
// ABOUTME: Defines secure sessions and the forwarded byte streams they open.

use crate::host_key::HostKeyPolicy;
use crate::resolver::AuthMethod;
use crate::ssh::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub trait ForwardedIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ForwardedIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A byte stream to the destination, carried inside a secure session.
pub type ForwardedStream = Box<dyn ForwardedIo>;

/// Everything needed to authenticate to the intermediary.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub auth_methods: &'a [AuthMethod],
    pub host_key_policy: &'a HostKeyPolicy,
    /// `None` leaves the transport's own default in place.
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and authenticate to the intermediary.
    async fn open_session(&self, params: SessionParams<'_>) -> Result<Box<dyn SecureSession>>;
}

/// An authenticated, encrypted connection to the intermediary.
#[async_trait]
pub trait SecureSession: Send + Sync {
    /// Ask the intermediary to open a TCP stream to `host:port`.
    async fn open_forwarded(&self, host: &str, port: u16) -> Result<ForwardedStream>;

    /// Tear down the session and every stream opened through it.
    async fn close(&self) -> Result<()>;
}
