// ABOUTME: SSH session establishment using russh.
// ABOUTME: Handles connection, host key policy, and public-key authentication.

use super::error::{Error, Result};
use crate::host_key::{HostKeyCheck, HostKeyPolicy};
use crate::resolver::{AuthMethod, join_host_port};
use crate::transport::{ForwardedStream, SecureSession, SessionParams, Transport};
use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::Disconnect;
use std::sync::Arc;

/// SSH client handler for russh.
pub(crate) struct TunnelHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl TunnelHandler {
    fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

impl client::Handler for TunnelHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let accepted = self.policy.verify(&HostKeyCheck {
            host: &self.host,
            port: self.port,
            key: server_public_key,
        });
        if !accepted {
            tracing::warn!(
                "Host key for {}:{} rejected by {:?} policy",
                self.host,
                self.port,
                self.policy
            );
        }
        Ok(accepted)
    }
}

/// [`Transport`] backed by russh.
#[derive(Clone)]
pub struct RusshTransport {
    config: Arc<Config>,
}

impl Default for RusshTransport {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for RusshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshTransport")
            .field("config", &"<russh::client::Config>")
            .finish()
    }
}

impl RusshTransport {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn connect(&self, params: &SessionParams<'_>) -> Result<Handle<TunnelHandler>> {
        let address = join_host_port(params.host, params.port);
        let handler = TunnelHandler::new(
            params.host.to_string(),
            params.port,
            params.host_key_policy.clone(),
        );

        let connecting = client::connect(
            Arc::clone(&self.config),
            (params.host, params.port),
            handler,
        );

        let connected = match params.timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => connecting.await,
        };

        connected.map_err(|e| match e {
            russh::Error::UnknownKey => Error::HostKeyRejected(address.clone()),
            other => Error::Connection(format!("{}: {}", address, other)),
        })
    }

    /// Offer each key of each method in order until one is accepted.
    async fn authenticate(
        session: &mut Handle<TunnelHandler>,
        user: &str,
        methods: &[AuthMethod],
    ) -> Result<()> {
        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .map_err(Error::Protocol)?
            .flatten();

        for method in methods {
            match method {
                AuthMethod::PublicKey(keys) => {
                    for key in keys {
                        let result = session
                            .authenticate_publickey(
                                user,
                                PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                            )
                            .await
                            .map_err(Error::Protocol)?;

                        if result.success() {
                            return Ok(());
                        }
                        tracing::debug!(
                            user,
                            algorithm = %key.algorithm(),
                            "public key rejected"
                        );
                    }
                }
            }
        }

        Err(Error::AuthenticationFailed {
            user: user.to_string(),
        })
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open_session(&self, params: SessionParams<'_>) -> Result<Box<dyn SecureSession>> {
        let mut handle = self.connect(&params).await?;
        Self::authenticate(&mut handle, params.user, params.auth_methods).await?;

        tracing::debug!(
            host = params.host,
            port = params.port,
            user = params.user,
            "SSH session established"
        );

        Ok(Box::new(RusshSession {
            address: join_host_port(params.host, params.port),
            handle,
        }))
    }
}

/// An established russh session to the intermediary.
pub(crate) struct RusshSession {
    address: String,
    handle: Handle<TunnelHandler>,
}

#[async_trait]
impl SecureSession for RusshSession {
    async fn open_forwarded(&self, host: &str, port: u16) -> Result<ForwardedStream> {
        super::forward::open_direct_tcpip(&self.handle, host, port).await
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(address = %self.address, "disconnecting SSH session");
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}
