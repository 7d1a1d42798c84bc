// ABOUTME: Tunnel dialer that reaches a destination through an SSH intermediary.
// ABOUTME: Owns the two-hop connection lifecycle: session, forwarded stream, teardown.

use crate::config::{HostConfig, SshConfig};
use crate::error::{Error, Result};
use crate::host_key::HostKeyPolicy;
use crate::resolver::{ResolvedEndpoint, Resolver};
use crate::ssh::RusshTransport;
use crate::transport::{ForwardedStream, SecureSession, SessionParams, Transport};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Configuration for constructing a [`TunnelDialer`].
pub struct DialerConfig<T = RusshTransport> {
    alias: String,
    /// If None, `~/.ssh/config` and `/etc/ssh/ssh_config` are read.
    host_config: Option<Arc<dyn HostConfig>>,
    /// If None, the current user's home directory is used.
    home_dir: Option<PathBuf>,
    host_key_policy: HostKeyPolicy,
    transport: T,
}

impl DialerConfig<RusshTransport> {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            host_config: None,
            home_dir: None,
            host_key_policy: HostKeyPolicy::default(),
            transport: RusshTransport::default(),
        }
    }
}

impl<T> DialerConfig<T> {
    pub fn host_config(mut self, config: impl HostConfig + 'static) -> Self {
        self.host_config = Some(Arc::new(config));
        self
    }

    pub fn home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn transport<U: Transport>(self, transport: U) -> DialerConfig<U> {
        DialerConfig {
            alias: self.alias,
            host_config: self.host_config,
            home_dir: self.home_dir,
            host_key_policy: self.host_key_policy,
            transport,
        }
    }
}

/// Lifecycle of a [`TunnelDialer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialerState {
    /// Constructed; no session has been opened.
    Idle,
    /// A session to the intermediary is up and the forwarded stream is
    /// being requested.
    SessionOpen,
    /// A forwarded stream is open and held as the current connection.
    StreamOpen,
    /// `close` was called. A later `dial` starts over.
    Closed,
}

/// A session and the destination it was opened for.
struct Connection {
    destination: String,
    session: Box<dyn SecureSession>,
}

impl Connection {
    async fn close(self) {
        if let Err(e) = self.session.close().await {
            tracing::warn!(
                "Failed to close SSH session for {}: {}",
                self.destination,
                e
            );
        }
    }
}

struct Inner {
    state: DialerState,
    current: Option<Connection>,
}

/// Holds the dialer in `SessionOpen` while a forward is requested.
struct SessionOpenGuard<'a> {
    inner: &'a Mutex<Inner>,
    prior: DialerState,
    armed: bool,
}

impl<'a> SessionOpenGuard<'a> {
    fn enter(inner: &'a Mutex<Inner>) -> Self {
        let prior = std::mem::replace(&mut inner.lock().state, DialerState::SessionOpen);
        Self {
            inner,
            prior,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SessionOpenGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // A concurrent close() wins over the restore.
        let mut inner = self.inner.lock();
        if inner.state == DialerState::SessionOpen {
            inner.state = self.prior;
        }
    }
}

/// Dials TCP destinations through an SSH intermediary.
///
/// The intermediary's parameters are resolved once, at construction. Each
/// successful [`dial`](Self::dial) opens a fresh session, hands the
/// forwarded stream to the caller and keeps the session alive until
/// [`close`](Self::close) or the next successful dial replaces it.
pub struct TunnelDialer<T = RusshTransport> {
    alias: String,
    endpoint: ResolvedEndpoint,
    host_key_policy: HostKeyPolicy,
    transport: T,
    inner: Mutex<Inner>,
}

impl<T> std::fmt::Debug for TunnelDialer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelDialer")
            .field("alias", &self.alias)
            .field("endpoint", &self.endpoint)
            .field("host_key_policy", &self.host_key_policy)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl TunnelDialer<RusshTransport> {
    /// Dialer for `alias` using the user's OpenSSH configuration.
    pub fn new(alias: impl Into<String>) -> Self {
        Self::from_config(DialerConfig::new(alias))
    }
}

impl<T: Transport> TunnelDialer<T> {
    pub fn from_config(config: DialerConfig<T>) -> Self {
        let home_dir = config.home_dir.or_else(dirs::home_dir);
        let host_config: Arc<dyn HostConfig> = match config.host_config {
            Some(host_config) => host_config,
            None => Arc::new(SshConfig::load_default(home_dir.as_deref())),
        };

        let endpoint = Resolver::new(home_dir).resolve(host_config.as_ref(), &config.alias);

        Self {
            alias: config.alias,
            endpoint,
            host_key_policy: config.host_key_policy,
            transport: config.transport,
            inner: Mutex::new(Inner {
                state: DialerState::Idle,
                current: None,
            }),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn endpoint(&self) -> &ResolvedEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> DialerState {
        self.inner.lock().state
    }

    /// Destination of the connection currently held, if any.
    pub fn current_destination(&self) -> Option<String> {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|conn| conn.destination.clone())
    }

    /// Open a stream to `destination` (`host:port`) through the intermediary.
    ///
    /// `retry` bounds the total time spent retrying transient failures. A
    /// zero duration makes exactly one attempt. Retries back off
    /// exponentially from 100ms, capped at 2s, and stop once the next wait
    /// would exceed the budget. Rejected host keys and credentials are
    /// never retried.
    pub async fn dial(&self, destination: &str, retry: Duration) -> Result<ForwardedStream> {
        let (host, port) = split_host_port(destination)?;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt: u32 = 1;

        loop {
            match self.dial_once(destination, &host, port).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_transient() && started.elapsed() + backoff <= retry => {
                    tracing::warn!(
                        "Dial to {} via {} failed (attempt {}), retrying in {:?}: {}",
                        destination,
                        self.alias,
                        attempt,
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dial_once(&self, destination: &str, host: &str, port: u16) -> Result<ForwardedStream> {
        let address = self.endpoint.address();
        let params = SessionParams {
            host: &self.endpoint.host,
            port: self.endpoint.port,
            user: &self.endpoint.user,
            auth_methods: &self.endpoint.auth_methods,
            host_key_policy: &self.host_key_policy,
            timeout: self.endpoint.connect_timeout(),
        };

        let session = self
            .transport
            .open_session(params)
            .await
            .map_err(|source| Error::Transport {
                address: address.clone(),
                source,
            })?;

        // Restores the prior state unless the forward succeeds, including
        // when this future is dropped mid-request.
        let guard = SessionOpenGuard::enter(&self.inner);

        let stream = match session.open_forwarded(host, port).await {
            Ok(stream) => stream,
            Err(source) => {
                if let Err(e) = session.close().await {
                    tracing::warn!("Failed to close SSH session to {}: {}", address, e);
                }
                drop(guard);
                return Err(Error::Forward {
                    destination: destination.to_string(),
                    via: address,
                    source,
                });
            }
        };

        guard.disarm();
        let previous = {
            let mut inner = self.inner.lock();
            inner.state = DialerState::StreamOpen;
            inner.current.replace(Connection {
                destination: destination.to_string(),
                session,
            })
        };

        tracing::debug!(destination, via = %address, "tunnel established");

        if let Some(previous) = previous {
            tracing::debug!(
                destination = %previous.destination,
                "closing connection replaced by new dial"
            );
            previous.close().await;
        }

        Ok(stream)
    }

    /// Close the current connection, if any.
    ///
    /// Safe to call before any dial and more than once.
    pub async fn close(&self) {
        let current = {
            let mut inner = self.inner.lock();
            inner.state = DialerState::Closed;
            inner.current.take()
        };

        match current {
            Some(conn) => {
                tracing::debug!(destination = %conn.destination, "closing tunnel");
                conn.close().await;
            }
            None => tracing::debug!(alias = %self.alias, "close with no open connection"),
        }
    }
}

impl<T: Transport + 'static> TunnelDialer<T> {
    /// Adapt the dialer to a `Fn(address) -> future` dial hook.
    ///
    /// Every call dials with the given retry budget; the shared dialer keeps
    /// ownership of the most recent connection.
    pub fn into_dial_fn(
        self: Arc<Self>,
        retry: Duration,
    ) -> impl Fn(String) -> BoxFuture<'static, Result<ForwardedStream>> + Send + Sync + 'static
    {
        move |destination: String| {
            let dialer = Arc::clone(&self);
            async move { dialer.dial(&destination, retry).await }.boxed()
        }
    }
}

/// Split `host:port`, accepting bracketed IPv6 literals.
fn split_host_port(address: &str) -> Result<(String, u16)> {
    let invalid = || Error::InvalidAddress(address.to_string());

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
        (host, port)
    } else {
        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        if host.contains(':') {
            return Err(invalid());
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}
