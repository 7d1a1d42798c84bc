// ABOUTME: In-process russh server for exercising the real SSH transport.
// ABOUTME: Accepts the fixture key for one user and echoes direct-tcpip channels.

use super::FIXTURE_KEY;
use russh::keys::{PrivateKey, PublicKey, decode_secret_key};
use russh::server::{self, Auth, Msg, Session};
use russh::Channel;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The only user the server lets in.
pub const SERVER_USER: &str = "ops";

/// A listening SSH server on the loopback interface.
///
/// The server's host key and the single authorized client key are both the
/// fixture key. Dropping the server stops accepting new connections.
pub struct TestServer {
    addr: SocketAddr,
    host_key: PublicKey,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    /// Start a server that refuses forwarding to each `host:port` in `refused`.
    pub async fn start(refused: &[&str]) -> Self {
        let key = fixture_key();
        let host_key = key.public_key().clone();

        let config = Arc::new(server::Config {
            keys: vec![key.clone()],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");

        let authorized = key.public_key().clone();
        let refused: Vec<String> = refused.iter().map(|d| d.to_string()).collect();

        let accept_loop = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = ForwardingHandler {
                    authorized: authorized.clone(),
                    refused: refused.clone(),
                };
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, socket, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Self {
            addr,
            host_key,
            accept_loop,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn host_key(&self) -> &PublicKey {
        &self.host_key
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// A TCP listener that accepts connections and never speaks SSH.
pub struct SilentListener {
    addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl SilentListener {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");

        let accept_loop = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        Self { addr, accept_loop }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for SilentListener {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    listener.local_addr().expect("listener address").port()
}

pub fn fixture_key() -> PrivateKey {
    decode_secret_key(FIXTURE_KEY, None).expect("fixture key parses")
}

struct ForwardingHandler {
    authorized: PublicKey,
    refused: Vec<String>,
}

impl server::Handler for ForwardingHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if user == SERVER_USER && public_key.key_data() == self.authorized.key_data() {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let destination = format!("{}:{}", host_to_connect, port_to_connect);
        if self.refused.contains(&destination) {
            return Ok(false);
        }

        // The destination is simulated by echoing the channel back.
        tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(channel.into_stream());
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        Ok(true)
    }
}
