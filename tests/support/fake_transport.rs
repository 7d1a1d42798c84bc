// ABOUTME: In-memory Transport used to drive the dialer without an SSH server.
// ABOUTME: Scripts unreachable intermediaries, rejected keys, and refused destinations.

use super::FIXTURE_KEY;
use async_trait::async_trait;
use parking_lot::Mutex;
use russh::keys::decode_secret_key;
use sshproxy::ssh::{Error, Result};
use sshproxy::transport::{ForwardedStream, SecureSession, SessionParams, Transport};
use sshproxy::HostKeyCheck;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What the fake intermediary saw when a session was opened.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub address: String,
    pub user: String,
    pub timeout: Option<Duration>,
    pub keys_offered: usize,
    closed: Arc<AtomicBool>,
}

impl SessionRecord {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Script {
    reject_keys: bool,
    unreachable_for: usize,
    refused: Vec<String>,
    stalled: Vec<String>,
    attempts: usize,
    sessions: Vec<SessionRecord>,
}

/// Fake intermediary. Clones share state, so a test can keep one handle
/// while the dialer owns another.
#[derive(Clone, Default)]
pub struct FakeTransport {
    script: Arc<Mutex<Script>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every offered key.
    pub fn rejecting_keys(self) -> Self {
        self.script.lock().reject_keys = true;
        self
    }

    /// Fail the first `attempts` connection attempts as unreachable.
    pub fn unreachable_for(self, attempts: usize) -> Self {
        self.script.lock().unreachable_for = attempts;
        self
    }

    /// Refuse forwarding to `destination` (`host:port`).
    pub fn refusing(self, destination: &str) -> Self {
        self.script.lock().refused.push(destination.to_string());
        self
    }

    /// Never answer forwarding requests to `destination`.
    pub fn stalling(self, destination: &str) -> Self {
        self.script.lock().stalled.push(destination.to_string());
        self
    }

    pub fn attempts(&self) -> usize {
        self.script.lock().attempts
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.script.lock().sessions.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_session(&self, params: SessionParams<'_>) -> Result<Box<dyn SecureSession>> {
        let address = format!("{}:{}", params.host, params.port);
        let mut script = self.script.lock();
        script.attempts += 1;

        if script.attempts <= script.unreachable_for {
            return Err(Error::Connection(format!("{}: network unreachable", address)));
        }

        let host_key = decode_secret_key(FIXTURE_KEY, None).expect("fixture key parses");
        let check = HostKeyCheck {
            host: params.host,
            port: params.port,
            key: host_key.public_key(),
        };
        if !params.host_key_policy.verify(&check) {
            return Err(Error::HostKeyRejected(address));
        }

        let keys_offered: usize = params.auth_methods.iter().map(|m| m.key_count()).sum();
        if script.reject_keys || keys_offered == 0 {
            return Err(Error::AuthenticationFailed {
                user: params.user.to_string(),
            });
        }

        let closed = Arc::new(AtomicBool::new(false));
        script.sessions.push(SessionRecord {
            address,
            user: params.user.to_string(),
            timeout: params.timeout,
            keys_offered,
            closed: Arc::clone(&closed),
        });

        Ok(Box::new(FakeSession {
            refused: script.refused.clone(),
            stalled: script.stalled.clone(),
            closed,
            far_ends: Mutex::new(Vec::new()),
        }))
    }
}

struct FakeSession {
    refused: Vec<String>,
    stalled: Vec<String>,
    closed: Arc<AtomicBool>,
    /// Echo tasks owning the far half of each stream handed out.
    far_ends: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl SecureSession for FakeSession {
    async fn open_forwarded(&self, host: &str, port: u16) -> Result<ForwardedStream> {
        let destination = format!("{}:{}", host, port);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ForwardFailed("session closed".to_string()));
        }
        if self.refused.contains(&destination) {
            return Err(Error::ForwardFailed(format!(
                "{}: connection refused",
                destination
            )));
        }
        if self.stalled.contains(&destination) {
            std::future::pending::<()>().await;
        }

        // The far end echoes whatever it receives.
        let (near, far) = tokio::io::duplex(4096);
        let echo = tokio::spawn(async move {
            let (mut reader, mut writer) = tokio::io::split(far);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        });
        self.far_ends.lock().push(echo);

        Ok(Box::new(near))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Aborting drops the far halves, so callers see end of stream.
        for echo in self.far_ends.lock().drain(..) {
            echo.abort();
        }
        Ok(())
    }
}
