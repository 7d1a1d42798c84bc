// ABOUTME: Resolves a host alias into connection parameters and credentials.
// ABOUTME: Reads identity files, skipping any that fail to load.

use crate::config::{HostConfig, keys};
use russh::keys::{PrivateKey, decode_secret_key};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 22;
const HOME_MARKER: &str = "~";

/// A way of proving identity to the intermediary.
#[derive(Clone)]
pub enum AuthMethod {
    /// Public-key authentication, offering each key in order.
    ///
    /// May be empty when identity files were configured but none loaded.
    PublicKey(Vec<Arc<PrivateKey>>),
}

impl AuthMethod {
    pub fn key_count(&self) -> usize {
        match self {
            AuthMethod::PublicKey(keys) => keys.len(),
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey(keys) => f
                .debug_struct("PublicKey")
                .field("keys", &keys.len())
                .finish(),
        }
    }
}

/// Why a configured identity file contributed no key.
#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("failed to read key file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse private key: {0}")]
    Parse(#[from] russh::keys::Error),
}

/// Outcome of loading one configured identity file.
#[derive(Debug)]
pub struct KeyLoad {
    /// Path after home-directory expansion.
    pub path: PathBuf,
    pub result: std::result::Result<(), KeyLoadError>,
}

impl KeyLoad {
    pub fn is_loaded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Connection parameters for an intermediary, computed once per alias.
#[derive(Debug)]
pub struct ResolvedEndpoint {
    /// Network host. This is the alias itself; `HostName` is not consulted.
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Zero means no explicit timeout.
    pub timeout: Duration,
    pub auth_methods: Vec<AuthMethod>,
    /// One entry per identity file that was attempted.
    pub key_loads: Vec<KeyLoad>,
}

impl ResolvedEndpoint {
    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    pub fn keys_configured(&self) -> usize {
        self.key_loads.len()
    }

    pub fn keys_loaded(&self) -> usize {
        self.key_loads.iter().filter(|load| load.is_loaded()).count()
    }

    pub fn key_failures(&self) -> impl Iterator<Item = &KeyLoad> {
        self.key_loads.iter().filter(|load| !load.is_loaded())
    }
}

/// Builds [`ResolvedEndpoint`]s from a [`HostConfig`].
///
/// The home directory used to expand `~` in identity paths is an explicit
/// input so resolution does not depend on the process environment.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    home_dir: Option<PathBuf>,
}

impl Resolver {
    pub fn new(home_dir: Option<PathBuf>) -> Self {
        Self { home_dir }
    }

    /// Resolve `alias`. Never fails: gaps in the configuration fall back to
    /// defaults and unusable identity files are skipped.
    pub fn resolve(&self, config: &dyn HostConfig, alias: &str) -> ResolvedEndpoint {
        let port = parse_port(&config.get(alias, keys::PORT));
        let user = config.get(alias, keys::USER);
        let timeout = parse_timeout(&config.get(alias, keys::CONNECT_TIMEOUT));
        let (auth_methods, key_loads) = self.auth_methods(config, alias);

        let endpoint = ResolvedEndpoint {
            host: alias.to_string(),
            port,
            user,
            timeout,
            auth_methods,
            key_loads,
        };

        tracing::debug!(
            alias,
            address = %endpoint.address(),
            user = %endpoint.user,
            timeout = ?endpoint.timeout,
            keys_configured = endpoint.keys_configured(),
            keys_loaded = endpoint.keys_loaded(),
            "resolved SSH endpoint"
        );

        endpoint
    }

    fn auth_methods(
        &self,
        config: &dyn HostConfig,
        alias: &str,
    ) -> (Vec<AuthMethod>, Vec<KeyLoad>) {
        let mut methods = Vec::new();
        let mut loads = Vec::new();

        if config.get(alias, keys::PUBKEY_AUTHENTICATION) == "yes" {
            let mut signers = Vec::new();
            let identity_files = config.get(alias, keys::IDENTITY_FILE);

            for entry in identity_files.split(',').filter(|entry| !entry.is_empty()) {
                let path = PathBuf::from(self.expand_home(entry));
                let result = match load_key(&path) {
                    Ok(key) => {
                        signers.push(Arc::new(key));
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("Skipping identity file {}: {}", path.display(), e);
                        Err(e)
                    }
                };
                loads.push(KeyLoad { path, result });
            }

            // Appended even when empty: an empty method offers no keys, which
            // the transport reports as an authentication failure.
            methods.push(AuthMethod::PublicKey(signers));
        }

        (methods, loads)
    }

    /// Replace every `~` in `path` with the home directory.
    ///
    /// Paths are returned unchanged when no home directory is known.
    pub fn expand_home(&self, path: &str) -> String {
        match &self.home_dir {
            Some(home) => path.replace(HOME_MARKER, &home.to_string_lossy()),
            None => path.to_string(),
        }
    }
}

fn load_key(path: &std::path::Path) -> std::result::Result<PrivateKey, KeyLoadError> {
    let bytes = std::fs::read(path)?;
    let contents = String::from_utf8(bytes).map_err(russh::keys::Error::from)?;
    Ok(decode_secret_key(&contents, None)?)
}

/// Parse a `ConnectTimeout` value in whole seconds.
///
/// Anything other than a plain non-negative integer yields zero.
pub fn parse_timeout(value: &str) -> Duration {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Duration::ZERO;
    }
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

fn parse_port(value: &str) -> u16 {
    match value.parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            if !value.is_empty() {
                tracing::debug!(value, "invalid Port, using default");
            }
            DEFAULT_PORT
        }
    }
}

pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
