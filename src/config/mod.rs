// ABOUTME: Host-alias configuration sources for resolving dial parameters.
// ABOUTME: Defines the HostConfig lookup trait and its file and table backends.

mod ssh_config;
mod static_table;

pub use ssh_config::SshConfig;
pub use static_table::StaticHostConfig;

/// Configuration keys consumed when resolving a host alias.
pub mod keys {
    pub const PORT: &str = "Port";
    pub const USER: &str = "User";
    pub const CONNECT_TIMEOUT: &str = "ConnectTimeout";
    pub const PUBKEY_AUTHENTICATION: &str = "PubkeyAuthentication";
    pub const IDENTITY_FILE: &str = "IdentityFile";
}

/// Per-alias configuration lookup.
///
/// Returns an empty string when `key` is unset for `alias`. Keys are
/// matched case-insensitively by the bundled implementations.
pub trait HostConfig: Send + Sync {
    fn get(&self, alias: &str, key: &str) -> String;
}

impl<F> HostConfig for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn get(&self, alias: &str, key: &str) -> String {
        self(alias, key)
    }
}
