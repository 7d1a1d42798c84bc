// ABOUTME: Library root for sshproxy - dial TCP connections through an SSH intermediary.
// ABOUTME: Re-exports the dialer, configuration sources, and transport seam.

pub mod config;
pub mod dialer;
pub mod error;
pub mod host_key;
pub mod resolver;
pub mod ssh;
pub mod transport;

pub use config::{HostConfig, SshConfig, StaticHostConfig};
pub use dialer::{DialerConfig, DialerState, TunnelDialer};
pub use error::{Error, Result};
pub use host_key::{HostKeyCheck, HostKeyPolicy};
pub use resolver::{AuthMethod, KeyLoad, KeyLoadError, ResolvedEndpoint, Resolver};
pub use ssh::RusshTransport;
pub use transport::{ForwardedStream, SecureSession, SessionParams, Transport};
