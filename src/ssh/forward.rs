// ABOUTME: SSH TCP forwarding through an established session.
// ABOUTME: Opens direct-tcpip channels and exposes them as byte streams.

use super::client::TunnelHandler;
use super::error::{Error, Result};
use crate::transport::ForwardedStream;
use russh::client::Handle;

/// Originator reported to the intermediary for forwarded channels.
///
/// The stream does not originate from a listening socket, so the
/// unspecified address and port zero are sent.
const ORIGINATOR_ADDRESS: &str = "0.0.0.0";
const ORIGINATOR_PORT: u32 = 0;

/// Ask the intermediary to connect to `host:port` and return the channel as
/// a stream.
pub(crate) async fn open_direct_tcpip(
    handle: &Handle<TunnelHandler>,
    host: &str,
    port: u16,
) -> Result<ForwardedStream> {
    let channel = handle
        .channel_open_direct_tcpip(host, u32::from(port), ORIGINATOR_ADDRESS, ORIGINATOR_PORT)
        .await
        .map_err(|e| {
            Error::ForwardFailed(format!(
                "failed to open direct-tcpip channel to {}:{}: {}",
                host, port, e
            ))
        })?;

    tracing::debug!(host, port, "forwarded stream opened");

    Ok(Box::new(channel.into_stream()))
}
