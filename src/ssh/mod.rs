// ABOUTME: SSH transport built on russh.
// ABOUTME: Connects to the intermediary, authenticates, and opens forwarded TCP streams.

mod client;
mod error;
mod forward;

pub use client::RusshTransport;
pub use error::{Error, Result};
