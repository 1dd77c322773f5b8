//! IMAP connection management.
//!
//! This module provides connection handling for IMAP servers, including:
//! - Configuration (host, port, security mode)
//! - TLS/plaintext stream abstraction
//! - Framed I/O for IMAP protocol
//! - Type-state connection wrapper

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use config::{Config, Security};
pub use framed::FramedStream;
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};

use tracing::debug;

use crate::Result;

/// Connects to the server described by `config` and reads its greeting.
///
/// With [`Security::Implicit`] the TLS handshake happens first. With
/// [`Security::StartTls`] the greeting is read in plaintext, STARTTLS is
/// issued and the stream is upgraded before the client is returned, so
/// credentials never cross the wire unencrypted.
pub async fn connect(config: &Config) -> Result<Client<ImapStream, NotAuthenticated>> {
    debug!(host = %config.host, port = config.port, security = ?config.security, "connecting");
    match config.security {
        Security::Implicit => {
            let stream = connect_tls(&config.host, config.port).await?;
            Client::from_stream(stream, Some(config.io_timeout)).await
        }
        Security::StartTls => {
            let stream = connect_plain(&config.host, config.port).await?;
            let client = Client::from_stream(stream, Some(config.io_timeout)).await?;
            client.starttls(&config.host).await
        }
    }
}
