//! Connection configuration types.

use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Start with plaintext, upgrade with STARTTLS before authenticating.
    StartTls,
    /// TLS from the start (port 993).
    #[default]
    Implicit,
}

impl Security {
    /// Picks the security mode for a port: 993 is implicit TLS, anything
    /// else is upgraded with STARTTLS.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        if port == 993 {
            Self::Implicit
        } else {
            Self::StartTls
        }
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Per-read timeout once connected.
    pub io_timeout: Duration,
}

impl Config {
    /// Creates a configuration whose security mode follows the port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::for_port(port),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Overrides the per-read timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}
