//! Where and how to connect.

use std::time::Duration;

/// Transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP. Only for local relays and tests.
    None,
    /// TLS from the first byte (IMAPS).
    #[default]
    Implicit,
}

/// Server address and timeouts.
///
/// ```ignore
/// let config = Config::new("localhost")
///     .with_security(Security::None)
///     .with_port(1143);
/// assert_eq!(config.port(), 1143);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, also used for TLS name verification.
    pub host: String,
    /// Explicit port; `None` means the standard port for `security`.
    pub port: Option<u16>,
    /// Transport security.
    pub security: Security,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on each command's round trip.
    pub command_timeout: Duration,
}

impl Config {
    /// IMAPS on the standard port, 30 s connect and 60 s command timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }

    /// Port to dial: the explicit one, else 993 for TLS and 143 for plain.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match (self.port, self.security) {
            (Some(port), _) => port,
            (None, Security::Implicit) => 993,
            (None, Security::None) => 143,
        }
    }

    /// Overrides the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets transport security.
    #[must_use]
    pub const fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_ports() {
        let tls = Config::new("imap.example.com");
        assert_eq!(tls.port(), 993);
        assert_eq!(tls.command_timeout, Duration::from_secs(60));

        let plain = Config::new("localhost").with_security(Security::None);
        assert_eq!(plain.port(), 143);
    }

    #[test]
    fn test_explicit_port_survives_security_change() {
        let config = Config::new("localhost")
            .with_port(1993)
            .with_security(Security::None)
            .with_command_timeout(Duration::from_secs(5));
        assert_eq!(config.port(), 1993);
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }
}
