//! Client errors.

use std::time::Duration;

/// Client result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket failure, including TLS failures surfaced by the stream.
    #[error("connection: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration failure.
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    /// Host is not usable as a TLS server name.
    #[error("host is not a valid TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Tagged `NO`.
    #[error("server refused: {0}")]
    No(String),

    /// Tagged `BAD`.
    #[error("server rejected command: {0}")]
    Bad(String),

    /// Untagged `BYE`; the server is closing the connection.
    #[error("server closed session: {0}")]
    Bye(String),

    /// No complete reply within the command timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Reply that does not follow the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An earlier command was abandoned partway through its reply.
    #[error("session out of sync after an unfinished reply")]
    Desynchronized,
}

impl Error {
    /// True if the session is unusable after this error.
    ///
    /// A timeout leaves the rest of the reply unread on the stream, so it
    /// ends the session like a transport failure or `BYE`. `NO`, `BAD` and
    /// garbled replies fail just the command.
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::InvalidDnsName(_)
                | Self::Bye(_)
                | Self::Timeout(_)
                | Self::Desynchronized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ending_errors() {
        let reset = Error::Io(std::io::ErrorKind::ConnectionReset.into());
        assert!(reset.is_connection_failure());
        assert!(Error::Bye("maintenance".into()).is_connection_failure());
        assert!(Error::Timeout(Duration::from_secs(1)).is_connection_failure());
        assert!(Error::Desynchronized.is_connection_failure());

        assert!(!Error::No("[NONEXISTENT] gone".into()).is_connection_failure());
        assert!(!Error::Bad("parse error".into()).is_connection_failure());
        assert!(!Error::Protocol("garbled".into()).is_connection_failure());
    }
}
