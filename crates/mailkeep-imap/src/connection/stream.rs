//! Opening the transport.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::config::{Config, Security};
use crate::{Error, Result};

/// TCP connection, optionally wrapped in TLS.
pub enum ImapStream {
    /// Unencrypted.
    Plain(TcpStream),
    /// TLS; boxed because the session state is large.
    Tls(Box<TlsStream<TcpStream>>),
}

impl std::fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "ImapStream::Plain",
            Self::Tls(_) => "ImapStream::Tls",
        })
    }
}

/// Forwards a poll method to whichever stream is inside.
macro_rules! forward {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self.get_mut() {
            ImapStream::Plain(s) => Pin::new(s).$method($($arg),*),
            ImapStream::Tls(s) => Pin::new(s).$method($($arg),*),
        }
    };
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        forward!(self, poll_read(cx, buf))
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        forward!(self, poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        forward!(self, poll_shutdown(cx))
    }
}

/// Client TLS settings trusting the bundled Mozilla roots.
fn tls_connector() -> TlsConnector {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Dials the server described by `config`.
///
/// The whole setup, TLS handshake included, is bounded by
/// `config.connect_timeout`.
///
/// # Errors
///
/// Returns [`Error::Timeout`] on deadline, [`Error::InvalidDnsName`] if the
/// host cannot be used for TLS verification, or the I/O or TLS failure.
pub async fn connect(config: &Config) -> Result<ImapStream> {
    let host = config.host.as_str();
    let port = config.port();
    debug!(host, port, security = ?config.security, "connecting");

    with_timeout(config.connect_timeout, async {
        let tcp = TcpStream::connect((host, port)).await?;
        match config.security {
            Security::None => Ok(ImapStream::Plain(tcp)),
            Security::Implicit => {
                let name = ServerName::try_from(host.to_string())?;
                let tls = tls_connector().connect(name, tcp).await?;
                Ok(ImapStream::Tls(Box::new(tls)))
            }
        }
    })
    .await
}

/// Runs `fut`, mapping an elapsed deadline to [`Error::Timeout`].
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let result: Result<()> = with_timeout(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_plain_connect_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"* OK hi\r\n").await.unwrap();
        });

        let config = Config::new("127.0.0.1")
            .with_security(Security::None)
            .with_port(port);
        let mut stream = connect(&config).await.unwrap();
        assert!(matches!(stream, ImapStream::Plain(_)));

        let mut greeting = String::new();
        stream.read_to_string(&mut greeting).await.unwrap();
        assert_eq!(greeting, "* OK hi\r\n");
        server.await.unwrap();
    }
}
