//! Framed I/O for IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines that may embed `{n}` literals.
//! A literal's bytes are lifted out of the line and kept verbatim, so a
//! message body never goes through text decoding.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Initial read buffer capacity.
const READ_BUFFER: usize = 8192;

/// Longest response line accepted, literals excluded.
const MAX_LINE: usize = 1024 * 1024;

/// Largest literal accepted. Bigger messages are reported as protocol errors.
const MAX_LITERAL: usize = 100 * 1024 * 1024;

/// One complete server response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseLine {
    /// Line text with CRLFs removed. Each literal is represented by its
    /// `{n}` marker.
    pub text: String,
    /// Literal payloads in the order they appeared.
    pub literals: Vec<Vec<u8>>,
}

impl ResponseLine {
    /// The tag of a tagged completion, `None` for `*` and `+` lines.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self.text.split(' ').next() {
            Some("" | "*" | "+") | None => None,
            Some(tag) => Some(tag),
        }
    }
}

/// Line and literal framing over a byte stream.
pub struct FramedStream<S> {
    inner: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER, stream),
        }
    }

    /// Reads one response, pulling in every literal it announces.
    ///
    /// # Errors
    ///
    /// Returns an I/O error on failure or EOF, and a protocol error for an
    /// oversized line or literal.
    pub async fn read_response(&mut self) -> Result<ResponseLine> {
        let mut response = ResponseLine::default();

        loop {
            let raw = self.read_line().await?;
            let text = String::from_utf8_lossy(raw.strip_suffix(b"\r\n").unwrap_or(&raw[..]));
            let announced = literal_length(&text);
            response.text.push_str(&text);

            let Some(len) = announced else {
                return Ok(response);
            };
            if len > MAX_LITERAL {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (limit {MAX_LITERAL})"
                )));
            }

            let mut literal = vec![0; len];
            self.inner.read_exact(&mut literal).await?;
            response.literals.push(literal);
        }
    }

    /// Reads up to and including the next CRLF. A bare LF does not end the
    /// line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let budget = (MAX_LINE + 2).saturating_sub(line.len()) as u64;
            let read = (&mut self.inner)
                .take(budget)
                .read_until(b'\n', &mut line)
                .await?;

            if line.ends_with(b"\r\n") {
                return Ok(line);
            }
            if line.len() > MAX_LINE {
                return Err(Error::Protocol("line too long".into()));
            }
            if read == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }
        }
    }

    /// Sends a complete command and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.inner.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Length announced by a trailing `{n}` or `{n+}`.
fn literal_length(line: &str) -> Option<usize> {
    let body = line.strip_suffix('}')?;
    let digits = body[body.rfind('{')? + 1..].trim_end_matches('+');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length("BODY[] {123}"), Some(123));
        assert_eq!(literal_length("BODY[] {123+}"), Some(123));
        assert_eq!(literal_length("{0}"), Some(0));
        assert_eq!(literal_length("no literal"), None);
        assert_eq!(literal_length("wrong {abc}"), None);
        assert_eq!(literal_length("empty {}"), None);
    }

    #[test]
    fn test_tag() {
        let tagged = ResponseLine {
            text: "A0001 OK done".into(),
            literals: Vec::new(),
        };
        assert_eq!(tagged.tag(), Some("A0001"));

        let untagged = ResponseLine {
            text: "* 3 EXISTS".into(),
            literals: Vec::new(),
        };
        assert_eq!(untagged.tag(), None);
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response.text, "* OK ready");
        assert!(response.literals.is_empty());
    }

    #[tokio::test]
    async fn test_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 7 BODY[] {6}\r\n")
            .read(b"a\r\nb\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response.text, "* 1 FETCH (UID 7 BODY[] {6})");
        assert_eq!(response.literals, vec![b"a\r\nb\r\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_bare_lf_does_not_end_line() {
        let mock = Builder::new().read(b"* OK a\nb\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response.text, "* OK a\nb");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK split\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response.text, "* OK split");
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"A0000 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A0000 NOOP\r\n").await.unwrap();
    }
}
