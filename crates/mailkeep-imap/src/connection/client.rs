//! Type-state IMAP client.
//!
//! A [`Client`] starts out [`NotAuthenticated`] and becomes [`Authenticated`]
//! after LOGIN. Mailbox access is read-only: EXAMINE is the only way to
//! select a mailbox, and bodies are fetched with `BODY.PEEK[]` so the
//! `\Seen` flag is never set.

use std::marker::PhantomData;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use super::framed::{FramedStream, ResponseLine};
use super::stream::with_timeout;
use crate::command::{Command, TagGenerator};
use crate::response::{Response, Status, response_code_value};
use crate::{Error, Result};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial state after connection.
#[derive(Debug, Clone, Copy)]
pub struct NotAuthenticated;

/// State after successful LOGIN.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// Mailbox state reported by EXAMINE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// UIDVALIDITY, if the server reported one.
    pub uid_validity: Option<u32>,
    /// Predicted next UID.
    pub uid_next: Option<u32>,
    /// Number of messages.
    pub exists: u32,
}

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    timeout: Duration,
    selected: Option<String>,
    /// Set once a reply was abandoned partway; the stream is unusable.
    desynchronized: bool,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .field("selected", &self.selected)
            .field("desynchronized", &self.desynchronized)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a command and collects every response up to its completion.
    ///
    /// The whole round trip is bounded by the command timeout. A BYE seen on
    /// the way fails the command even if a tagged OK follows.
    ///
    /// If the round trip fails before the tagged reply is read, the rest of
    /// the reply may still be in flight, so every later command fails with
    /// [`Error::Desynchronized`].
    async fn execute(&mut self, command: &Command) -> Result<Vec<ResponseLine>> {
        if self.desynchronized {
            return Err(Error::Desynchronized);
        }
        let tag = self.tags.next_tag();
        trace!(%tag, command = %command.redacted(), "sending");

        let limit = self.timeout;
        let stream = &mut self.stream;
        let result = with_timeout(limit, async {
            let mut parts = command.serialize(&tag).into_iter().peekable();
            while let Some(part) = parts.next() {
                stream.write_command(&part).await?;
                if parts.peek().is_some() {
                    await_continuation(stream, &tag).await?;
                }
            }
            read_until_tagged(stream, &tag).await
        })
        .await;

        let lines = match result {
            Ok(lines) => lines,
            Err(err @ (Error::No(_) | Error::Bad(_))) => return Err(err),
            Err(err) => {
                warn!(%tag, error = %err, "reply abandoned, session out of sync");
                self.desynchronized = true;
                return Err(err);
            }
        };

        check_completion(&lines, &tag)?;
        Ok(lines)
    }

    fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tags: self.tags,
            timeout: self.timeout,
            selected: self.selected,
            desynchronized: self.desynchronized,
            _state: PhantomData,
        }
    }
}

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] if the server refuses the connection, or a
    /// protocol error for an unexpected greeting.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        let greeting = with_timeout(DEFAULT_COMMAND_TIMEOUT, framed.read_response()).await?;

        match Response::parse(&greeting) {
            Response::Ok { .. } => {}
            Response::Bye(text) => return Err(Error::Bye(text)),
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {}",
                    greeting.text
                )));
            }
        }

        Ok(Self {
            stream: framed,
            tags: TagGenerator::default(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            selected: None,
            desynchronized: false,
            _state: PhantomData,
        })
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] for rejected credentials.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        self.execute(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
        debug!(username, "logged in");
        Ok(self.transition())
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the currently examined mailbox.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Opens a mailbox read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox does not exist.
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        self.selected = None;
        let lines = self
            .execute(&Command::Examine {
                mailbox: mailbox.to_string(),
            })
            .await?;

        let mut status = MailboxStatus::default();
        for line in &lines {
            match Response::parse(line) {
                Response::Exists(n) => status.exists = n,
                Response::Ok { text } => {
                    if let Some(v) = response_code_value(&text, "UIDVALIDITY") {
                        status.uid_validity = Some(v);
                    }
                    if let Some(v) = response_code_value(&text, "UIDNEXT") {
                        status.uid_next = Some(v);
                    }
                }
                _ => {}
            }
        }

        self.selected = Some(mailbox.to_string());
        debug!(mailbox, ?status, "examined");
        Ok(status)
    }

    /// Lists UIDs strictly greater than `since`, ascending.
    ///
    /// `UID n:*` always matches the highest message even when its UID is
    /// below `n`, so results are filtered client-side.
    ///
    /// # Errors
    ///
    /// Returns an error if no mailbox is selected or the search fails.
    pub async fn uid_search_since(&mut self, since: u32) -> Result<Vec<u32>> {
        self.require_selected()?;
        let from = since.saturating_add(1);
        let lines = self.execute(&Command::UidSearchFrom { from }).await?;

        let mut uids: Vec<u32> = lines
            .iter()
            .filter_map(|line| match Response::parse(line) {
                Response::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .filter(|&uid| uid > since)
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetches the full raw message for `uid` without marking it seen.
    ///
    /// Returns `Ok(None)` if the server has no message with that UID.
    ///
    /// # Errors
    ///
    /// Returns an error if no mailbox is selected or the fetch fails.
    pub async fn uid_fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        self.require_selected()?;
        let lines = self.execute(&Command::UidFetchBody { uid }).await?;

        let body = lines.iter().find_map(|line| match Response::parse(line) {
            Response::Fetch {
                uid: Some(got),
                body: Some(body),
            } if got == uid => Some(body),
            _ => None,
        });
        Ok(body)
    }

    /// Logs out. The server's reply is not required.
    ///
    /// # Errors
    ///
    /// Returns an error if the LOGOUT command cannot be written.
    pub async fn logout(mut self) -> Result<()> {
        if self.desynchronized {
            return Err(Error::Desynchronized);
        }
        let tag = self.tags.next_tag();
        for part in Command::Logout.serialize(&tag) {
            self.stream.write_command(&part).await?;
        }
        let _ = with_timeout(self.timeout, read_until_tagged(&mut self.stream, &tag)).await;
        Ok(())
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected.is_some() {
            Ok(())
        } else {
            Err(Error::Protocol("no mailbox selected".to_string()))
        }
    }
}

/// Reads responses until the tagged completion for `tag`.
async fn read_until_tagged<S>(stream: &mut FramedStream<S>, tag: &str) -> Result<Vec<ResponseLine>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let line = stream.read_response().await?;
        let done = line.tag() == Some(tag);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Waits for the `+` that lets the client send a literal.
///
/// A tagged reply instead means the server refused the command early.
async fn await_continuation<S>(stream: &mut FramedStream<S>, tag: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let line = stream.read_response().await?;
        if line.text.starts_with('+') {
            return Ok(());
        }
        if line.tag() == Some(tag) {
            check_completion(std::slice::from_ref(&line), tag)?;
            return Err(Error::Protocol(
                "command completed before its literal was sent".to_string(),
            ));
        }
    }
}

/// Maps the tagged completion to a result.
fn check_completion(lines: &[ResponseLine], tag: &str) -> Result<()> {
    for line in lines {
        if let Response::Bye(text) = Response::parse(line) {
            return Err(Error::Bye(text));
        }
    }

    match lines.last().map(Response::parse) {
        Some(Response::Tagged {
            tag: got,
            status,
            text,
        }) if got == tag => match status {
            Status::Ok => Ok(()),
            Status::No => Err(Error::No(text)),
            Status::Bad => Err(Error::Bad(text)),
        },
        _ => Err(Error::Protocol("missing tagged response".to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        let err = Client::from_stream(mock).await.unwrap_err();
        assert!(matches!(err, Error::Bye(text) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "secret").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
        assert!(!err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_login_waits_for_continuation() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user {9}\r\n")
            .read(b"+ Ready for literal data\r\n")
            .write("pässword\r\n".as_bytes())
            .read(b"A0000 OK logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(client.login("user", "pässword").await.is_ok());
    }

    #[tokio::test]
    async fn test_literal_refused_before_continuation() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user {9}\r\n")
            .read(b"A0000 NO literal too large\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let err = client.login("user", "pässword").await.unwrap_err();
        assert!(matches!(err, Error::No(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mid_literal_poisons_client() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN u p\r\n")
            .read(b"A0000 OK logged in\r\n")
            .write(b"A0001 EXAMINE INBOX\r\n")
            .read(b"* OK [UIDVALIDITY 1] ok\r\nA0001 OK done\r\n")
            .write(b"A0002 UID FETCH 5 (UID BODY.PEEK[])\r\n")
            .read(b"* 1 FETCH (UID 5 BODY[] {64}\r\n* 1 FETCH (UID 5 BODY[] {4}\r\nEVIL)\r\n")
            .wait(Duration::from_secs(300))
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let mut client = client
            .login("u", "p")
            .await
            .unwrap()
            .with_timeout(Duration::from_secs(1));
        client.examine("INBOX").await.unwrap();

        let err = client.uid_fetch_raw(5).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        let err = client.uid_fetch_raw(5).await.unwrap_err();
        assert!(matches!(err, Error::Desynchronized));
        assert!(matches!(client.logout().await, Err(Error::Desynchronized)));
    }

    #[tokio::test]
    async fn test_search_requires_selection() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"A0000 LOGIN user secret\r\n")
            .read(b"A0000 OK logged in\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let mut client = client.login("user", "secret").await.unwrap();
        assert!(client.uid_search_since(0).await.is_err());
    }

    #[tokio::test]
    async fn test_check_completion_bye_wins() {
        let lines = vec![
            ResponseLine {
                text: "* BYE idle timeout".into(),
                literals: Vec::new(),
            },
            ResponseLine {
                text: "A0001 OK done".into(),
                literals: Vec::new(),
            },
        ];
        assert!(matches!(
            check_completion(&lines, "A0001"),
            Err(Error::Bye(_))
        ));
    }
}
