//! IMAP implementation of the mail session port.

use std::collections::HashMap;
use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use mailkeep_imap::{Authenticated, Client, Config, ImapStream, MailboxStatus};

use crate::model::{FolderState, ValidityEpoch};
use crate::port::{MailConnector, MailSession, PortError};

/// Server settings and credentials for one account.
#[derive(Clone)]
pub struct ImapAccount {
    /// Connection settings.
    pub config: Config,
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for ImapAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapAccount")
            .field("config", &self.config)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Opens IMAP sessions for named accounts.
#[derive(Debug, Default)]
pub struct ImapConnector {
    accounts: HashMap<String, ImapAccount>,
}

impl ImapConnector {
    /// Creates a connector with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account under `name`.
    #[must_use]
    pub fn with_account(mut self, name: impl Into<String>, account: ImapAccount) -> Self {
        self.accounts.insert(name.into(), account);
        self
    }
}

impl MailConnector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, account: &str) -> Result<ImapSession, PortError> {
        let settings = self
            .accounts
            .get(account)
            .ok_or_else(|| PortError::Connection(format!("unknown account {account}")))?;

        let stream = mailkeep_imap::connect(&settings.config)
            .await
            .map_err(connect_error)?;
        let client = Client::from_stream(stream)
            .await
            .map_err(connect_error)?
            .with_timeout(settings.config.command_timeout);
        let client = client
            .login(&settings.username, &settings.password)
            .await
            .map_err(connect_error)?;

        info!(account, host = %settings.config.host, "mail session opened");
        Ok(ImapSession::new(client))
    }
}

/// An authenticated IMAP session.
#[derive(Debug)]
pub struct ImapSession<S = ImapStream> {
    client: Client<S, Authenticated>,
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a logged-in client.
    #[must_use]
    pub const fn new(client: Client<S, Authenticated>) -> Self {
        Self { client }
    }

    async fn examine(&mut self, folder: &str) -> Result<MailboxStatus, PortError> {
        self.client
            .examine(folder)
            .await
            .map_err(|err| folder_error(folder, err))
    }

    async fn ensure_selected(&mut self, folder: &str) -> Result<(), PortError> {
        if self.client.selected() != Some(folder) {
            self.examine(folder).await?;
        }
        Ok(())
    }
}

impl<S> MailSession for ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn select_folder(&mut self, folder: &str) -> Result<FolderState, PortError> {
        let status = self.examine(folder).await?;
        let validity = status.uid_validity.ok_or_else(|| {
            PortError::Folder(format!("{folder}: server reported no UIDVALIDITY"))
        })?;

        Ok(FolderState {
            validity: ValidityEpoch(validity),
            highest_uid: status.uid_next.map_or(0, |next| next.saturating_sub(1)),
        })
    }

    async fn list_uids_since(&mut self, folder: &str, last_uid: u32) -> Result<Vec<u32>, PortError> {
        self.ensure_selected(folder).await?;
        self.client
            .uid_search_since(last_uid)
            .await
            .map_err(command_error)
    }

    async fn fetch_raw(&mut self, folder: &str, uid: u32) -> Result<Vec<u8>, PortError> {
        self.ensure_selected(folder).await?;
        match self.client.uid_fetch_raw(uid).await {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(PortError::NotFound(uid)),
            Err(err) => Err(command_error(err)),
        }
    }

    async fn close(self) {
        if let Err(err) = self.client.logout().await {
            debug!(error = %err, "logout failed");
        }
    }
}

/// Failures while opening a session. Only timeouts are worth retrying, and
/// each retry starts from a fresh connection.
fn connect_error(err: mailkeep_imap::Error) -> PortError {
    match err {
        mailkeep_imap::Error::Timeout(_) => PortError::Transient(err.to_string()),
        _ => PortError::Connection(err.to_string()),
    }
}

/// Failures opening a folder.
fn folder_error(folder: &str, err: mailkeep_imap::Error) -> PortError {
    if err.is_connection_failure() {
        PortError::Connection(err.to_string())
    } else {
        PortError::Folder(format!("{folder}: {err}"))
    }
}

/// Failures of a single command on an open folder.
///
/// A timed-out command leaves its reply on the stream, so it ends the
/// session instead of being retried on it.
fn command_error(err: mailkeep_imap::Error) -> PortError {
    if err.is_connection_failure() {
        PortError::Connection(err.to_string())
    } else {
        PortError::Transient(err.to_string())
    }
}
