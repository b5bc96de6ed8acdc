//! The mail session port: what the sync engine needs from a mail server.
//!
//! Implementations own transport, TLS, authentication and reconnect policy.
//! The engine only classifies failures through [`PortError`].

use std::future::Future;

use crate::model::FolderState;
use crate::retry::Retryable;

/// Failures reported by a mail session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The session itself failed (auth, TLS, transport). Fatal to the folder.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The folder cannot be opened or listed. Fatal to the folder.
    #[error("folder unavailable: {0}")]
    Folder(String),

    /// The server has no message with this UID.
    #[error("message {0} not found")]
    NotFound(u32),

    /// A single operation failed but the session is still usable.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl Retryable for PortError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Opens sessions for configured accounts.
pub trait MailConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Opens an authenticated session for `account`.
    fn connect(
        &self,
        account: &str,
    ) -> impl Future<Output = Result<Self::Session, PortError>> + Send;
}

/// An authenticated, read-only session with a mail server.
pub trait MailSession: Send {
    /// Opens `folder` and reports its validity token and highest UID.
    fn select_folder(
        &mut self,
        folder: &str,
    ) -> impl Future<Output = Result<FolderState, PortError>> + Send;

    /// Lists UIDs in `folder` strictly greater than `last_uid`, ascending.
    fn list_uids_since(
        &mut self,
        folder: &str,
        last_uid: u32,
    ) -> impl Future<Output = Result<Vec<u32>, PortError>> + Send;

    /// Fetches the raw RFC 5322 bytes of one message.
    fn fetch_raw(
        &mut self,
        folder: &str,
        uid: u32,
    ) -> impl Future<Output = Result<Vec<u8>, PortError>> + Send;

    /// Ends the session. Failures are ignored.
    fn close(self) -> impl Future<Output = ()> + Send;
}
