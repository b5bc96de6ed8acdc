//! # mailkeep-core
//!
//! Incremental mail archiving and indexing.
//!
//! This crate provides:
//! - **Sync engine** - per-folder incremental sync driven by UID cursors,
//!   with validity-token reset detection and idempotent re-runs
//! - **Archive store** - append-only raw message files, written atomically
//! - **Cursor store** - durable per-folder progress in `SQLite`
//! - **Message index** - metadata rows plus an FTS5 full-text index
//! - **Mail session port** - the traits the engine uses to talk to a
//!   server, with an IMAP implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod cursor;
mod db;
pub mod engine;
mod error;
pub mod index;
pub mod model;
pub mod port;
pub mod retry;
pub mod service;
pub mod summary;

pub use archive::{ArchiveStore, StoredArtifact, Verification};
pub use cursor::CursorStore;
pub use db::Database;
pub use engine::{SyncEngine, SyncOptions};
pub use error::{Error, Result};
pub use index::MessageIndex;
pub use model::{
    AccountFolders, ArchiveStats, ArchivedMessage, ArtifactRef, FolderCursor, FolderState,
    FolderTarget, SearchHit, ValidityEpoch,
};
pub use port::{MailConnector, MailSession, PortError};
pub use retry::{RetryOutcome, RetryPolicy, Retryable, retry};
pub use service::{ImapAccount, ImapConnector, ImapSession};
pub use summary::{AbortKind, FolderOutcome, FolderReport, RunSummary, RunTotals, ValidityReset};
