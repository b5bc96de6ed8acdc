//! Core errors.

use std::path::PathBuf;

use crate::port::PortError;

/// Core result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the archive, cursor and index stores, plus session errors
/// passed through the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `SQLite` failure.
    #[error("state database: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure.
    #[error("archive storage: {0}")]
    Io(#[from] std::io::Error),

    /// `(account, folder, uid)` is already indexed.
    #[error("{account}/{folder} uid {uid} is already indexed")]
    DuplicateKey {
        /// Account name.
        account: String,
        /// Folder name.
        folder: String,
        /// Message UID.
        uid: u32,
    },

    /// Different content already sits at the artifact path.
    #[error("{} exists with different content", .0.display())]
    ArtifactConflict(PathBuf),

    /// Mail session failure.
    #[error(transparent)]
    Port(#[from] PortError),
}
