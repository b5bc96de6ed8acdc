//! Append-only archive of raw message files.
//!
//! Layout: `<root>/<account>/<folder>/<YYYY>/<MM>/<DD>/<uid>_<hash12>.eml`,
//! where `hash12` is the first 12 hex digits of the content checksum. Files
//! are written to a temporary name in the target directory, synced, and
//! renamed into place, so a reader never sees a partial file. Nothing here
//! overwrites or deletes an artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Error, Result};

/// Computes the content checksum (SHA-256, lowercase hex).
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Path relative to the archive root, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256, lowercase hex.
    pub checksum: String,
}

/// Result of checking an artifact against its recorded checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Present and intact.
    Intact,
    /// File does not exist.
    Missing,
    /// Content differs from the recorded checksum.
    Corrupt {
        /// Checksum of what is on disk.
        actual: String,
    },
}

/// Filesystem archive rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a stored relative path to a filesystem path.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Writes `bytes` for `(account, folder, uid)` dated `date`.
    ///
    /// If the exact same content already sits at the target path (a previous
    /// run stored it but crashed before indexing), that file is reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure, or [`Error::ArtifactConflict`]
    /// if a different file already occupies the target path.
    pub async fn put(
        &self,
        account: &str,
        folder: &str,
        date: DateTime<Utc>,
        uid: u32,
        bytes: &[u8],
    ) -> Result<StoredArtifact> {
        let checksum = checksum(bytes);
        let relative = relative_path(account, folder, date, uid, &checksum);
        let target = self.resolve(&relative);
        let stored = StoredArtifact {
            path: relative,
            size: bytes.len() as u64,
            checksum,
        };

        if tokio::fs::try_exists(&target).await? {
            return match self.verify(&stored.path, &stored.checksum).await? {
                Verification::Intact => {
                    debug!(path = %stored.path, "artifact already present");
                    Ok(stored)
                }
                _ => Err(Error::ArtifactConflict(target)),
            };
        }

        let dir = target
            .parent()
            .ok_or_else(|| Error::ArtifactConflict(target.clone()))?;
        tokio::fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        if let Err(err) = write_synced(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        if let Err(err) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        Ok(stored)
    }

    /// Reads an artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(relative)).await?)
    }

    /// Compares an artifact with its recorded checksum.
    ///
    /// # Errors
    ///
    /// Returns an error for I/O failures other than the file being absent.
    pub async fn verify(&self, relative: &str, expected: &str) -> Result<Verification> {
        match tokio::fs::read(self.resolve(relative)).await {
            Ok(bytes) => {
                let actual = checksum(&bytes);
                if actual == expected {
                    Ok(Verification::Intact)
                } else {
                    Ok(Verification::Corrupt { actual })
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Verification::Missing),
            Err(err) => Err(err.into()),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

fn relative_path(
    account: &str,
    folder: &str,
    date: DateTime<Utc>,
    uid: u32,
    checksum: &str,
) -> String {
    format!(
        "{}/{}/{:04}/{:02}/{:02}/{uid}_{}.eml",
        safe_component(account, "account"),
        safe_component(folder, "folder"),
        date.year(),
        date.month(),
        date.day(),
        &checksum[..12.min(checksum.len())],
    )
}

/// Maps a name to a single safe, lowercase path component.
///
/// Runs of characters outside `[A-Za-z0-9._-]` become `_`, and leading or
/// trailing `.`, `_` and `-` are trimmed. Empty results use `fallback`.
#[must_use]
pub fn safe_component(value: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches(['.', '_', '-']);
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
