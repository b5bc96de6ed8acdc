//! Domain models shared by the stores and the sync engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One (account, folder) pair to synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FolderTarget {
    /// Account name as configured.
    pub account: String,
    /// Folder name on the server.
    pub folder: String,
}

impl FolderTarget {
    /// Creates a new target.
    #[must_use]
    pub fn new(account: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            folder: folder.into(),
        }
    }
}

impl fmt::Display for FolderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.folder)
    }
}

/// An account and the folders to synchronize for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFolders {
    /// Account name as configured.
    pub account: String,
    /// Folders in the order they are synchronized.
    pub folders: Vec<String>,
}

impl AccountFolders {
    /// Expands into one [`FolderTarget`] per folder.
    #[must_use]
    pub fn targets(&self) -> Vec<FolderTarget> {
        self.folders
            .iter()
            .map(|folder| FolderTarget::new(&self.account, folder))
            .collect()
    }
}

/// The server's folder-validity token (IMAP UIDVALIDITY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ValidityEpoch(pub u32);

impl fmt::Display for ValidityEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable sync progress for one (account, folder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FolderCursor {
    /// Highest UID fully archived and indexed, contiguous from the baseline.
    pub last_uid: u32,
    /// Validity token observed when `last_uid` was last advanced.
    pub validity_epoch: Option<ValidityEpoch>,
}

impl FolderCursor {
    /// Returns true if the server's token invalidates this cursor.
    ///
    /// A cursor that never recorded a token is adopted, not reset.
    #[must_use]
    pub fn is_invalidated_by(&self, server: ValidityEpoch) -> bool {
        self.validity_epoch.is_some_and(|stored| stored != server)
    }
}

/// Live folder state reported by the mail server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderState {
    /// Current validity token.
    pub validity: ValidityEpoch,
    /// Highest UID in use, 0 for an empty folder.
    pub highest_uid: u32,
}

/// One archived message as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedMessage {
    /// Locally generated identifier (UUID v4).
    pub id: String,
    /// Account name.
    pub account: String,
    /// Folder name.
    pub folder: String,
    /// Server UID at fetch time.
    pub uid: u32,
    /// Validity token the UID belongs to.
    pub validity_epoch: Option<ValidityEpoch>,
    /// Message-ID header.
    pub message_id: Option<String>,
    /// Date header in UTC.
    pub date: Option<DateTime<Utc>>,
    /// Decoded From header.
    pub from_display: Option<String>,
    /// Lowercased sender address.
    pub from_email: Option<String>,
    /// Decoded To header.
    pub to_display: Option<String>,
    /// Decoded subject.
    pub subject: Option<String>,
    /// Artifact path relative to the archive root.
    pub path: String,
    /// Artifact size in bytes.
    pub size: u64,
    /// SHA-256 of the artifact, lowercase hex.
    pub checksum: String,
    /// When the message was archived locally.
    pub inserted_at: DateTime<Utc>,
}

impl ArchivedMessage {
    /// Returns the (account, folder) this message belongs to.
    #[must_use]
    pub fn target(&self) -> FolderTarget {
        FolderTarget::new(&self.account, &self.folder)
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// The matching message.
    pub message: ArchivedMessage,
    /// FTS5 bm25 rank; lower is more relevant.
    pub rank: f64,
}

/// Pointer to a stored artifact, used for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Index row sequence number, for paging.
    pub seq: i64,
    /// Message identifier.
    pub id: String,
    /// Artifact path relative to the archive root.
    pub path: String,
    /// Expected SHA-256, lowercase hex.
    pub checksum: String,
    /// Expected size in bytes.
    pub size: u64,
}

/// Aggregate archive statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Number of archived messages.
    pub total_messages: u64,
    /// Sum of artifact sizes.
    pub total_bytes: u64,
    /// Distinct senders (address, else display name).
    pub unique_senders: u64,
    /// Most frequent senders with message counts.
    pub top_senders: Vec<(String, u64)>,
    /// Most frequent sender domains with message counts.
    pub top_domains: Vec<(String, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_invalidation() {
        let fresh = FolderCursor::default();
        assert!(!fresh.is_invalidated_by(ValidityEpoch(7)));

        let cursor = FolderCursor {
            last_uid: 50,
            validity_epoch: Some(ValidityEpoch(1)),
        };
        assert!(!cursor.is_invalidated_by(ValidityEpoch(1)));
        assert!(cursor.is_invalidated_by(ValidityEpoch(2)));
    }

    #[test]
    fn test_account_targets() {
        let account = AccountFolders {
            account: "work".into(),
            folders: vec!["INBOX".into(), "Sent".into()],
        };
        let targets = account.targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].to_string(), "work/Sent");
    }
}
