//! Structured results of a sync run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{FolderCursor, FolderTarget, ValidityEpoch};

/// A folder whose validity token changed since the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidityReset {
    /// Token stored in the cursor.
    pub previous: ValidityEpoch,
    /// Token reported by the server.
    pub current: ValidityEpoch,
    /// `last_uid` that was discarded.
    pub discarded_last_uid: u32,
}

/// Why a folder pass stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    /// The mail session failed.
    Connection,
    /// The folder could not be opened or listed.
    Folder,
    /// Local storage kept failing.
    Storage,
}

/// How a folder pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FolderOutcome {
    /// Every listed UID was attempted.
    Completed,
    /// The pass stopped early; the cursor keeps its last checkpoint.
    Aborted {
        /// Failure class.
        kind: AbortKind,
        /// Error description.
        message: String,
    },
}

/// Per-folder result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderReport {
    /// Account and folder.
    pub target: FolderTarget,
    /// Messages downloaded from the server.
    pub fetched: u64,
    /// Messages newly archived and indexed.
    pub archived: u64,
    /// UIDs already present in the index.
    pub skipped_duplicate: u64,
    /// UIDs that failed this run and will be retried next run.
    pub failed: u64,
    /// The failed UIDs, ascending.
    pub failed_uids: Vec<u32>,
    /// UIDs that were listed but gone by the time they were fetched.
    pub vanished: u64,
    /// UIDs occupied by a message from an earlier validity epoch.
    pub epoch_collisions: u64,
    /// Messages archived with incomplete metadata.
    pub parse_warnings: u64,
    /// UIDs left for a later run because of the per-run message limit.
    pub deferred: u64,
    /// Set when the folder was renumbered.
    pub validity_reset: Option<ValidityReset>,
    /// Cursor at the start of the pass.
    pub cursor_before: FolderCursor,
    /// Cursor as persisted at the end of the pass.
    pub cursor_after: FolderCursor,
    /// Wall-clock duration.
    pub elapsed_ms: u64,
    /// Completion status.
    pub outcome: FolderOutcome,
}

impl FolderReport {
    /// Creates an empty report for a pass starting at `cursor`.
    #[must_use]
    pub fn new(target: FolderTarget, cursor: FolderCursor) -> Self {
        Self {
            target,
            fetched: 0,
            archived: 0,
            skipped_duplicate: 0,
            failed: 0,
            failed_uids: Vec::new(),
            vanished: 0,
            epoch_collisions: 0,
            parse_warnings: 0,
            deferred: 0,
            validity_reset: None,
            cursor_before: cursor,
            cursor_after: cursor,
            elapsed_ms: 0,
            outcome: FolderOutcome::Completed,
        }
    }

    /// Returns true if the pass stopped early.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.outcome, FolderOutcome::Aborted { .. })
    }
}

/// Counts summed over all folders of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    /// Messages downloaded.
    pub fetched: u64,
    /// Messages archived.
    pub archived: u64,
    /// Duplicates skipped.
    pub skipped_duplicate: u64,
    /// Per-UID failures.
    pub failed: u64,
    /// Folders renumbered by the server.
    pub validity_resets: u64,
    /// Folders aborted.
    pub aborted_folders: u64,
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub elapsed_ms: u64,
    /// One report per folder, in processing order.
    pub folders: Vec<FolderReport>,
}

impl RunSummary {
    /// Sums the per-folder counts.
    #[must_use]
    pub fn totals(&self) -> RunTotals {
        self.folders
            .iter()
            .fold(RunTotals::default(), |mut totals, report| {
                totals.fetched += report.fetched;
                totals.archived += report.archived;
                totals.skipped_duplicate += report.skipped_duplicate;
                totals.failed += report.failed;
                totals.validity_resets += u64::from(report.validity_reset.is_some());
                totals.aborted_folders += u64::from(report.is_aborted());
                totals
            })
    }

    /// Returns true if any folder aborted.
    #[must_use]
    pub fn has_aborts(&self) -> bool {
        self.folders.iter().any(FolderReport::is_aborted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let mut inbox = FolderReport::new(FolderTarget::new("a", "INBOX"), FolderCursor::default());
        inbox.fetched = 3;
        inbox.archived = 2;
        inbox.failed = 1;
        inbox.validity_reset = Some(ValidityReset {
            previous: ValidityEpoch(1),
            current: ValidityEpoch(2),
            discarded_last_uid: 50,
        });

        let mut sent = FolderReport::new(FolderTarget::new("a", "Sent"), FolderCursor::default());
        sent.outcome = FolderOutcome::Aborted {
            kind: AbortKind::Connection,
            message: "tls handshake".into(),
        };

        let summary = RunSummary {
            started_at: Utc::now(),
            elapsed_ms: 10,
            folders: vec![inbox, sent],
        };

        let totals = summary.totals();
        assert_eq!(totals.fetched, 3);
        assert_eq!(totals.archived, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.validity_resets, 1);
        assert_eq!(totals.aborted_folders, 1);
        assert!(summary.has_aborts());
    }

    #[test]
    fn test_serializes_outcome_and_reset() {
        let mut report = FolderReport::new(FolderTarget::new("a", "INBOX"), FolderCursor::default());
        report.outcome = FolderOutcome::Aborted {
            kind: AbortKind::Folder,
            message: "no such mailbox".into(),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"]["status"], "aborted");
        assert_eq!(json["outcome"]["kind"], "folder");
        assert_eq!(json["target"]["folder"], "INBOX");
        assert!(json["validity_reset"].is_null());
    }
}
