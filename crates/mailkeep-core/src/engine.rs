//! The incremental sync engine.
//!
//! A folder pass reconciles the stored cursor with the server's validity
//! token, lists UIDs above the baseline, and archives each one in ascending
//! order: artifact first, then the index row and search entry in one
//! transaction. The cursor only moves over UIDs that are contiguously done,
//! so it never claims progress the archive does not hold. Re-running a pass
//! is harmless: UIDs already in the index are skipped before any fetch.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mailkeep_mime::parse_metadata;

use crate::archive::ArchiveStore;
use crate::cursor::CursorStore;
use crate::db::Database;
use crate::index::MessageIndex;
use crate::model::{AccountFolders, ArchivedMessage, FolderCursor, FolderTarget, ValidityEpoch};
use crate::port::{MailConnector, MailSession, PortError};
use crate::retry::{RetryOutcome, RetryPolicy, retry};
use crate::summary::{AbortKind, FolderOutcome, FolderReport, RunSummary, ValidityReset};
use crate::Error;

/// Tuning for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum UIDs to process per folder per run. Remaining UIDs are
    /// reported as deferred and picked up by the next run.
    pub max_messages: Option<usize>,
    /// Persist the cursor after this many processed UIDs.
    pub checkpoint_every: usize,
    /// Retry policy for session operations.
    pub retry: RetryPolicy,
    /// Consecutive storage failures that abort a folder.
    pub storage_failure_limit: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_messages: None,
            checkpoint_every: 50,
            retry: RetryPolicy::default(),
            storage_failure_limit: 3,
        }
    }
}

/// Reason a folder pass stopped.
#[derive(Debug)]
struct Abort {
    kind: AbortKind,
    message: String,
}

impl Abort {
    fn port(error: &PortError) -> Self {
        let kind = match error {
            PortError::Connection(_) => AbortKind::Connection,
            _ => AbortKind::Folder,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    fn storage(error: &Error) -> Self {
        Self {
            kind: AbortKind::Storage,
            message: error.to_string(),
        }
    }
}

/// Result of processing one UID.
enum UidOutcome {
    /// Archived, already present, or gone; the cursor may move past it.
    Done,
    /// Not archived this run; the cursor must stay below it.
    Failed,
    /// Local storage failed for this UID.
    StorageFailed(Error),
    /// The folder pass cannot continue.
    Abort(Abort),
}

/// Drives sync passes against the archive, cursor store and index.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    archive: ArchiveStore,
    cursors: CursorStore,
    index: MessageIndex,
    options: SyncOptions,
}

impl SyncEngine {
    /// Creates an engine over `db` and `archive`.
    #[must_use]
    pub fn new(db: &Database, archive: ArchiveStore, options: SyncOptions) -> Self {
        Self {
            archive,
            cursors: db.cursors(),
            index: db.index(),
            options,
        }
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronizes every folder of every account, one folder at a time.
    ///
    /// Each account gets one session, reopened after a connection failure.
    /// A failed folder never stops the others.
    pub async fn run<C: MailConnector>(
        &self,
        connector: &C,
        accounts: &[AccountFolders],
    ) -> RunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut folders = Vec::new();

        for account in accounts {
            info!(account = %account.account, folders = account.folders.len(), "syncing account");
            let mut session: Option<C::Session> = None;

            for target in account.targets() {
                if session.is_none() {
                    match self.connect(connector, &account.account).await {
                        Ok(opened) => session = Some(opened),
                        Err(err) => {
                            let abort = Abort::port(&err);
                            folders.push(self.aborted_report(&target, abort).await);
                            continue;
                        }
                    }
                }

                let Some(active) = session.as_mut() else {
                    continue;
                };
                let report = self.sync_folder(active, &target).await;

                if matches!(
                    report.outcome,
                    FolderOutcome::Aborted {
                        kind: AbortKind::Connection,
                        ..
                    }
                ) {
                    // Broken session; reconnect for the next folder.
                    session = None;
                }
                folders.push(report);
            }

            if let Some(session) = session {
                session.close().await;
            }
        }

        let summary = RunSummary {
            started_at,
            elapsed_ms: elapsed_ms(started),
            folders,
        };
        let totals = summary.totals();
        info!(
            folders = summary.folders.len(),
            archived = totals.archived,
            skipped = totals.skipped_duplicate,
            failed = totals.failed,
            aborted = totals.aborted_folders,
            elapsed_ms = summary.elapsed_ms,
            "sync run finished"
        );
        summary
    }

    async fn connect<C: MailConnector>(
        &self,
        connector: &C,
        account: &str,
    ) -> Result<C::Session, PortError> {
        match retry(&self.options.retry, async |_| connector.connect(account).await).await {
            RetryOutcome::Success(session) => Ok(session),
            RetryOutcome::Exhausted { error, .. } | RetryOutcome::Fatal(error) => {
                error!(account, %error, "cannot open mail session");
                Err(match error {
                    PortError::Connection(_) => error,
                    other => PortError::Connection(other.to_string()),
                })
            }
        }
    }

    async fn aborted_report(&self, target: &FolderTarget, abort: Abort) -> FolderReport {
        let cursor = match self.cursors.get(target).await {
            Ok(cursor) => cursor,
            Err(err) => {
                warn!(folder = %target, error = %err, "cannot read cursor for aborted folder");
                FolderCursor::default()
            }
        };
        let mut report = FolderReport::new(target.clone(), cursor);
        report.outcome = FolderOutcome::Aborted {
            kind: abort.kind,
            message: abort.message,
        };
        report
    }

    /// Runs one pass over a folder and reports what happened.
    ///
    /// Failures are folded into the report rather than returned.
    pub async fn sync_folder<S: MailSession>(
        &self,
        session: &mut S,
        target: &FolderTarget,
    ) -> FolderReport {
        let started = Instant::now();

        let cursor = match self.cursors.get(target).await {
            Ok(cursor) => cursor,
            Err(err) => {
                error!(folder = %target, error = %err, "cannot read cursor");
                let mut report = FolderReport::new(target.clone(), FolderCursor::default());
                report.outcome = FolderOutcome::Aborted {
                    kind: AbortKind::Storage,
                    message: err.to_string(),
                };
                return report;
            }
        };

        let mut report = FolderReport::new(target.clone(), cursor);
        if let Err(abort) = self.pass(session, target, &mut report).await {
            error!(
                account = %target.account,
                folder = %target.folder,
                kind = ?abort.kind,
                error = %abort.message,
                "folder pass aborted"
            );
            report.outcome = FolderOutcome::Aborted {
                kind: abort.kind,
                message: abort.message,
            };
        }
        report.elapsed_ms = elapsed_ms(started);

        info!(
            account = %target.account,
            folder = %target.folder,
            fetched = report.fetched,
            archived = report.archived,
            skipped = report.skipped_duplicate,
            failed = report.failed,
            last_uid = report.cursor_after.last_uid,
            elapsed_ms = report.elapsed_ms,
            "folder pass finished"
        );
        report
    }

    async fn pass<S: MailSession>(
        &self,
        session: &mut S,
        target: &FolderTarget,
        report: &mut FolderReport,
    ) -> Result<(), Abort> {
        let folder = target.folder.as_str();

        let state = match retry(&self.options.retry, async |_| {
            session.select_folder(folder).await
        })
        .await
        {
            RetryOutcome::Success(state) => state,
            RetryOutcome::Exhausted { error, .. } | RetryOutcome::Fatal(error) => {
                return Err(Abort::port(&error));
            }
        };

        let mut cursor = report.cursor_before;
        if let Some(previous) = cursor.validity_epoch
            && cursor.is_invalidated_by(state.validity)
        {
            warn!(
                account = %target.account,
                folder,
                previous = %previous,
                current = %state.validity,
                discarded_last_uid = cursor.last_uid,
                "validity token changed, relisting folder from the start"
            );
            report.validity_reset = Some(ValidityReset {
                previous,
                current: state.validity,
                discarded_last_uid: cursor.last_uid,
            });
            cursor = FolderCursor {
                last_uid: 0,
                validity_epoch: Some(state.validity),
            };
            self.save_cursor(target, cursor, report).await?;
        } else if cursor.validity_epoch.is_none() {
            cursor.validity_epoch = Some(state.validity);
            self.save_cursor(target, cursor, report).await?;
        }

        let baseline = cursor.last_uid;
        let mut uids = match retry(&self.options.retry, async |_| {
            session.list_uids_since(folder, baseline).await
        })
        .await
        {
            RetryOutcome::Success(uids) => uids,
            RetryOutcome::Exhausted { error, .. } | RetryOutcome::Fatal(error) => {
                return Err(Abort::port(&error));
            }
        };
        uids.retain(|&uid| uid > baseline);
        uids.sort_unstable();
        uids.dedup();

        if let Some(limit) = self.options.max_messages
            && uids.len() > limit
        {
            report.deferred = (uids.len() - limit) as u64;
            uids.truncate(limit);
        }

        debug!(
            account = %target.account,
            folder,
            baseline,
            highest_uid = state.highest_uid,
            pending = uids.len(),
            "listed new messages"
        );

        let checkpoint_every = self.options.checkpoint_every.max(1);
        let mut high_water = baseline;
        let mut contiguous = true;
        let mut storage_failures = 0;

        for (processed, uid) in uids.into_iter().enumerate() {
            match self
                .process_uid(session, target, state.validity, uid, report)
                .await
            {
                UidOutcome::Done => {
                    storage_failures = 0;
                    if contiguous {
                        high_water = uid;
                    }
                }
                UidOutcome::Failed => {
                    contiguous = false;
                    report.failed += 1;
                    report.failed_uids.push(uid);
                }
                UidOutcome::StorageFailed(err) => {
                    contiguous = false;
                    report.failed += 1;
                    report.failed_uids.push(uid);
                    storage_failures += 1;
                    warn!(account = %target.account, folder, uid, error = %err, "cannot store message");
                    if storage_failures >= self.options.storage_failure_limit.max(1) {
                        return Err(Abort::storage(&err));
                    }
                }
                UidOutcome::Abort(abort) => return Err(abort),
            }

            if (processed + 1).is_multiple_of(checkpoint_every) {
                self.checkpoint(target, &mut cursor, high_water, report)
                    .await?;
            }
        }

        self.checkpoint(target, &mut cursor, high_water, report)
            .await
    }

    async fn process_uid<S: MailSession>(
        &self,
        session: &mut S,
        target: &FolderTarget,
        validity: ValidityEpoch,
        uid: u32,
        report: &mut FolderReport,
    ) -> UidOutcome {
        let folder = target.folder.as_str();

        match self.index.find(target, uid).await {
            Ok(Some(existing)) => {
                if existing.validity_epoch.is_none_or(|epoch| epoch == validity) {
                    debug!(account = %target.account, folder, uid, "already archived");
                    report.skipped_duplicate += 1;
                } else {
                    warn!(
                        account = %target.account,
                        folder,
                        uid,
                        stored_epoch = ?existing.validity_epoch,
                        "uid already holds a message from an earlier validity epoch"
                    );
                    report.epoch_collisions += 1;
                }
                return UidOutcome::Done;
            }
            Ok(None) => {}
            Err(err) => return UidOutcome::StorageFailed(err),
        }

        let raw = match retry(&self.options.retry, async |_| {
            session.fetch_raw(folder, uid).await
        })
        .await
        {
            RetryOutcome::Success(raw) => raw,
            RetryOutcome::Exhausted { attempts, error } => {
                warn!(account = %target.account, folder, uid, attempts, %error, "fetch failed, will retry next run");
                return UidOutcome::Failed;
            }
            RetryOutcome::Fatal(PortError::NotFound(_)) => {
                warn!(account = %target.account, folder, uid, "message vanished before fetch");
                report.vanished += 1;
                return UidOutcome::Done;
            }
            RetryOutcome::Fatal(error) => return UidOutcome::Abort(Abort::port(&error)),
        };
        report.fetched += 1;

        let (metadata, warnings) = parse_metadata(&raw).into_parts();
        if !warnings.is_empty() {
            report.parse_warnings += 1;
            for warning in &warnings {
                warn!(account = %target.account, folder, uid, %warning, "incomplete metadata");
            }
        }

        let archived_at = Utc::now();
        let date = metadata.date.unwrap_or(archived_at);
        let stored = match self
            .archive
            .put(&target.account, folder, date, uid, &raw)
            .await
        {
            Ok(stored) => stored,
            Err(err) => return UidOutcome::StorageFailed(err),
        };

        let message = ArchivedMessage {
            id: Uuid::new_v4().to_string(),
            account: target.account.clone(),
            folder: target.folder.clone(),
            uid,
            validity_epoch: Some(validity),
            message_id: metadata.message_id,
            date: metadata.date,
            from_display: metadata.from_display,
            from_email: metadata.from_email,
            to_display: metadata.to_display,
            subject: metadata.subject,
            path: stored.path,
            size: stored.size,
            checksum: stored.checksum,
            inserted_at: archived_at,
        };

        match self.index.insert(&message, &metadata.body_text).await {
            Ok(()) => {
                debug!(account = %target.account, folder, uid, path = %message.path, "archived");
                report.archived += 1;
                UidOutcome::Done
            }
            Err(Error::DuplicateKey { .. }) => {
                report.skipped_duplicate += 1;
                UidOutcome::Done
            }
            Err(err) => UidOutcome::StorageFailed(err),
        }
    }

    /// Persists `high_water` if it moves the cursor forward.
    async fn checkpoint(
        &self,
        target: &FolderTarget,
        cursor: &mut FolderCursor,
        high_water: u32,
        report: &mut FolderReport,
    ) -> Result<(), Abort> {
        if high_water <= cursor.last_uid {
            return Ok(());
        }
        cursor.last_uid = high_water;
        self.save_cursor(target, *cursor, report).await
    }

    async fn save_cursor(
        &self,
        target: &FolderTarget,
        cursor: FolderCursor,
        report: &mut FolderReport,
    ) -> Result<(), Abort> {
        self.cursors
            .put(target, cursor)
            .await
            .map_err(|err| Abort::storage(&err))?;
        report.cursor_after = cursor;
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
