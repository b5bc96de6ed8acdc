//! Subcommand implementations.
//!
//! Each command writes its report to the given writer so the output can be
//! checked in tests.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{info, warn};

use mailkeep_core::{
    ArchiveStore, ArtifactRef, Database, FolderOutcome, MessageIndex, RunSummary, SearchHit,
    SyncEngine, Verification,
};

use crate::config::Config;

/// Largest result count `search` returns.
pub const MAX_SEARCH_LIMIT: u32 = 200;

/// Page size used when walking every artifact.
const VERIFY_PAGE: u32 = 500;

/// Opens the state database named in the configuration.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub async fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.state_db)
        .await
        .with_context(|| format!("opening state database {}", config.state_db.display()))
}

/// Runs a sync over every configured account and folder.
///
/// Returns true if any folder aborted.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the report cannot be
/// written.
pub async fn sync(
    config: &Config,
    max_messages: Option<usize>,
    json: bool,
    out: &mut impl Write,
) -> Result<bool> {
    let db = open_database(config).await?;
    let mut options = config.sync.options();
    if max_messages.is_some() {
        options.max_messages = max_messages;
    }

    let engine = SyncEngine::new(&db, ArchiveStore::new(&config.archive_root), options);
    let summary = engine
        .run(&config.connector(), &config.account_folders())
        .await;
    db.close().await;

    if json {
        serde_json::to_writer_pretty(&mut *out, &summary).context("writing sync report")?;
        writeln!(out)?;
    } else {
        write_sync_report(&summary, out)?;
    }
    Ok(summary.has_aborts())
}

/// Writes the human-readable sync report.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_sync_report(summary: &RunSummary, out: &mut impl Write) -> Result<()> {
    for report in &summary.folders {
        write!(
            out,
            "{}/{}: fetched {}, archived {}, skipped {}, failed {}",
            report.target.account,
            report.target.folder,
            report.fetched,
            report.archived,
            report.skipped_duplicate,
            report.failed,
        )?;
        if report.deferred > 0 {
            write!(out, ", deferred {}", report.deferred)?;
        }
        if let Some(reset) = &report.validity_reset {
            write!(
                out,
                ", validity reset {} -> {}",
                reset.previous.0, reset.current.0
            )?;
        }
        if let FolderOutcome::Aborted { kind, message } = &report.outcome {
            write!(out, ", ABORTED ({kind:?}): {message}")?;
        }
        writeln!(out)?;
    }

    let totals = summary.totals();
    writeln!(
        out,
        "total: fetched {}, archived {}, skipped {}, failed {}, aborted folders {} ({} ms)",
        totals.fetched,
        totals.archived,
        totals.skipped_duplicate,
        totals.failed,
        totals.aborted_folders,
        summary.elapsed_ms,
    )?;
    Ok(())
}

/// Prints search results as `date\tfrom\tsubject\tpath` rows.
///
/// # Errors
///
/// Returns an error if the query fails or output cannot be written.
pub async fn search(
    index: &MessageIndex,
    query: &str,
    limit: u32,
    out: &mut impl Write,
) -> Result<usize> {
    let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
    let hits = index.search(query, limit).await.context("searching index")?;
    for hit in &hits {
        writeln!(out, "{}", search_row(hit))?;
    }
    Ok(hits.len())
}

fn search_row(hit: &SearchHit) -> String {
    let message = &hit.message;
    let date = message
        .date
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
    let from = message
        .from_email
        .as_deref()
        .or(message.from_display.as_deref())
        .unwrap_or("-");
    let subject = message.subject.as_deref().unwrap_or("(no subject)");
    format!(
        "{date}\t{}\t{}\t{}",
        clean_field(from),
        clean_field(subject),
        message.path
    )
}

/// Keeps each result on one tab-separated line.
fn clean_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Outcome of [`verify`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Artifacts checked.
    pub checked: u64,
    /// Artifacts whose file is absent.
    pub missing: Vec<String>,
    /// Artifacts whose content no longer matches.
    pub corrupt: Vec<String>,
}

impl VerifyReport {
    /// Returns true if every artifact is intact.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Recomputes the checksum of every indexed artifact.
///
/// # Errors
///
/// Returns an error if the index cannot be read, a file cannot be read for a
/// reason other than being absent, or output cannot be written.
pub async fn verify(
    index: &MessageIndex,
    archive: &ArchiveStore,
    out: &mut impl Write,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    let mut after = 0;

    loop {
        let page = index
            .artifacts(after, VERIFY_PAGE)
            .await
            .context("listing artifacts")?;
        let Some(last) = page.last() else {
            break;
        };
        after = last.seq;

        for artifact in &page {
            check_artifact(archive, artifact, &mut report, out).await?;
        }
    }

    writeln!(
        out,
        "checked {}, missing {}, corrupt {}",
        report.checked,
        report.missing.len(),
        report.corrupt.len()
    )?;
    info!(
        checked = report.checked,
        missing = report.missing.len(),
        corrupt = report.corrupt.len(),
        "verify finished"
    );
    Ok(report)
}

async fn check_artifact(
    archive: &ArchiveStore,
    artifact: &ArtifactRef,
    report: &mut VerifyReport,
    out: &mut impl Write,
) -> Result<()> {
    report.checked += 1;
    let verification = archive
        .verify(&artifact.path, &artifact.checksum)
        .await
        .with_context(|| format!("reading {}", artifact.path))?;

    match verification {
        Verification::Intact => {}
        Verification::Missing => {
            warn!(path = %artifact.path, "artifact missing");
            writeln!(out, "missing\t{}", artifact.path)?;
            report.missing.push(artifact.path.clone());
        }
        Verification::Corrupt { actual } => {
            warn!(path = %artifact.path, expected = %artifact.checksum, %actual, "artifact corrupt");
            writeln!(out, "corrupt\t{}", artifact.path)?;
            report.corrupt.push(artifact.path.clone());
        }
    }
    Ok(())
}

/// Prints archive totals and the most frequent senders and domains.
///
/// # Errors
///
/// Returns an error if the query fails or output cannot be written.
pub async fn stats(index: &MessageIndex, top: u32, out: &mut impl Write) -> Result<()> {
    let stats = index.stats(top).await.context("reading stats")?;

    writeln!(out, "messages: {}", stats.total_messages)?;
    writeln!(out, "bytes: {}", stats.total_bytes)?;
    writeln!(out, "unique senders: {}", stats.unique_senders)?;
    if !stats.top_senders.is_empty() {
        writeln!(out, "top senders:")?;
        for (sender, count) in &stats.top_senders {
            writeln!(out, "  {count:>6}  {sender}")?;
        }
    }
    if !stats.top_domains.is_empty() {
        writeln!(out, "top domains:")?;
        for (domain, count) in &stats.top_domains {
            writeln!(out, "  {count:>6}  {domain}")?;
        }
    }
    Ok(())
}

/// Prints every stored cursor.
///
/// # Errors
///
/// Returns an error if the query fails or output cannot be written.
pub async fn status(db: &Database, out: &mut impl Write) -> Result<()> {
    let cursors = db.cursors().list().await.context("listing cursors")?;
    if cursors.is_empty() {
        writeln!(out, "no folders synced yet")?;
    }
    for (target, cursor) in cursors {
        let epoch = cursor
            .validity_epoch
            .map_or_else(|| "-".to_string(), |e| e.0.to_string());
        writeln!(
            out,
            "{}/{}\tlast_uid {}\tvalidity {epoch}",
            target.account, target.folder, cursor.last_uid
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mailkeep_core::{
        AbortKind, ArchivedMessage, FolderCursor, FolderReport, FolderTarget, ValidityEpoch,
    };

    async fn archive_message(
        db: &Database,
        archive: &ArchiveStore,
        uid: u32,
        from: &str,
        subject: &str,
    ) -> ArchivedMessage {
        let date = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let raw = format!("From: {from}\r\nSubject: {subject}\r\n\r\nbody {uid}\r\n");
        let stored = archive
            .put("acct", "INBOX", date, uid, raw.as_bytes())
            .await
            .unwrap();
        let message = ArchivedMessage {
            id: format!("id-{uid}"),
            account: "acct".into(),
            folder: "INBOX".into(),
            uid,
            validity_epoch: Some(ValidityEpoch(1)),
            message_id: None,
            date: Some(date),
            from_display: None,
            from_email: Some(from.into()),
            to_display: None,
            subject: Some(subject.into()),
            path: stored.path,
            size: stored.size,
            checksum: stored.checksum,
            inserted_at: Utc::now(),
        };
        db.index().insert(&message, "").await.unwrap();
        message
    }

    #[tokio::test]
    async fn test_search_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::in_memory().await.unwrap();
        let archive = ArchiveStore::new(dir.path());
        let message = archive_message(&db, &archive, 7, "bob@example.com", "Quarterly\treport").await;

        let mut out = Vec::new();
        let count = search(&db.index(), "quarterly", 0, &mut out).await.unwrap();
        assert_eq!(count, 1);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.trim_end(),
            format!("2024-03-04\tbob@example.com\tQuarterly report\t{}", message.path)
        );
    }

    #[tokio::test]
    async fn test_verify_reports_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::in_memory().await.unwrap();
        let archive = ArchiveStore::new(dir.path());
        archive_message(&db, &archive, 1, "a@example.com", "one").await;
        let gone = archive_message(&db, &archive, 2, "b@example.com", "two").await;
        let damaged = archive_message(&db, &archive, 3, "c@example.com", "three").await;

        std::fs::remove_file(archive.resolve(&gone.path)).unwrap();
        std::fs::write(archive.resolve(&damaged.path), b"tampered").unwrap();

        let mut out = Vec::new();
        let report = verify(&db.index(), &archive, &mut out).await.unwrap();

        assert_eq!(report.checked, 3);
        assert_eq!(report.missing, vec![gone.path]);
        assert_eq!(report.corrupt, vec![damaged.path]);
        assert!(!report.is_clean());
        assert!(String::from_utf8(out).unwrap().contains("checked 3, missing 1, corrupt 1"));
    }

    #[tokio::test]
    async fn test_stats_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::in_memory().await.unwrap();
        let archive = ArchiveStore::new(dir.path());
        archive_message(&db, &archive, 1, "a@example.com", "one").await;
        archive_message(&db, &archive, 2, "a@example.com", "two").await;
        db.cursors()
            .put(
                &FolderTarget::new("acct", "INBOX"),
                FolderCursor {
                    last_uid: 2,
                    validity_epoch: Some(ValidityEpoch(1)),
                },
            )
            .await
            .unwrap();

        let mut out = Vec::new();
        stats(&db.index(), 5, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("messages: 2"));
        assert!(text.contains("unique senders: 1"));
        assert!(text.contains("example.com"));

        let mut out = Vec::new();
        status(&db, &mut out).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "acct/INBOX\tlast_uid 2\tvalidity 1\n"
        );
    }

    #[test]
    fn test_sync_report_marks_aborts() {
        let mut report = FolderReport::new(FolderTarget::new("acct", "Junk"), FolderCursor::default());
        report.outcome = FolderOutcome::Aborted {
            kind: AbortKind::Connection,
            message: "connection reset".into(),
        };
        let summary = RunSummary {
            started_at: Utc::now(),
            elapsed_ms: 5,
            folders: vec![report],
        };

        let mut out = Vec::new();
        write_sync_report(&summary, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("acct/Junk: fetched 0"));
        assert!(text.contains("ABORTED (Connection): connection reset"));
        assert!(text.contains("aborted folders 1"));
    }
}
