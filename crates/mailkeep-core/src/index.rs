//! Message index and full-text search.
//!
//! Every archived message gets one row in `messages` and one entry in the
//! FTS5 table `messages_fts` (rowid = `messages.seq`). Both are written in a
//! single transaction, so the search index never refers to a missing row
//! and no row is left unsearchable.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use crate::model::{ArchiveStats, ArchivedMessage, ArtifactRef, FolderTarget, SearchHit, ValidityEpoch};
use crate::{Error, Result};

const MESSAGE_COLUMNS: &str = "m.seq, m.id, m.account, m.folder, m.uid, m.validity_epoch, \
    m.message_id, m.date, m.from_display, m.from_email, m.to_display, m.subject, \
    m.path, m.size, m.checksum, m.inserted_at";

/// Repository for archived message metadata and search.
#[derive(Debug, Clone)]
pub struct MessageIndex {
    pool: SqlitePool,
}

impl MessageIndex {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the message table, its indexes and the FTS5 table.
    pub(crate) async fn initialize(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                account TEXT NOT NULL,
                folder TEXT NOT NULL,
                uid INTEGER NOT NULL,
                validity_epoch INTEGER,
                message_id TEXT,
                date TEXT,
                from_display TEXT,
                from_email TEXT,
                to_display TEXT,
                subject TEXT,
                path TEXT NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                inserted_at TEXT NOT NULL,
                UNIQUE (account, folder, uid)
            )
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_message_id ON messages(message_id)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_from_email ON messages(from_email)")
            .execute(pool)
            .await?;

        sqlx::query(
            r"
            CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
                subject,
                sender,
                recipient,
                body
            )
            ",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Inserts a message row and its search entry atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if `(account, folder, uid)` is already
    /// indexed, or a database error. Either way nothing is written.
    pub async fn insert(&self, message: &ArchivedMessage, body_text: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO messages (
                id, account, folder, uid, validity_epoch, message_id, date,
                from_display, from_email, to_display, subject,
                path, size, checksum, inserted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&message.id)
        .bind(&message.account)
        .bind(&message.folder)
        .bind(i64::from(message.uid))
        .bind(message.validity_epoch.map(|e| i64::from(e.0)))
        .bind(&message.message_id)
        .bind(message.date.map(|d| d.to_rfc3339()))
        .bind(&message.from_display)
        .bind(&message.from_email)
        .bind(&message.to_display)
        .bind(&message.subject)
        .bind(&message.path)
        .bind(i64::try_from(message.size).unwrap_or(i64::MAX))
        .bind(&message.checksum)
        .bind(timestamp(message.inserted_at))
        .execute(&mut *tx)
        .await;

        let seq = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(Error::DuplicateKey {
                    account: message.account.clone(),
                    folder: message.folder.clone(),
                    uid: message.uid,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let sender = join_present(message.from_display.as_deref(), message.from_email.as_deref());

        sqlx::query(
            "INSERT INTO messages_fts (rowid, subject, sender, recipient, body) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(seq)
        .bind(message.subject.as_deref().unwrap_or_default())
        .bind(sender)
        .bind(message.to_display.as_deref().unwrap_or_default())
        .bind(body_text)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            account = %message.account,
            folder = %message.folder,
            uid = message.uid,
            seq,
            "message indexed"
        );
        Ok(())
    }

    /// Returns true if `(account, folder, uid)` is indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists(&self, target: &FolderTarget, uid: u32) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM messages WHERE account = ? AND folder = ? AND uid = ?")
            .bind(&target.account)
            .bind(&target.folder)
            .bind(i64::from(uid))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Finds the message stored for `(account, folder, uid)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, target: &FolderTarget, uid: u32) -> Result<Option<ArchivedMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.account = ? AND m.folder = ? AND m.uid = ?"
        );
        let row = sqlx::query(&sql)
            .bind(&target.account)
            .bind(&target.folder)
            .bind(i64::from(uid))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// Gets a message by its local identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<ArchivedMessage>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// Counts the messages indexed for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self, target: &FolderTarget) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE account = ? AND folder = ?")
            .bind(&target.account)
            .bind(&target.folder)
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(row.get::<i64, _>("n")).unwrap_or(0))
    }

    /// Full-text search over subject, sender, recipient and body.
    ///
    /// Every whitespace-separated word must match, as a prefix. Results are
    /// ordered by relevance, then by archival time, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = prepare_fts_query(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r"
            SELECT {MESSAGE_COLUMNS}, bm25(messages_fts) AS score
            FROM messages m
            JOIN messages_fts ON m.seq = messages_fts.rowid
            WHERE messages_fts MATCH ?
            ORDER BY score ASC, m.inserted_at DESC
            LIMIT ?
            "
        );
        let rows = sqlx::query(&sql)
            .bind(&fts_query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        debug!(query = %fts_query, hits = rows.len(), "search");

        Ok(rows
            .iter()
            .map(|row| SearchHit {
                message: row_to_message(row),
                rank: row.get::<f64, _>("score"),
            })
            .collect())
    }

    /// Aggregate statistics, with the `top` most frequent senders and domains.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stats(&self, top: u32) -> Result<ArchiveStats> {
        let totals = sqlx::query(
            r"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(size), 0) AS bytes,
                   COUNT(DISTINCT COALESCE(from_email, from_display)) AS senders
            FROM messages
            ",
        )
        .fetch_one(&self.pool)
        .await?;

        let top_senders = sqlx::query(
            r"
            SELECT COALESCE(from_email, from_display) AS name, COUNT(*) AS n
            FROM messages
            WHERE COALESCE(from_email, from_display) IS NOT NULL
            GROUP BY name
            ORDER BY n DESC, name ASC
            LIMIT ?
            ",
        )
        .bind(i64::from(top))
        .fetch_all(&self.pool)
        .await?;

        let top_domains = sqlx::query(
            r"
            SELECT substr(from_email, instr(from_email, '@') + 1) AS name, COUNT(*) AS n
            FROM messages
            WHERE from_email IS NOT NULL AND instr(from_email, '@') > 0
            GROUP BY name
            ORDER BY n DESC, name ASC
            LIMIT ?
            ",
        )
        .bind(i64::from(top))
        .fetch_all(&self.pool)
        .await?;

        Ok(ArchiveStats {
            total_messages: non_negative(totals.get("total")),
            total_bytes: non_negative(totals.get("bytes")),
            unique_senders: non_negative(totals.get("senders")),
            top_senders: top_senders.iter().map(row_to_count).collect(),
            top_domains: top_domains.iter().map(row_to_count).collect(),
        })
    }

    /// Lists artifact pointers with `seq > after`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn artifacts(&self, after: i64, limit: u32) -> Result<Vec<ArtifactRef>> {
        let rows = sqlx::query(
            r"
            SELECT seq, id, path, checksum, size
            FROM messages
            WHERE seq > ?
            ORDER BY seq ASC
            LIMIT ?
            ",
        )
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ArtifactRef {
                seq: row.get("seq"),
                id: row.get("id"),
                path: row.get("path"),
                checksum: row.get("checksum"),
                size: non_negative(row.get("size")),
            })
            .collect())
    }
}

/// Builds an FTS5 query: each word becomes a quoted prefix term.
///
/// Quoting neutralizes FTS5 operators in user input. Returns `None` if the
/// query has no searchable words.
fn prepare_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|word| word.replace('*', "").replace('"', "\"\""))
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{word}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn join_present(a: Option<&str>, b: Option<&str>) -> String {
    match (a, b) {
        (Some(a), Some(b)) => format!("{a} {b}"),
        (Some(v), None) | (None, Some(v)) => v.to_string(),
        (None, None) => String::new(),
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn row_to_count(row: &SqliteRow) -> (String, u64) {
    (row.get("name"), non_negative(row.get("n")))
}

fn row_to_message(row: &SqliteRow) -> ArchivedMessage {
    let date: Option<String> = row.get("date");
    let inserted_at: String = row.get("inserted_at");

    ArchivedMessage {
        id: row.get("id"),
        account: row.get("account"),
        folder: row.get("folder"),
        uid: u32::try_from(row.get::<i64, _>("uid")).unwrap_or(0),
        validity_epoch: row
            .get::<Option<i64>, _>("validity_epoch")
            .and_then(|v| u32::try_from(v).ok())
            .map(ValidityEpoch),
        message_id: row.get("message_id"),
        date: date.as_deref().and_then(parse_timestamp),
        from_display: row.get("from_display"),
        from_email: row.get("from_email"),
        to_display: row.get("to_display"),
        subject: row.get("subject"),
        path: row.get("path"),
        size: non_negative(row.get("size")),
        checksum: row.get("checksum"),
        inserted_at: parse_timestamp(&inserted_at).unwrap_or_default(),
    }
}
