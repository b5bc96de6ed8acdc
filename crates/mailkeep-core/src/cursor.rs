//! Durable per-folder sync cursors.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::Result;
use crate::model::{FolderCursor, FolderTarget, ValidityEpoch};

/// Repository for folder cursors.
///
/// Each write is a single upsert, so a cursor is always either the old or
/// the new value, never a mix.
#[derive(Debug, Clone)]
pub struct CursorStore {
    pool: SqlitePool,
}

impl CursorStore {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the cursor table.
    pub(crate) async fn initialize(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folder_cursors (
                account TEXT NOT NULL,
                folder TEXT NOT NULL,
                last_uid INTEGER NOT NULL DEFAULT 0,
                validity_epoch INTEGER,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account, folder)
            )
            ",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Loads the cursor for a folder. Unknown folders start at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, target: &FolderTarget) -> Result<FolderCursor> {
        let row = sqlx::query(
            "SELECT last_uid, validity_epoch FROM folder_cursors WHERE account = ? AND folder = ?",
        )
        .bind(&target.account)
        .bind(&target.folder)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map_or_else(FolderCursor::default, row_to_cursor))
    }

    /// Persists the cursor for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn put(&self, target: &FolderTarget, cursor: FolderCursor) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO folder_cursors (account, folder, last_uid, validity_epoch, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (account, folder) DO UPDATE SET
                last_uid = excluded.last_uid,
                validity_epoch = excluded.validity_epoch,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&target.account)
        .bind(&target.folder)
        .bind(i64::from(cursor.last_uid))
        .bind(cursor.validity_epoch.map(|e| i64::from(e.0)))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            folder = %target,
            last_uid = cursor.last_uid,
            validity = ?cursor.validity_epoch,
            "cursor saved"
        );
        Ok(())
    }

    /// Lists all stored cursors, ordered by account and folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<(FolderTarget, FolderCursor)>> {
        let rows = sqlx::query(
            r"
            SELECT account, folder, last_uid, validity_epoch
            FROM folder_cursors
            ORDER BY account, folder
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let target = FolderTarget::new(
                    row.get::<String, _>("account"),
                    row.get::<String, _>("folder"),
                );
                (target, row_to_cursor(row))
            })
            .collect())
    }
}

fn row_to_cursor(row: &sqlx::sqlite::SqliteRow) -> FolderCursor {
    FolderCursor {
        last_uid: u32::try_from(row.get::<i64, _>("last_uid")).unwrap_or(0),
        validity_epoch: row
            .get::<Option<i64>, _>("validity_epoch")
            .and_then(|v| u32::try_from(v).ok())
            .map(ValidityEpoch),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_unknown_folder_starts_at_zero() {
        let db = Database::in_memory().await.unwrap();
        let cursor = db.cursors().get(&FolderTarget::new("a", "INBOX")).await.unwrap();
        assert_eq!(cursor, FolderCursor::default());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = Database::in_memory().await.unwrap();
        let store = db.cursors();
        let target = FolderTarget::new("a", "INBOX");

        let cursor = FolderCursor {
            last_uid: 42,
            validity_epoch: Some(ValidityEpoch(1_700_000_000)),
        };
        store.put(&target, cursor).await.unwrap();
        assert_eq!(store.get(&target).await.unwrap(), cursor);

        let reset = FolderCursor {
            last_uid: 0,
            validity_epoch: Some(ValidityEpoch(9)),
        };
        store.put(&target, reset).await.unwrap();
        assert_eq!(store.get(&target).await.unwrap(), reset);

        // Other folders are untouched
        let other = FolderTarget::new("a", "Sent");
        assert_eq!(store.get(&other).await.unwrap(), FolderCursor::default());
    }

    #[tokio::test]
    async fn test_list() {
        let db = Database::in_memory().await.unwrap();
        let store = db.cursors();
        store
            .put(&FolderTarget::new("b", "INBOX"), FolderCursor::default())
            .await
            .unwrap();
        store
            .put(
                &FolderTarget::new("a", "INBOX"),
                FolderCursor {
                    last_uid: 3,
                    validity_epoch: None,
                },
            )
            .await
            .unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0.to_string(), "a/INBOX");
        assert_eq!(all[0].1.last_uid, 3);
    }
}
