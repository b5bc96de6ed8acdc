//! SQLite state database shared by the cursor store and the message index.

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::Result;
use crate::cursor::CursorStore;
use crate::index::MessageIndex;

/// Handle to the state database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and its schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// connection fails, or schema creation fails.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        info!(path = %path.display(), "state database ready");
        Ok(db)
    }

    /// Creates an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        // A single connection that never expires, since each in-memory
        // connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<()> {
        CursorStore::initialize(&self.pool).await?;
        MessageIndex::initialize(&self.pool).await?;
        Ok(())
    }

    /// Returns the cursor store.
    #[must_use]
    pub fn cursors(&self) -> CursorStore {
        CursorStore::new(self.pool.clone())
    }

    /// Returns the message index.
    #[must_use]
    pub fn index(&self) -> MessageIndex {
        MessageIndex::new(self.pool.clone())
    }

    /// Closes all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{FolderCursor, FolderTarget};

    #[tokio::test]
    async fn test_open_creates_parent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("mailkeep.db");
        let target = FolderTarget::new("a", "INBOX");

        let db = Database::open(&path).await.unwrap();
        db.cursors()
            .put(
                &target,
                FolderCursor {
                    last_uid: 9,
                    validity_epoch: None,
                },
            )
            .await
            .unwrap();
        db.close().await;

        let reopened = Database::open(&path).await.unwrap();
        assert_eq!(reopened.cursors().get(&target).await.unwrap().last_uid, 9);
    }
}
