//! SQLite-based session history and key-value store.
//!
//! Provides persistent storage for:
//! - Completed work sessions (one row each)
//! - Session statistics (daily and all-time)
//! - Key-value store for flat JSON records (todos, daily stats)

use std::path::Path;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{CoreError, DatabaseError};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total_sessions: u64,
    pub total_focus_min: u64,
    pub today_sessions: u64,
    pub today_focus_min: u64,
}

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/pomotodo/pomotodo.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("pomotodo.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // Other pomotodo processes may hold the write lock briefly.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id      TEXT,
                focus_min    INTEGER NOT NULL,
                completed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_completed_at ON sessions(completed_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_task_id ON sessions(task_id);",
        )?;
        Ok(())
    }

    /// Record a completed work session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(
        &self,
        task_id: Option<&str>,
        focus_min: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO sessions (task_id, focus_min, completed_at)
             VALUES (?1, ?2, ?3)",
            params![task_id, focus_min, completed_at.to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Sessions and focus minutes completed at or after `since`.
    pub fn stats_since(&self, since: DateTime<Utc>) -> Result<(u64, u64), rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(focus_min), 0)
             FROM sessions
             WHERE completed_at >= ?1",
            params![since.to_rfc3339()],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )
    }

    pub fn stats_today(&self) -> Result<SessionStats, rusqlite::Error> {
        let (today_sessions, today_focus_min) = self.stats_since(local_midnight_utc())?;
        Ok(SessionStats {
            total_sessions: today_sessions,
            total_focus_min: today_focus_min,
            today_sessions,
            today_focus_min,
        })
    }

    pub fn stats_all(&self) -> Result<SessionStats, rusqlite::Error> {
        let (total_sessions, total_focus_min) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(focus_min), 0) FROM sessions",
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        let (today_sessions, today_focus_min) = self.stats_since(local_midnight_utc())?;
        Ok(SessionStats {
            total_sessions,
            total_focus_min,
            today_sessions,
            today_focus_min,
        })
    }

    /// Number of recorded sessions attributed to `task_id`.
    pub fn sessions_for_task(&self, task_id: &str) -> Result<u64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE task_id = ?1",
            params![task_id],
            |row| row.get::<_, u64>(0),
        )
    }

    /// Begin a write transaction, taking the write lock up front so a
    /// read-modify-write inside it cannot interleave with another writer.
    ///
    /// Dropping the transaction without committing rolls it back.
    pub fn begin_write(&self) -> Result<Transaction<'_>, rusqlite::Error> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Start of the local calendar day, as a UTC instant.
fn local_midnight_utc() -> DateTime<Utc> {
    let today = Local::now().date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&today)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| today.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_query() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        db.record_session(Some("task-1"), 25, now).unwrap();
        db.record_session(None, 30, now).unwrap();

        let stats = db.stats_all().unwrap();
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_focus_min, 55);
        assert_eq!(stats.today_sessions, 2);
        assert_eq!(db.sessions_for_task("task-1").unwrap(), 1);
    }

    #[test]
    fn sessions_before_today_are_excluded_from_today() {
        let db = Database::open_memory().unwrap();
        let long_ago = Utc::now() - chrono::Duration::days(3);
        db.record_session(None, 25, long_ago).unwrap();

        let today = db.stats_today().unwrap();
        assert_eq!(today.today_sessions, 0);
        assert_eq!(db.stats_all().unwrap().total_sessions, 1);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
        db.kv_set("test", "again").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "again");
    }

    #[test]
    fn dropped_write_transaction_rolls_back() {
        let db = Database::open_memory().unwrap();
        {
            let _tx = db.begin_write().unwrap();
            db.kv_set("k", "uncommitted").unwrap();
        }
        assert!(db.kv_get("k").unwrap().is_none());

        let tx = db.begin_write().unwrap();
        db.kv_set("k", "committed").unwrap();
        tx.commit().unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("committed"));
    }

    #[test]
    fn open_at_persists_between_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pomotodo.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.kv_set("k", "v").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v"));
    }
}
