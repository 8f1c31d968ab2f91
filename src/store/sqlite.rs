use super::{enforce_quota, KeyValueStore};
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Key-value entries in a single SQLite table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    quota_bytes: Option<u64>,
}

impl SqliteStore {
    pub fn open(path: &Path, quota_bytes: Option<u64>) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
            quota_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.lock()?;
        if self.quota_bytes.is_some() {
            let other_bytes: i64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM kv_entries WHERE key <> ?1",
                [key],
                |row| row.get(0),
            )?;
            enforce_quota(self.quota_bytes, other_bytes.max(0) as u64, key, value)?;
        }

        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
        Ok(changed > 0)
    }

    fn keys(&self) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv_entries ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::errors::AppError;
    use crate::store::KeyValueStore;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("nested").join("shelf.sqlite");
        {
            let store = SqliteStore::open(&db_path, None).expect("open");
            store.set("tasks", "[]").expect("set");
            store.set("tasks", "[1]").expect("overwrite");
            store.set("theme.dark", "true").expect("set theme");
        }

        let store = SqliteStore::open(&db_path, None).expect("reopen");
        assert_eq!(store.get("tasks").expect("get").as_deref(), Some("[1]"));
        assert_eq!(store.keys().expect("keys"), vec!["tasks".to_string(), "theme.dark".to_string()]);
        assert!(store.remove("tasks").expect("remove"));
        assert!(store.get("tasks").expect("get").is_none());
    }

    #[test]
    fn quota_rejects_oversized_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteStore::open(&dir.path().join("quota.sqlite"), Some(16)).expect("open");
        store.set("k", "short").expect("fits");

        let error = store.set("big", "0123456789abcdef").expect_err("over quota");
        assert!(matches!(error, AppError::QuotaExceeded(_)));
        assert_eq!(store.get("k").expect("get").as_deref(), Some("short"));
    }
}
