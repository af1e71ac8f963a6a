use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{ApiKeyRow, NewApiKey};
use crate::error::{AuthError, AuthResult};

/// Durable key storage. The single source of truth for API keys; the
/// [`super::KeyCache`] is only a performance overlay on top of it.
///
/// Implementations do not need to make `delete` + `insert` atomic. Callers
/// that need exactly-once rotation must serialize externally.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn insert(&self, key: NewApiKey) -> AuthResult<()>;
    async fn delete(&self, app_id: u32, service_name: Option<&str>) -> AuthResult<()>;
    async fn select_by_secret(&self, secret: &str) -> AuthResult<Option<ApiKeyRow>>;
    async fn select_by_owner_service(
        &self,
        app_id: u32,
        service_name: Option<&str>,
    ) -> AuthResult<Vec<ApiKeyRow>>;
}

/// SQLite-backed key store.
pub struct SqliteKeyStore {
    db: Mutex<Connection>,
}

impl SqliteKeyStore {
    /// Open (or create) the key database at `path`.
    pub fn open(path: &Path) -> AuthResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> AuthResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> AuthResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS api_key (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at   TEXT    NOT NULL,
                key          TEXT    NOT NULL UNIQUE,
                app_id       INTEGER NOT NULL,
                service_name TEXT,
                scopes       TEXT    NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_api_key_owner ON api_key(app_id, service_name);
            ",
        )?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AuthResult<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| AuthError::Other(format!("Lock error: {}", e)))
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ApiKeyRow> {
    Ok(ApiKeyRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        key: row.get(2)?,
        app_id: row.get(3)?,
        service_name: row.get(4)?,
        scopes: row.get(5)?,
    })
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn insert(&self, key: NewApiKey) -> AuthResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO api_key (created_at, key, app_id, service_name, scopes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                chrono::Utc::now().to_rfc3339(),
                key.key,
                key.app_id,
                key.service_name,
                key.scopes,
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, app_id: u32, service_name: Option<&str>) -> AuthResult<()> {
        let conn = self.conn()?;
        // `IS` rather than `=` so a NULL service name matches the global key.
        conn.execute(
            "DELETE FROM api_key WHERE app_id = ?1 AND service_name IS ?2",
            params![app_id, service_name],
        )?;
        Ok(())
    }

    async fn select_by_secret(&self, secret: &str) -> AuthResult<Option<ApiKeyRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, created_at, key, app_id, service_name, scopes
                 FROM api_key WHERE key = ?1",
                params![secret],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    async fn select_by_owner_service(
        &self,
        app_id: u32,
        service_name: Option<&str>,
    ) -> AuthResult<Vec<ApiKeyRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, created_at, key, app_id, service_name, scopes
             FROM api_key WHERE app_id = ?1 AND service_name IS ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![app_id, service_name], map_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_key(app_id: u32, service_name: Option<&str>, key: &str) -> NewApiKey {
        NewApiKey {
            app_id,
            service_name: service_name.map(String::from),
            key: key.into(),
            scopes: r#"[{"type":"global"}]"#.into(),
        }
    }

    #[tokio::test]
    async fn insert_and_select() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.insert(new_key(7, Some("main"), "secret-a")).await.unwrap();

        let row = store.select_by_secret("secret-a").await.unwrap().unwrap();
        assert_eq!(row.app_id, 7);
        assert_eq!(row.service_name.as_deref(), Some("main"));

        let rows = store.select_by_owner_service(7, Some("main")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "secret-a");
    }

    #[tokio::test]
    async fn unknown_secret_is_none() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        assert!(store.select_by_secret("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn null_service_name_matches_global_row_only() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.insert(new_key(0, None, "global")).await.unwrap();
        store.insert(new_key(0, Some("main"), "other")).await.unwrap();

        let rows = store.select_by_owner_service(0, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "global");
    }

    #[tokio::test]
    async fn delete_removes_only_matching_pair() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.insert(new_key(7, Some("main"), "a")).await.unwrap();
        store.insert(new_key(7, Some("worker"), "b")).await.unwrap();

        store.delete(7, Some("main")).await.unwrap();

        assert!(store.select_by_secret("a").await.unwrap().is_none());
        assert!(store.select_by_secret("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_secret_is_an_error() {
        let store = SqliteKeyStore::open_in_memory().unwrap();
        store.insert(new_key(1, Some("x"), "same")).await.unwrap();
        let err = store.insert(new_key(2, Some("y"), "same")).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        {
            let store = SqliteKeyStore::open(&path).unwrap();
            store.insert(new_key(3, Some("api"), "durable")).await.unwrap();
        }
        let store = SqliteKeyStore::open(&path).unwrap();
        let row = store.select_by_secret("durable").await.unwrap().unwrap();
        assert_eq!(row.app_id, 3);
    }
}
