//! SQLite version store
//!
//! Applied versions are rows of a versions table. The lock is a single row
//! with id 1 in a lock table: inserting it acquires the lock and the primary
//! key makes a second insert fail, which is reported as
//! [`StoreError::Locked`]. Because the lock lives in the database it is
//! shared by every process using that database.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rung_config::DatabaseConfig;
use rung_core::{StoreError, StoreResult, Version, VersionStore};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, SqlErr, Statement, TransactionTrait,
};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LOCK_ROW_ID: i64 = 1;
const DEFAULT_LOCK_TABLE: &str = "schema_lock";
const DEFAULT_VERSIONS_TABLE: &str = "schema_migrations";
const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An applied version and when it was recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVersion {
    pub version: Version,
    pub applied_at: NaiveDateTime,
}

/// Version store persisted in SQLite through sea-orm
#[derive(Debug, Clone)]
pub struct SqliteVersionStore {
    conn: DatabaseConnection,
    lock_table: String,
    versions_table: String,
}

impl SqliteVersionStore {
    /// Store using the default `schema_lock` and `schema_migrations` tables
    pub fn new(conn: DatabaseConnection) -> Self {
        Self::with_tables(conn, DEFAULT_LOCK_TABLE, DEFAULT_VERSIONS_TABLE)
    }

    /// Store using custom table names
    pub fn with_tables(
        conn: DatabaseConnection,
        lock_table: impl Into<String>,
        versions_table: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            lock_table: quote_ident(&lock_table.into()),
            versions_table: quote_ident(&versions_table.into()),
        }
    }

    /// Store using the table names from `config`
    pub fn from_config(conn: DatabaseConnection, config: &DatabaseConfig) -> Self {
        Self::with_tables(conn, &config.lock_table, &config.versions_table)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// All applied versions with their timestamps, ascending
    pub async fn applied(&self, ctx: &CancellationToken) -> StoreResult<Vec<AppliedVersion>> {
        let stmt = self.statement(
            format!(
                "SELECT version_id, CAST(applied_at AS TEXT) AS applied_at FROM {} ORDER BY version_id",
                self.versions_table
            ),
            vec![],
        );
        let rows = cancellable(ctx, self.conn.query_all(stmt))
            .await?
            .map_err(StoreError::backend)?;

        rows.iter()
            .map(|row| {
                let version: i64 = row.try_get("", "version_id").map_err(StoreError::backend)?;
                let applied_at: String =
                    row.try_get("", "applied_at").map_err(StoreError::backend)?;
                let applied_at = NaiveDateTime::parse_from_str(&applied_at, APPLIED_AT_FORMAT)
                    .map_err(StoreError::backend)?;
                Ok(AppliedVersion {
                    version,
                    applied_at,
                })
            })
            .collect()
    }

    /// Whether the lock row is present
    pub async fn is_locked(&self, ctx: &CancellationToken) -> StoreResult<bool> {
        let stmt = self.statement(
            format!("SELECT COUNT(*) AS held FROM {}", self.lock_table),
            vec![],
        );
        let row = cancellable(ctx, self.conn.query_one(stmt))
            .await?
            .map_err(StoreError::backend)?;

        let held: i64 = match row {
            Some(row) => row.try_get("", "held").map_err(StoreError::backend)?,
            None => 0,
        };
        Ok(held > 0)
    }

    fn statement(&self, sql: String, values: Vec<sea_orm::Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Sqlite, sql, values)
    }
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    type Handle = DatabaseConnection;

    fn handle(&self) -> &DatabaseConnection {
        &self.conn
    }

    async fn init(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let create_lock = format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY)",
            self.lock_table
        );
        let create_versions = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY, \
             version_id INTEGER UNIQUE NOT NULL, \
             applied_at DATETIME NOT NULL DEFAULT (datetime('now')))",
            self.versions_table
        );

        let init = async {
            let txn = self.conn.begin().await?;
            txn.execute_unprepared(&create_lock).await?;
            txn.execute_unprepared(&create_versions).await?;
            txn.commit().await?;
            Ok::<_, DbErr>(())
        };
        cancellable(ctx, init).await?.map_err(StoreError::backend)?;

        debug!("Version store tables ready");
        Ok(())
    }

    async fn lock(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let stmt = self.statement(
            format!("INSERT INTO {} (id) VALUES (?)", self.lock_table),
            vec![LOCK_ROW_ID.into()],
        );

        match cancellable(ctx, self.conn.execute(stmt)).await? {
            Ok(_) => {
                debug!("Version store lock acquired");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => Err(StoreError::Locked),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn release(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let stmt = self.statement(
            format!("DELETE FROM {} WHERE id = ?", self.lock_table),
            vec![LOCK_ROW_ID.into()],
        );
        cancellable(ctx, self.conn.execute(stmt))
            .await?
            .map_err(StoreError::backend)?;

        debug!("Version store lock released");
        Ok(())
    }

    async fn current_version(&self, ctx: &CancellationToken) -> StoreResult<Version> {
        let stmt = self.statement(
            format!(
                "SELECT MAX(version_id) AS max_version FROM {}",
                self.versions_table
            ),
            vec![],
        );
        let row = cancellable(ctx, self.conn.query_one(stmt))
            .await?
            .map_err(StoreError::backend)?;

        let max: Option<i64> = match row {
            Some(row) => row.try_get("", "max_version").map_err(StoreError::backend)?,
            None => None,
        };
        max.ok_or(StoreError::NoVersionsApplied)
    }

    async fn record_applied(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        let stmt = self.statement(
            format!("INSERT INTO {} (version_id) VALUES (?)", self.versions_table),
            vec![version.into()],
        );

        match cancellable(ctx, self.conn.execute(stmt)).await? {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateVersion(version)),
            Err(err) => Err(StoreError::backend(err)),
        }
    }

    async fn record_reverted(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        let stmt = self.statement(
            format!("DELETE FROM {} WHERE version_id = ?", self.versions_table),
            vec![version.into()],
        );
        let result = cancellable(ctx, self.conn.execute(stmt))
            .await?
            .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionNotFound(version));
        }
        Ok(())
    }
}

/// Race a database call against cancellation
async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> StoreResult<Result<T, DbErr>>
where
    F: Future<Output = Result<T, DbErr>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StoreError::Cancelled),
        result = fut => Ok(result),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

/// Double-quote an identifier for interpolation into SQL
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect;

    async fn store() -> (SqliteVersionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("rung.db").display()),
            ..Default::default()
        };
        let conn = connect(&config).await.unwrap();
        (SqliteVersionStore::from_config(conn, &config), dir)
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("schema_lock"), "\"schema_lock\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (store, _dir) = store().await;
        let ctx = CancellationToken::new();

        store.init(&ctx).await.unwrap();
        store.init(&ctx).await.unwrap();
        assert!(!store.is_locked(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_and_release() {
        let (store, _dir) = store().await;
        let ctx = CancellationToken::new();
        store.init(&ctx).await.unwrap();

        store.lock(&ctx).await.unwrap();
        assert!(store.is_locked(&ctx).await.unwrap());
        assert!(matches!(store.lock(&ctx).await, Err(StoreError::Locked)));

        store.release(&ctx).await.unwrap();
        assert!(!store.is_locked(&ctx).await.unwrap());
        store.lock(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_version_records() {
        let (store, _dir) = store().await;
        let ctx = CancellationToken::new();
        store.init(&ctx).await.unwrap();

        assert!(matches!(
            store.current_version(&ctx).await,
            Err(StoreError::NoVersionsApplied)
        ));

        store.record_applied(&ctx, 1).await.unwrap();
        store.record_applied(&ctx, 20).await.unwrap();
        store.record_applied(&ctx, 3).await.unwrap();
        assert_eq!(store.current_version(&ctx).await.unwrap(), 20);

        assert!(matches!(
            store.record_applied(&ctx, 3).await,
            Err(StoreError::DuplicateVersion(3))
        ));

        store.record_reverted(&ctx, 20).await.unwrap();
        assert_eq!(store.current_version(&ctx).await.unwrap(), 3);
        assert!(matches!(
            store.record_reverted(&ctx, 20).await,
            Err(StoreError::VersionNotFound(20))
        ));

        let applied: Vec<_> = store
            .applied(&ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.version)
            .collect();
        assert_eq!(applied, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let (store, _dir) = store().await;
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(matches!(store.init(&ctx).await, Err(StoreError::Cancelled)));
        assert!(matches!(store.lock(&ctx).await, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_custom_tables() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("rung.db").display()),
            lock_table: "app_lock".to_string(),
            versions_table: "app_versions".to_string(),
            ..Default::default()
        };
        let conn = connect(&config).await.unwrap();
        let store = SqliteVersionStore::from_config(conn.clone(), &config);
        let ctx = CancellationToken::new();

        store.init(&ctx).await.unwrap();
        store.record_applied(&ctx, 7).await.unwrap();

        let row = conn
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM app_versions",
            ))
            .await
            .unwrap()
            .unwrap();
        let n: i64 = row.try_get("", "n").unwrap();
        assert_eq!(n, 1);
    }
}
