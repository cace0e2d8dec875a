//! Database connection setup

use rung_config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Open a connection pool described by `config`.
///
/// For file-backed SQLite URLs the parent directory is created first. An
/// in-memory SQLite database only exists per connection, so its pool is
/// pinned to a single connection.
pub async fn connect(config: &DatabaseConfig) -> StorageResult<DatabaseConnection> {
    info!("Connecting to database: {}", config.url);

    ensure_sqlite_file_exists(&config.url)?;

    let in_memory = is_memory_url(&config.url);
    let max_connections = if in_memory { 1 } else { config.max_connections };

    let mut opts = ConnectOptions::new(config.url.clone());
    opts.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(config.connection_timeout)
        .acquire_timeout(config.connection_timeout)
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    if !in_memory {
        opts.idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(3600));
    }

    let connection = Database::connect(opts).await?;

    debug!(
        "Database connection established with {} max connections",
        max_connections
    );

    Ok(connection)
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite:") && database_url.contains(":memory:")
}

/// Extract the file path from a file-backed SQLite URL
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    if !database_url.starts_with("sqlite:") || is_memory_url(database_url) {
        return None;
    }

    // sqlite:///abs/path.db keeps its leading slash; sqlite://rel.db and sqlite:rel.db do not
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);

    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Ensure the directory of a file-based SQLite database exists
fn ensure_sqlite_file_exists(database_url: &str) -> StorageResult<()> {
    let Some(file_path) = sqlite_file_path(database_url) else {
        debug!("No SQLite file to prepare for {}", database_url);
        return Ok(());
    };

    let path = Path::new(file_path);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            info!("Creating database directory: {:?}", parent_dir);
            std::fs::create_dir_all(parent_dir).map_err(|source| StorageError::Io {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }
    }

    if !path.exists() {
        info!("Database file will be created by SQLite: {:?}", path);
    } else {
        debug!("Using existing database file: {:?}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::ConnectionTrait;

    fn config(url: String) -> DatabaseConfig {
        DatabaseConfig {
            url,
            max_connections: 2,
            connection_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_sqlite_file_path() {
        assert_eq!(sqlite_file_path("sqlite:///tmp/a.db"), Some("/tmp/a.db"));
        assert_eq!(sqlite_file_path("sqlite://a.db?mode=rwc"), Some("a.db"));
        assert_eq!(sqlite_file_path("sqlite:data/a.db"), Some("data/a.db"));
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = connect(&config("sqlite::memory:".to_string())).await.unwrap();
        assert!(db.ping().await.is_ok());

        // Single connection: a table created here is visible on the next query
        db.execute_unprepared("CREATE TABLE t (id INTEGER)").await.unwrap();
        db.execute_unprepared("INSERT INTO t VALUES (1)").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database_directory_creation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("subdir").join("test.db");
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

        assert!(!db_path.parent().unwrap().exists());

        let db = connect(&config(db_url)).await.unwrap();
        assert!(db.ping().await.is_ok());
        assert!(db_path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_unwritable_database_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file in the way").unwrap();
        let parent = blocker.join("subdir");
        let db_url = format!("sqlite://{}?mode=rwc", parent.join("test.db").display());

        let err = connect(&config(db_url)).await.unwrap_err();

        assert!(matches!(err, StorageError::Io { ref path, .. } if *path == parent));
        assert!(err.to_string().starts_with("Failed to create database directory"));
    }
}
