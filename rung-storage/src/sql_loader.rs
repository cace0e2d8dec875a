//! Migrations from a directory of SQL files
//!
//! Each migration is a pair of files named `<version>_<name>.up.sql` and
//! `<version>_<name>.down.sql`. The down file is optional; without it the
//! migration cannot be reverted. Other files are ignored.

use async_trait::async_trait;
use rung_core::migration::parse_key;
use rung_core::{BoxError, Direction, LoaderError, Migration, MigrationLoader, Version};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

/// Loads SQL migrations from a directory
#[derive(Debug, Clone)]
pub struct SqlDirLoader {
    dir: PathBuf,
}

#[derive(Default)]
struct SqlPair {
    name: Option<String>,
    up: Option<Arc<str>>,
    down: Option<Arc<str>>,
}

impl SqlDirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_pairs(
        &self,
        ctx: &CancellationToken,
    ) -> Result<BTreeMap<Version, SqlPair>, LoaderError> {
        let io_err = |source| LoaderError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut pairs: BTreeMap<Version, SqlPair> = BTreeMap::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if ctx.is_cancelled() {
                return Err(LoaderError::Cancelled);
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            let (key, direction) = if let Some(key) = file_name.strip_suffix(UP_SUFFIX) {
                (key, Direction::Run)
            } else if let Some(key) = file_name.strip_suffix(DOWN_SUFFIX) {
                (key, Direction::Revert)
            } else {
                debug!("Skipping non-migration file {}", file_name);
                continue;
            };

            let (version, name) = parse_key(key).map_err(|source| LoaderError::InvalidKey {
                file: file_name.clone(),
                source,
            })?;

            let path = entry.path();
            let sql = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| LoaderError::Io { path, source })?;

            let pair = pairs.entry(version).or_default();
            let slot = match direction {
                Direction::Run => &mut pair.up,
                Direction::Revert => &mut pair.down,
            };
            if slot.is_some() {
                return Err(LoaderError::DuplicateFile { version, direction });
            }
            *slot = Some(Arc::from(sql));

            // The up file names the migration when both are present
            if direction == Direction::Run || pair.name.is_none() {
                pair.name = Some(name);
            }
        }

        Ok(pairs)
    }
}

#[async_trait]
impl MigrationLoader<DatabaseConnection> for SqlDirLoader {
    async fn load(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Vec<Migration<DatabaseConnection>>, LoaderError> {
        let pairs = self.read_pairs(ctx).await?;
        debug!(
            "Loaded {} migrations from {}",
            pairs.len(),
            self.dir.display()
        );

        let migrations = pairs
            .into_iter()
            .map(|(version, pair)| {
                let name = pair.name.unwrap_or_default();
                let mut migration = Migration::new(version, name);
                if let Some(up) = pair.up {
                    migration = migration
                        .with_apply(move |ctx, db| Box::pin(execute_script(ctx, db, up.clone())));
                }
                if let Some(down) = pair.down {
                    migration = migration
                        .with_revert(move |ctx, db| Box::pin(execute_script(ctx, db, down.clone())));
                }
                migration
            })
            .collect();

        Ok(migrations)
    }
}

/// Run a SQL script in its own transaction
async fn execute_script(
    ctx: &CancellationToken,
    db: &DatabaseConnection,
    sql: Arc<str>,
) -> Result<(), BoxError> {
    let run = async {
        let txn = db.begin().await?;
        txn.execute_unprepared(&sql).await?;
        txn.commit().await?;
        Ok::<_, sea_orm::DbErr>(())
    };

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err("migration cancelled".into()),
        result = run => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_load_pairs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0002_add_email.up.sql", "ALTER TABLE users ADD email TEXT;");
        write(dir.path(), "0001_create_users.up.sql", "CREATE TABLE users (id INTEGER);");
        write(dir.path(), "0001_create_users.down.sql", "DROP TABLE users;");
        write(dir.path(), "README.md", "not a migration");

        let migrations = SqlDirLoader::new(dir.path())
            .load(&CancellationToken::new())
            .await
            .unwrap();

        let versions: Vec<_> = migrations.iter().map(|m| m.version()).collect();
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(migrations[0].name(), "create_users");
        assert!(migrations[0].has_apply());
        assert!(migrations[0].has_revert());
        assert_eq!(migrations[1].name(), "add_email");
        assert!(!migrations[1].has_revert());
    }

    #[tokio::test]
    async fn test_invalid_file_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "create_users.up.sql", "SELECT 1;");

        let err = SqlDirLoader::new(dir.path())
            .load(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoaderError::InvalidKey { ref file, .. } if file == "create_users.up.sql"));
    }

    #[tokio::test]
    async fn test_duplicate_version_direction() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_first.up.sql", "SELECT 1;");
        write(dir.path(), "001_other.up.sql", "SELECT 1;");

        let err = SqlDirLoader::new(dir.path())
            .load(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoaderError::DuplicateFile {
                version: 1,
                direction: Direction::Run
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let err = SqlDirLoader::new("/nonexistent/rung/migrations")
            .load(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }
}
