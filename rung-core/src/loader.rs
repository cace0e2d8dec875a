//! Migration source loaders

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::migration::{KeyError, Migration};
use crate::version::{Direction, Version};

/// Errors raised while loading migrations
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid migration file {file:?}: {source}")]
    InvalidKey {
        file: String,
        #[source]
        source: KeyError,
    },

    #[error("more than one {direction} file for migration {version}")]
    DuplicateFile { version: Version, direction: Direction },

    #[error("loading cancelled")]
    Cancelled,
}

/// Supplies the migrations known to a migrator.
///
/// Loaders may return migrations in any order; the migrator validates the
/// list before using it.
#[async_trait]
pub trait MigrationLoader<D>: Send + Sync {
    async fn load(&self, ctx: &CancellationToken) -> Result<Vec<Migration<D>>, LoaderError>;
}

/// Loader over a fixed list of migrations
pub struct StaticLoader<D> {
    migrations: Vec<Migration<D>>,
}

impl<D> StaticLoader<D> {
    pub fn new(migrations: impl IntoIterator<Item = Migration<D>>) -> Self {
        Self {
            migrations: migrations.into_iter().collect(),
        }
    }
}

impl<D> Default for StaticLoader<D> {
    fn default() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }
}

#[async_trait]
impl<D> MigrationLoader<D> for StaticLoader<D>
where
    D: Send + Sync,
{
    async fn load(&self, _ctx: &CancellationToken) -> Result<Vec<Migration<D>>, LoaderError> {
        Ok(self.migrations.clone())
    }
}
