//! Version store contract
//!
//! A version store persists which migration versions have been applied and
//! provides the mutual-exclusion lock that serialises migration runs across
//! processes. The migrator only ever talks to persistence through this trait.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::version::Version;

/// Result type for version store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Version store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// The lock is held by someone else, possibly a crashed run
    #[error("version store is locked for writing")]
    Locked,

    /// Nothing has ever been applied; distinct from any numeric version
    #[error("initial version is current")]
    NoVersionsApplied,

    #[error("version {0} is already recorded")]
    DuplicateVersion(Version),

    #[error("version {0} not found")]
    VersionNotFound(Version),

    #[error("operation cancelled")]
    Cancelled,

    /// Error from the underlying persistence layer
    #[error("{0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    /// Wrap a backend error
    pub fn backend(err: impl Into<BoxError>) -> Self {
        StoreError::Backend(err.into())
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Locked)
    }

    pub fn is_no_versions_applied(&self) -> bool {
        matches!(self, StoreError::NoVersionsApplied)
    }
}

/// Persistent record of applied versions plus a cross-process lock.
///
/// Every operation is independently fallible. Implementations must make
/// `lock` fail fast with [`StoreError::Locked`] rather than wait.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Database handle passed to migration actions
    type Handle: Send + Sync;

    /// The handle migrations run against; the store owns its lifecycle
    fn handle(&self) -> &Self::Handle;

    /// Idempotently create whatever persistent structures the store needs
    async fn init(&self, ctx: &CancellationToken) -> StoreResult<()>;

    /// Acquire the lock, failing with [`StoreError::Locked`] if anyone holds it
    async fn lock(&self, ctx: &CancellationToken) -> StoreResult<()>;

    /// Release the lock
    async fn release(&self, ctx: &CancellationToken) -> StoreResult<()>;

    /// Maximum applied version, or [`StoreError::NoVersionsApplied`]
    async fn current_version(&self, ctx: &CancellationToken) -> StoreResult<Version>;

    /// Record a version as applied; recording it twice is an error
    async fn record_applied(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()>;

    /// Remove the record for a version; removing an unknown version is an error
    async fn record_reverted(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()>;
}

#[async_trait]
impl<S> VersionStore for std::sync::Arc<S>
where
    S: VersionStore + ?Sized,
{
    type Handle = S::Handle;

    fn handle(&self) -> &Self::Handle {
        (**self).handle()
    }

    async fn init(&self, ctx: &CancellationToken) -> StoreResult<()> {
        (**self).init(ctx).await
    }

    async fn lock(&self, ctx: &CancellationToken) -> StoreResult<()> {
        (**self).lock(ctx).await
    }

    async fn release(&self, ctx: &CancellationToken) -> StoreResult<()> {
        (**self).release(ctx).await
    }

    async fn current_version(&self, ctx: &CancellationToken) -> StoreResult<Version> {
        (**self).current_version(ctx).await
    }

    async fn record_applied(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        (**self).record_applied(ctx, version).await
    }

    async fn record_reverted(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        (**self).record_reverted(ctx, version).await
    }
}
