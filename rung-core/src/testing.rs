//! In-memory version store for tests
//!
//! [`MemoryVersionStore`] keeps applied versions in a `BTreeSet`, counts calls
//! per operation and can be told to fail any operation. Its handle,
//! [`MemoryDb`], records every action run against it so tests can assert the
//! order migrations were applied and reverted in.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::migration::Migration;
use crate::store::{StoreError, StoreResult, VersionStore};
use crate::version::{Direction, Version};

/// Version store operations, for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Init,
    Lock,
    Release,
    CurrentVersion,
    RecordApplied,
    RecordReverted,
}

/// Database handle that records the actions executed against it
#[derive(Debug, Default)]
pub struct MemoryDb {
    events: Mutex<Vec<(Direction, Version)>>,
}

impl MemoryDb {
    pub fn record(&self, direction: Direction, version: Version) {
        self.events.lock().push((direction, version));
    }

    /// Every action executed so far, in order
    pub fn events(&self) -> Vec<(Direction, Version)> {
        self.events.lock().clone()
    }

    /// Versions of actions executed in `direction`, in order
    pub fn versions(&self, direction: Direction) -> Vec<Version> {
        self.events
            .lock()
            .iter()
            .filter(|(d, _)| *d == direction)
            .map(|(_, v)| *v)
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    applied: BTreeSet<Version>,
    locked: bool,
    calls: HashMap<StoreOp, usize>,
    failing: HashSet<StoreOp>,
}

/// Version store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    db: MemoryDb,
    state: Mutex<State>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `versions` already recorded as applied
    pub fn with_applied(versions: impl IntoIterator<Item = Version>) -> Self {
        let store = Self::new();
        store.state.lock().applied.extend(versions);
        store
    }

    /// Make every subsequent call to `op` fail with a backend error
    pub fn fail_on(&self, op: StoreOp) {
        self.state.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Applied versions, ascending
    pub fn applied(&self) -> Vec<Version> {
        self.state.lock().applied.iter().copied().collect()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Simulate a lock left behind by another run
    pub fn set_locked(&self, locked: bool) {
        self.state.lock().locked = locked;
    }

    /// Number of times `op` has been called, including failed calls
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    fn enter(
        &self,
        ctx: &CancellationToken,
        op: StoreOp,
    ) -> StoreResult<parking_lot::MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if state.failing.contains(&op) {
            return Err(StoreError::backend(format!("injected {:?} failure", op)));
        }
        Ok(state)
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    type Handle = MemoryDb;

    fn handle(&self) -> &MemoryDb {
        &self.db
    }

    async fn init(&self, ctx: &CancellationToken) -> StoreResult<()> {
        self.enter(ctx, StoreOp::Init)?;
        Ok(())
    }

    async fn lock(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let mut state = self.enter(ctx, StoreOp::Lock)?;
        if state.locked {
            return Err(StoreError::Locked);
        }
        state.locked = true;
        Ok(())
    }

    async fn release(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let mut state = self.enter(ctx, StoreOp::Release)?;
        state.locked = false;
        Ok(())
    }

    async fn current_version(&self, ctx: &CancellationToken) -> StoreResult<Version> {
        let state = self.enter(ctx, StoreOp::CurrentVersion)?;
        state
            .applied
            .iter()
            .next_back()
            .copied()
            .ok_or(StoreError::NoVersionsApplied)
    }

    async fn record_applied(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        let mut state = self.enter(ctx, StoreOp::RecordApplied)?;
        if !state.applied.insert(version) {
            return Err(StoreError::DuplicateVersion(version));
        }
        Ok(())
    }

    async fn record_reverted(&self, ctx: &CancellationToken, version: Version) -> StoreResult<()> {
        let mut state = self.enter(ctx, StoreOp::RecordReverted)?;
        if !state.applied.remove(&version) {
            return Err(StoreError::VersionNotFound(version));
        }
        Ok(())
    }
}

/// Migration whose actions record themselves on the [`MemoryDb`]
pub fn recording_migration(version: Version) -> Migration<MemoryDb> {
    Migration::new(version, format!("migration_{}", version))
        .with_apply(move |_ctx, db: &MemoryDb| {
            Box::pin(async move {
                db.record(Direction::Run, version);
                Ok(())
            })
        })
        .with_revert(move |_ctx, db: &MemoryDb| {
            Box::pin(async move {
                db.record(Direction::Revert, version);
                Ok(())
            })
        })
}

/// Recording migrations for each of `versions`, in the order given
pub fn recording_migrations(
    versions: impl IntoIterator<Item = Version>,
) -> Vec<Migration<MemoryDb>> {
    versions.into_iter().map(recording_migration).collect()
}

/// Recording migration whose apply action fails without touching the db
pub fn failing_apply(version: Version) -> Migration<MemoryDb> {
    Migration::new(version, format!("failing_{}", version))
        .with_apply(move |_ctx, _db: &MemoryDb| {
            Box::pin(async move { Err(BoxError::from(format!("apply {} failed", version))) })
        })
        .with_revert(move |_ctx, db: &MemoryDb| {
            Box::pin(async move {
                db.record(Direction::Revert, version);
                Ok(())
            })
        })
}

/// Recording migration whose revert action fails without touching the db
pub fn failing_revert(version: Version) -> Migration<MemoryDb> {
    Migration::new(version, format!("failing_{}", version))
        .with_apply(move |_ctx, db: &MemoryDb| {
            Box::pin(async move {
                db.record(Direction::Run, version);
                Ok(())
            })
        })
        .with_revert(move |_ctx, _db: &MemoryDb| {
            Box::pin(async move { Err(BoxError::from(format!("revert {} failed", version))) })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = MemoryVersionStore::new();
        let ctx = CancellationToken::new();

        store.lock(&ctx).await.unwrap();
        assert!(matches!(store.lock(&ctx).await, Err(StoreError::Locked)));
        store.release(&ctx).await.unwrap();
        store.lock(&ctx).await.unwrap();
        assert_eq!(store.calls(StoreOp::Lock), 3);
    }

    #[tokio::test]
    async fn test_current_version_tracks_maximum() {
        let store = MemoryVersionStore::new();
        let ctx = CancellationToken::new();

        assert!(matches!(
            store.current_version(&ctx).await,
            Err(StoreError::NoVersionsApplied)
        ));
        store.record_applied(&ctx, 3).await.unwrap();
        store.record_applied(&ctx, 1).await.unwrap();
        assert_eq!(store.current_version(&ctx).await.unwrap(), 3);

        assert!(matches!(
            store.record_applied(&ctx, 3).await,
            Err(StoreError::DuplicateVersion(3))
        ));
        store.record_reverted(&ctx, 3).await.unwrap();
        assert_eq!(store.current_version(&ctx).await.unwrap(), 1);
        assert!(matches!(
            store.record_reverted(&ctx, 3).await,
            Err(StoreError::VersionNotFound(3))
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_and_cancellation() {
        let store = MemoryVersionStore::new();
        let ctx = CancellationToken::new();

        store.fail_on(StoreOp::Init);
        assert!(matches!(store.init(&ctx).await, Err(StoreError::Backend(_))));
        store.clear_failures();
        store.init(&ctx).await.unwrap();

        ctx.cancel();
        assert!(matches!(store.init(&ctx).await, Err(StoreError::Cancelled)));
        assert_eq!(store.calls(StoreOp::Init), 3);
    }

    #[tokio::test]
    async fn test_recording_migration_records_on_db() {
        let db = MemoryDb::default();
        let ctx = CancellationToken::new();
        let migration = recording_migration(4);

        migration.run(&ctx, &db).await.unwrap();
        migration.revert(&ctx, &db).await.unwrap();
        assert_eq!(db.events(), vec![(Direction::Run, 4), (Direction::Revert, 4)]);
    }
}
