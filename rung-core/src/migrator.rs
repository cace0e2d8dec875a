//! The migration engine
//!
//! A [`Migrator`] owns a version store and a source list and exposes two entry
//! points. [`Migrator::run`] applies pending migrations in ascending order up
//! to a target; [`Migrator::revert`] reverts applied migrations in descending
//! order down to (and excluding) a target. Both hold the store lock for the
//! duration of the walk and stop at the first failure without compensating
//! for steps already recorded.

use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{MigrateError, MigrateFailure, SourceError};
use crate::loader::{LoaderError, MigrationLoader};
use crate::migration::Migration;
use crate::store::{StoreError, VersionStore};
use crate::version::{Direction, Version, REVERT_TARGET_INITIAL, RUN_TARGET_LATEST};

/// Sink for human-readable progress text
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Versions applied or reverted by one invocation, in execution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub direction: Direction,
    pub versions: Vec<Version>,
}

impl Report {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            versions: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Read-only view of the store against the source list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Current version, `None` when nothing has been applied
    pub current: Option<Version>,
    /// Source versions above the current version, ascending
    pub pending: Vec<Version>,
    /// The current version has no migration in the source list
    pub unknown_current: bool,
}

/// Outcome of a walk: progress so far and the first error, if any
type Walk = (Report, Option<MigrateError>);

/// Applies and reverts migrations against a version store
pub struct Migrator<S: VersionStore> {
    store: S,
    sources: Vec<Migration<S::Handle>>,
    log_sink: Option<LogSink>,
    debug_sink: Option<LogSink>,
    hold_lock_on_failure: bool,
}

impl<S: VersionStore> Migrator<S> {
    /// Create a migrator over a store and an ordered source list
    pub fn new(store: S, sources: Vec<Migration<S::Handle>>) -> Self {
        Self {
            store,
            sources,
            log_sink: None,
            debug_sink: None,
            hold_lock_on_failure: false,
        }
    }

    /// Create a migrator whose sources come from a loader
    pub async fn from_loader<L>(
        store: S,
        loader: &L,
        ctx: &CancellationToken,
    ) -> Result<Self, LoaderError>
    where
        L: MigrationLoader<S::Handle> + ?Sized,
    {
        let sources = loader.load(ctx).await?;
        Ok(Self::new(store, sources))
    }

    /// Send progress text to `sink`
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Send debug text to `sink`
    pub fn with_debug_sink(mut self, sink: LogSink) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Leave the lock held when a walk fails, for manual inspection
    pub fn hold_lock_on_failure(mut self, hold: bool) -> Self {
        self.hold_lock_on_failure = hold;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sources(&self) -> &[Migration<S::Handle>] {
        &self.sources
    }

    pub fn holds_lock_on_failure(&self) -> bool {
        self.hold_lock_on_failure
    }

    fn log(&self, args: fmt::Arguments<'_>) {
        if let Some(sink) = &self.log_sink {
            sink(&args.to_string());
        }
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        if let Some(sink) = &self.debug_sink {
            sink(&args.to_string());
        }
    }

    /// Validate the source list: positive, non-decreasing, no duplicates
    pub fn check(&self) -> Result<(), SourceError> {
        let mut prev: Version = 0;
        for migration in &self.sources {
            let version = migration.version();
            if version <= 0 {
                return Err(SourceError::NonPositiveVersion(version));
            }
            if version < prev {
                return Err(SourceError::OutOfOrder {
                    found: version,
                    after: prev,
                });
            }
            if version == prev {
                return Err(SourceError::DuplicateVersion(version));
            }
            prev = version;
        }
        Ok(())
    }

    fn find(&self, version: Version) -> Option<&Migration<S::Handle>> {
        self.sources
            .binary_search_by(|m| m.version().cmp(&version))
            .ok()
            .map(|idx| &self.sources[idx])
    }

    /// Current version, with "nothing applied" mapped to `None`
    async fn current(&self, ctx: &CancellationToken) -> Result<Option<Version>, StoreError> {
        match self.store.current_version(ctx).await {
            Ok(version) => Ok(Some(version)),
            Err(StoreError::NoVersionsApplied) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Validate, init and lock; the lock is held on success
    async fn prepare(&self, ctx: &CancellationToken) -> Result<(), MigrateError> {
        self.store.init(ctx).await.map_err(MigrateError::Init)?;
        self.store.lock(ctx).await.map_err(MigrateError::Lock)?;
        Ok(())
    }

    /// Apply every unapplied migration with a version up to `target`.
    ///
    /// [`RUN_TARGET_LATEST`] applies everything. A target below the current
    /// version selects nothing; `run` never reverts.
    pub async fn run(
        &self,
        ctx: &CancellationToken,
        target: Version,
    ) -> Result<Report, MigrateFailure> {
        let direction = Direction::Run;
        if let Err(err) = self.check() {
            return Err(self.fail(direction, err.into()));
        }
        if let Err(err) = self.prepare(ctx).await {
            return Err(self.fail(direction, err));
        }

        let (walk, started) = self.run_locked(ctx, target).await;
        self.finish(walk, started).await
    }

    async fn run_locked(&self, ctx: &CancellationToken, target: Version) -> (Walk, bool) {
        let mut report = Report::new(Direction::Run);

        let current = match self.current(ctx).await {
            Ok(current) => current,
            Err(err) => return ((report, Some(MigrateError::CurrentVersion(err))), false),
        };
        match current {
            Some(version) => self.debug(format_args!("current version: {}", version)),
            None => self.debug(format_args!("current version: initial")),
        }

        let to_apply: Vec<&Migration<S::Handle>> = self
            .sources
            .iter()
            .filter(|m| current.map_or(true, |c| m.version() > c))
            .filter(|m| target == RUN_TARGET_LATEST || m.version() <= target)
            .collect();

        self.log(format_args!("{} migrations to apply", to_apply.len()));
        if to_apply.is_empty() {
            return ((report, None), false);
        }

        let db = self.store.handle();
        let detached = CancellationToken::new();
        for migration in to_apply {
            if ctx.is_cancelled() {
                let err = MigrateError::Cancelled(migration.version());
                return ((report, Some(err)), true);
            }
            self.debug(format_args!(
                "applying migration: {} ({})",
                migration.version(), migration.name()
            ));

            if let Err(source) = migration.run(ctx, db).await {
                let err = MigrateError::Apply {
                    version: migration.version(),
                    source,
                };
                return ((report, Some(err)), true);
            }

            // A completed action is always recorded, even once cancelled
            if let Err(source) = self
                .store
                .record_applied(&detached, migration.version())
                .await
            {
                let err = MigrateError::RecordApplied {
                    version: migration.version(),
                    source,
                };
                return ((report, Some(err)), true);
            }

            report.versions.push(migration.version());
        }

        self.log(format_args!("applied {} migrations", report.count()));
        ((report, None), true)
    }

    /// Revert applied migrations above `target`, highest first.
    ///
    /// [`REVERT_TARGET_INITIAL`] reverts everything. Any other target must
    /// name a migration in the source list.
    pub async fn revert(
        &self,
        ctx: &CancellationToken,
        target: Version,
    ) -> Result<Report, MigrateFailure> {
        let direction = Direction::Revert;
        if let Err(err) = self.check() {
            return Err(self.fail(direction, err.into()));
        }
        if target != REVERT_TARGET_INITIAL && self.find(target).is_none() {
            let err = MigrateError::MissingTarget(target);
            return Err(self.fail(direction, err));
        }
        if let Err(err) = self.prepare(ctx).await {
            return Err(self.fail(direction, err));
        }

        let (walk, started) = self.revert_locked(ctx, target).await;
        self.finish(walk, started).await
    }

    async fn revert_locked(&self, ctx: &CancellationToken, target: Version) -> (Walk, bool) {
        let mut report = Report::new(Direction::Revert);

        let mut current = match self.current(ctx).await {
            Ok(Some(version)) => version,
            Ok(None) => {
                self.log(format_args!("already at initial version, nothing to revert"));
                return ((report, None), false);
            }
            Err(err) => return ((report, Some(MigrateError::CurrentVersion(err))), false),
        };
        self.debug(format_args!("current version: {}", current));

        let db = self.store.handle();
        let detached = CancellationToken::new();
        loop {
            if current <= target {
                self.debug(format_args!("reached target version {}, stopping", target));
                break;
            }

            // Re-resolved every step so a record unknown to the sources is caught
            let migration = match self.find(current) {
                Some(migration) => migration,
                None => return ((report, Some(MigrateError::MissingRecorded(current))), true),
            };
            if ctx.is_cancelled() {
                let err = MigrateError::Cancelled(migration.version());
                return ((report, Some(err)), true);
            }
            self.debug(format_args!(
                "reverting migration: {} ({})",
                migration.version(), migration.name()
            ));

            if let Err(source) = migration.revert(ctx, db).await {
                let err = MigrateError::Revert {
                    version: migration.version(),
                    source,
                };
                return ((report, Some(err)), true);
            }

            if let Err(source) = self
                .store
                .record_reverted(&detached, migration.version())
                .await
            {
                let err = MigrateError::RecordReverted {
                    version: migration.version(),
                    source,
                };
                return ((report, Some(err)), true);
            }

            report.versions.push(migration.version());

            current = match self.current(&detached).await {
                Ok(Some(version)) => version,
                Ok(None) => break,
                Err(err) => return ((report, Some(MigrateError::CurrentVersion(err))), true),
            };
        }

        self.log(format_args!("reverted {} migrations", report.count()));
        ((report, None), true)
    }

    /// Release the lock per policy and shape the final result
    async fn finish(
        &self,
        (report, error): Walk,
        walk_started: bool,
    ) -> Result<Report, MigrateFailure> {
        let error = match error {
            Some(error) if walk_started && self.hold_lock_on_failure => {
                self.debug(format_args!("holding lock due to failure"));
                tracing::warn!(
                    direction = %report.direction,
                    completed = report.count(),
                    error = %error,
                    "migration failed; version store lock left held for inspection"
                );
                return Err(MigrateFailure {
                    report,
                    error,
                    lock_held: true,
                });
            }
            other => other,
        };

        // Release is not cancellable; a skipped release leaves the store locked
        self.debug(format_args!("releasing version store lock"));
        let (error, lock_held) = match self.store.release(&CancellationToken::new()).await {
            Ok(()) => (error, false),
            Err(release) => {
                tracing::warn!(error = %release, "failed to release version store lock");
                (Some(MigrateError::join_release(error, release)), true)
            }
        };

        match error {
            None => Ok(report),
            Some(error) => Err(MigrateFailure {
                report,
                error,
                lock_held,
            }),
        }
    }

    /// Failure before the lock was taken, or while taking it
    fn fail(&self, direction: Direction, error: MigrateError) -> MigrateFailure {
        self.debug(format_args!("{} aborted: {}", direction, error));
        MigrateFailure {
            report: Report::new(direction),
            error,
            lock_held: false,
        }
    }

    /// Current version and pending migrations, without taking the lock
    pub async fn status(&self, ctx: &CancellationToken) -> Result<Status, MigrateError> {
        self.check()?;
        self.store.init(ctx).await.map_err(MigrateError::Init)?;
        let current = self
            .current(ctx)
            .await
            .map_err(MigrateError::CurrentVersion)?;

        let pending = self
            .sources
            .iter()
            .map(|m| m.version())
            .filter(|v| current.map_or(true, |c| *v > c))
            .collect();
        let unknown_current = current.is_some_and(|c| self.find(c).is_none());

        Ok(Status {
            current,
            pending,
            unknown_current,
        })
    }

    /// Release the store lock unconditionally.
    ///
    /// This is the operator's manual clear after a run left the lock held.
    pub async fn force_release(&self, ctx: &CancellationToken) -> Result<(), MigrateError> {
        self.log(format_args!("force releasing version store lock"));
        self.store.release(ctx).await.map_err(MigrateError::Release)
    }
}

impl<S: VersionStore> fmt::Debug for Migrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("sources", &self.sources)
            .field("hold_lock_on_failure", &self.hold_lock_on_failure)
            .finish_non_exhaustive()
    }
}
