//! Migration sequencing and locking engine for Rung
//!
//! This crate decides which migrations to apply or revert, in what order and
//! under what locking discipline. Persistence is reached only through the
//! [`VersionStore`] contract, and migrations are supplied through a
//! [`MigrationLoader`] or directly as a list.
//!
//! ```no_run
//! # use rung_core::{CancellationToken, Migration, Migrator, VersionStore, RUN_TARGET_LATEST};
//! # async fn example<S: VersionStore<Handle = ()>>(store: S) {
//! let sources = vec![Migration::<()>::new(1, "create_users")
//!     .with_apply(|_ctx, _db| Box::pin(async { Ok(()) }))
//!     .with_revert(|_ctx, _db| Box::pin(async { Ok(()) }))];
//!
//! let migrator = Migrator::new(store, sources).hold_lock_on_failure(true);
//! let ctx = CancellationToken::new();
//! match migrator.run(&ctx, RUN_TARGET_LATEST).await {
//!     Ok(report) => println!("applied {} migrations", report.count()),
//!     Err(failure) => eprintln!("{failure}: {}", failure.error),
//! }
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod migration;
pub mod migrator;
pub mod store;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use error::{BoxError, MigrateError, MigrateFailure, SourceError};
pub use loader::{LoaderError, MigrationLoader, StaticLoader};
pub use migration::{KeyError, Migration, MigrationError, MigrationFn, MigrationFuture};
pub use migrator::{LogSink, Migrator, Report, Status};
pub use store::{StoreError, StoreResult, VersionStore};
pub use version::{Direction, Version, REVERT_TARGET_INITIAL, RUN_TARGET_LATEST};

// Cancellation context threaded through every store call and action
pub use tokio_util::sync::CancellationToken;
