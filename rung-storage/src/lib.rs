//! Storage for Rung
//!
//! A SQLite [`VersionStore`](rung_core::VersionStore) built on sea-orm, the
//! connection helper that opens it, and a loader that turns a directory of
//! `.up.sql` / `.down.sql` files into migrations.

pub mod connection;
pub mod error;
pub mod sql_loader;
pub mod sqlite_store;

pub use connection::connect;
pub use error::{StorageError, StorageResult};
pub use sql_loader::SqlDirLoader;
pub use sqlite_store::{AppliedVersion, SqliteVersionStore};

// Handle type migrations run against
pub use sea_orm::DatabaseConnection;
