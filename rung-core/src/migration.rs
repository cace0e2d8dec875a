//! Versioned migration units

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::version::Version;

/// Future returned by a migration action
pub type MigrationFuture<'a> = BoxFuture<'a, Result<(), BoxError>>;

/// A forward or reverse migration action run against the store's database handle
pub type MigrationFn<D> =
    Arc<dyn for<'a> Fn(&'a CancellationToken, &'a D) -> MigrationFuture<'a> + Send + Sync>;

/// Errors raised when invoking a migration
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {name:?} ({version}) has no apply function")]
    NoApplyFunction { version: Version, name: String },

    #[error("migration {name:?} ({version}) has no revert function")]
    NoRevertFunction { version: Version, name: String },

    /// Error returned by the action itself
    #[error("{0}")]
    Action(#[source] BoxError),
}

/// Errors parsing a `"<version>_<name>"` migration key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid id {0:?}: '_' delimiter required")]
    MissingDelimiter(String),

    #[error("invalid id {0:?}: missing name part")]
    MissingName(String),

    #[error("invalid id {0:?}: non-integer id")]
    NotAnInteger(String),

    #[error("invalid id {0:?}: negative id")]
    Negative(String),
}

/// An immutable unit of schema change.
///
/// `D` is the database handle type handed out by the version store. Actions
/// are optional at construction; a missing action is only reported when the
/// migrator actually needs it.
pub struct Migration<D> {
    version: Version,
    name: String,
    apply: Option<MigrationFn<D>>,
    revert: Option<MigrationFn<D>>,
}

impl<D> Migration<D> {
    /// Create a migration with no actions
    pub fn new(version: Version, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            apply: None,
            revert: None,
        }
    }

    /// Create a migration from a `"<version>_<name>"` key such as `"0003_add_index"`
    pub fn from_key(key: &str) -> Result<Self, KeyError> {
        let (version, name) = parse_key(key)?;
        Ok(Self::new(version, name))
    }

    /// Set the forward action
    pub fn with_apply<F>(mut self, apply: F) -> Self
    where
        F: for<'a> Fn(&'a CancellationToken, &'a D) -> MigrationFuture<'a> + Send + Sync + 'static,
    {
        self.apply = Some(Arc::new(apply));
        self
    }

    /// Set the reverse action
    pub fn with_revert<F>(mut self, revert: F) -> Self
    where
        F: for<'a> Fn(&'a CancellationToken, &'a D) -> MigrationFuture<'a> + Send + Sync + 'static,
    {
        self.revert = Some(Arc::new(revert));
        self
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_apply(&self) -> bool {
        self.apply.is_some()
    }

    pub fn has_revert(&self) -> bool {
        self.revert.is_some()
    }

    /// Apply the migration to the database
    pub async fn run(&self, ctx: &CancellationToken, db: &D) -> Result<(), MigrationError> {
        let apply = self.apply.as_ref().ok_or_else(|| MigrationError::NoApplyFunction {
            version: self.version,
            name: self.name.clone(),
        })?;
        apply(ctx, db).await.map_err(MigrationError::Action)
    }

    /// Reverse the migration
    pub async fn revert(&self, ctx: &CancellationToken, db: &D) -> Result<(), MigrationError> {
        let revert = self.revert.as_ref().ok_or_else(|| MigrationError::NoRevertFunction {
            version: self.version,
            name: self.name.clone(),
        })?;
        revert(ctx, db).await.map_err(MigrationError::Action)
    }
}

impl<D> Clone for Migration<D> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            name: self.name.clone(),
            apply: self.apply.clone(),
            revert: self.revert.clone(),
        }
    }
}

impl<D> fmt::Debug for Migration<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("apply", &self.apply.is_some())
            .field("revert", &self.revert.is_some())
            .finish()
    }
}

/// Split a `"<version>_<name>"` key into its parts
pub fn parse_key(key: &str) -> Result<(Version, String), KeyError> {
    let (id, name) = key
        .split_once('_')
        .ok_or_else(|| KeyError::MissingDelimiter(key.to_string()))?;
    if name.is_empty() {
        return Err(KeyError::MissingName(key.to_string()));
    }
    let version: Version = id
        .parse()
        .map_err(|_| KeyError::NotAnInteger(key.to_string()))?;
    if version < 0 {
        return Err(KeyError::Negative(key.to_string()));
    }
    Ok((version, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_invokes_apply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let migration = Migration::<()>::new(1, "first").with_apply(move |_ctx, _db| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let ctx = CancellationToken::new();
        migration.run(&ctx, &()).await.unwrap();
        migration.run(&ctx, &()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_actions_reported_on_invocation() {
        let migration = Migration::<()>::new(7, "empty");
        let ctx = CancellationToken::new();

        match migration.run(&ctx, &()).await {
            Err(MigrationError::NoApplyFunction { version, name }) => {
                assert_eq!(version, 7);
                assert_eq!(name, "empty");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            migration.revert(&ctx, &()).await,
            Err(MigrationError::NoRevertFunction { version: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_action_error_returned_verbatim() {
        let migration = Migration::<()>::new(2, "broken")
            .with_revert(|_ctx, _db| Box::pin(async { Err(BoxError::from("table is locked")) }));

        let err = migration.revert(&CancellationToken::new(), &()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Action(_)));
        assert_eq!(err.to_string(), "table is locked");
    }

    #[test]
    fn test_debug_hides_actions() {
        let migration = Migration::<()>::new(3, "debuggable")
            .with_apply(|_ctx, _db| Box::pin(async { Ok(()) }));
        let debug = format!("{:?}", migration);
        assert!(debug.contains("version: 3"));
        assert!(debug.contains("apply: true"));
        assert!(debug.contains("revert: false"));
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("0003_add_index").unwrap(), (3, "add_index".to_string()));
        assert_eq!(parse_key("12_a_b").unwrap(), (12, "a_b".to_string()));
        assert_eq!(
            parse_key("0001"),
            Err(KeyError::MissingDelimiter("0001".to_string()))
        );
        assert_eq!(parse_key("1_"), Err(KeyError::MissingName("1_".to_string())));
        assert_eq!(
            parse_key("one_users"),
            Err(KeyError::NotAnInteger("one_users".to_string()))
        );
        assert_eq!(parse_key("-1_users"), Err(KeyError::Negative("-1_users".to_string())));
    }

    #[test]
    fn test_from_key() {
        let migration = Migration::<()>::from_key("0042_create_users").unwrap();
        assert_eq!(migration.version(), 42);
        assert_eq!(migration.name(), "create_users");
        assert!(!migration.has_apply());
    }
}
