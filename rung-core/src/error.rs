//! Migrator error types

use std::fmt;
use thiserror::Error;

use crate::migration::MigrationError;
use crate::migrator::Report;
use crate::store::StoreError;
use crate::version::Version;

/// Boxed error used for migration actions and store backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source list validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("migration version must be > 0, got {0}")]
    NonPositiveVersion(Version),

    #[error("migration order: {found} found after {after}")]
    OutOfOrder { found: Version, after: Version },

    #[error("duplicate migration version: {0}")]
    DuplicateVersion(Version),
}

/// Errors raised by a `run` or `revert` invocation
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The source list failed validation; the store was not touched
    #[error("invalid sources: {0}")]
    InvalidSources(#[from] SourceError),

    /// A non-initial revert target has no migration in the source list
    #[error("missing target version migration: {0}")]
    MissingTarget(Version),

    #[error("failed to init version store: {0}")]
    Init(#[source] StoreError),

    #[error("failed to get version store lock: {0}")]
    Lock(#[source] StoreError),

    #[error("failed to get version store state: {0}")]
    CurrentVersion(#[source] StoreError),

    #[error("failed to apply migration {version}: {source}")]
    Apply {
        version: Version,
        #[source]
        source: MigrationError,
    },

    #[error("failed to insert migration {version}: {source}")]
    RecordApplied {
        version: Version,
        #[source]
        source: StoreError,
    },

    #[error("failed to revert migration {version}: {source}")]
    Revert {
        version: Version,
        #[source]
        source: MigrationError,
    },

    #[error("failed to delete migration {version} from version store: {source}")]
    RecordReverted {
        version: Version,
        #[source]
        source: StoreError,
    },

    /// Cancelled between migrations; the version is the next one not started
    #[error("cancelled before migration {0}")]
    Cancelled(Version),

    /// The store records a version that no migration in the source list has
    #[error("missing remote version migration: {0}")]
    MissingRecorded(Version),

    #[error("failed to release version store lock: {0}")]
    Release(#[source] StoreError),

    /// A primary failure followed by a failure to release the lock
    #[error("{primary}; failed to release version store lock: {release}")]
    WithRelease {
        #[source]
        primary: Box<MigrateError>,
        release: StoreError,
    },
}

impl MigrateError {
    /// Join a release failure onto an optional primary failure
    pub fn join_release(primary: Option<MigrateError>, release: StoreError) -> MigrateError {
        match primary {
            Some(primary) => MigrateError::WithRelease {
                primary: Box::new(primary),
                release,
            },
            None => MigrateError::Release(release),
        }
    }

    /// The operational failure, looking through a joined release failure
    pub fn primary(&self) -> &MigrateError {
        match self {
            MigrateError::WithRelease { primary, .. } => primary.primary(),
            other => other,
        }
    }

    /// The lock was already held by another run
    pub fn is_locked(&self) -> bool {
        matches!(self.primary(), MigrateError::Lock(StoreError::Locked))
    }

    /// Configuration errors are detected before the store is touched
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.primary(),
            MigrateError::InvalidSources(_)
                | MigrateError::MissingTarget(_)
                | MigrateError::Apply {
                    source: MigrationError::NoApplyFunction { .. },
                    ..
                }
                | MigrateError::Revert {
                    source: MigrationError::NoRevertFunction { .. },
                    ..
                }
        )
    }

    /// Version the failure is attributed to, if any
    pub fn version(&self) -> Option<Version> {
        match self.primary() {
            MigrateError::Apply { version, .. }
            | MigrateError::RecordApplied { version, .. }
            | MigrateError::Revert { version, .. }
            | MigrateError::RecordReverted { version, .. } => Some(*version),
            MigrateError::MissingTarget(version)
            | MigrateError::MissingRecorded(version)
            | MigrateError::Cancelled(version) => Some(*version),
            _ => None,
        }
    }
}

/// A `run` or `revert` that stopped on an error.
///
/// Carries the migrations completed before the failure and whether the
/// version store lock may still be held, either left held for inspection or
/// because releasing it failed.
#[derive(Debug)]
pub struct MigrateFailure {
    pub report: Report,
    pub error: MigrateError,
    pub lock_held: bool,
}

impl fmt::Display for MigrateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stopped after {} migration(s) {}",
            self.report.direction,
            self.report.count(),
            self.report.direction.past_tense()
        )
    }
}

impl std::error::Error for MigrateFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Direction;

    #[test]
    fn test_join_release_without_primary() {
        let err = MigrateError::join_release(None, StoreError::backend("disk full"));
        assert!(matches!(err, MigrateError::Release(_)));
        assert_eq!(err.to_string(), "failed to release version store lock: disk full");
    }

    #[test]
    fn test_join_release_keeps_primary() {
        let primary = MigrateError::Apply {
            version: 2,
            source: MigrationError::Action("boom".into()),
        };
        let err = MigrateError::join_release(Some(primary), StoreError::backend("disk full"));

        assert_eq!(
            err.to_string(),
            "failed to apply migration 2: boom; failed to release version store lock: disk full"
        );
        assert_eq!(err.version(), Some(2));
        assert!(matches!(err.primary(), MigrateError::Apply { version: 2, .. }));
    }

    #[test]
    fn test_is_locked() {
        assert!(MigrateError::Lock(StoreError::Locked).is_locked());
        assert!(!MigrateError::Lock(StoreError::backend("io")).is_locked());
        assert!(!MigrateError::MissingTarget(5).is_locked());
    }

    #[test]
    fn test_is_configuration() {
        assert!(MigrateError::from(SourceError::DuplicateVersion(1)).is_configuration());
        assert!(MigrateError::MissingTarget(5).is_configuration());
        assert!(MigrateError::Apply {
            version: 1,
            source: MigrationError::NoApplyFunction {
                version: 1,
                name: "a".to_string()
            }
        }
        .is_configuration());
        assert!(!MigrateError::Init(StoreError::backend("io")).is_configuration());
        assert!(!MigrateError::MissingRecorded(4).is_configuration());
    }

    #[test]
    fn test_failure_display() {
        let failure = MigrateFailure {
            report: Report {
                direction: Direction::Run,
                versions: vec![1],
            },
            error: MigrateError::MissingTarget(9),
            lock_held: false,
        };
        assert_eq!(failure.to_string(), "run stopped after 1 migration(s) applied");
    }
}
