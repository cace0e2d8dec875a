//! Migration versions and target sentinels

use std::fmt;

/// A migration version. Real versions are always strictly positive.
pub type Version = i64;

/// `run` target meaning "apply every pending migration".
pub const RUN_TARGET_LATEST: Version = -1;

/// `revert` target meaning "revert every applied migration".
pub const REVERT_TARGET_INITIAL: Version = 0;

/// Direction of a migration walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Forward application, ascending versions
    Run,
    /// Backward application, descending versions
    Revert,
}

impl Direction {
    /// Past-tense verb used in progress messages
    pub fn past_tense(self) -> &'static str {
        match self {
            Direction::Run => "applied",
            Direction::Revert => "reverted",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Run => write!(f, "run"),
            Direction::Revert => write!(f, "revert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_distinct() {
        assert_eq!(RUN_TARGET_LATEST, -1);
        assert_eq!(REVERT_TARGET_INITIAL, 0);
        assert_ne!(RUN_TARGET_LATEST, REVERT_TARGET_INITIAL);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Run.to_string(), "run");
        assert_eq!(Direction::Revert.to_string(), "revert");
        assert_eq!(Direction::Revert.past_tense(), "reverted");
    }
}
