//! Errors for key set operations.

use thiserror::Error;

/// Errors from deriving or rotating a transport key set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Rotation to an earlier period was requested
    ///
    /// Periods are monotonic; moving backwards would resurrect discarded key
    /// material.
    #[error("cannot rotate backwards from period {current} to {requested}")]
    BackwardRotation {
        /// Period the key set is at
        current: u64,
        /// Period that was requested
        requested: u64,
    },

    /// Period has no successor to derive the next slot from
    #[error("period {period} is out of range")]
    PeriodOverflow {
        /// Period that was requested
        period: u64,
    },
}
