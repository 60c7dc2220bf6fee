//! Error types returned by tree operations.
//!
//! Lookups report absence through `Option`. `Error` covers the cases where a
//! caller asked for a change or a bounded query that could not be carried
//! out.

use thiserror::Error;

use crate::Key;

/// Errors reported by [`RbTree`](crate::RbTree).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No stored record matched the delete target. The tree is unchanged.
    #[error("no record with key {key} matches the delete target")]
    NotFound { key: Key },

    /// `max < min` was passed to a range query.
    #[error("empty key range: max {max} is below min {min}")]
    EmptyRange { min: Key, max: Key },

    /// The node arena could not grow to hold another record.
    #[error("out of memory while allocating a tree node")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, Error>;
