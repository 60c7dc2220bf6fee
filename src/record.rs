//! Records stored in the tree.
//!
//! The tree orders records by a single integer key and treats everything
//! else as opaque payload. Full structural equality (`PartialEq`) is only
//! consulted when picking one record out of several that share a key.

use std::fmt;

/// Ordering key type.
pub type Key = i64;

/// A record with an integer ordering key.
pub trait Keyed {
    fn key(&self) -> Key;
}

impl Keyed for Key {
    #[inline]
    fn key(&self) -> Key {
        *self
    }
}

impl<P> Keyed for (Key, P) {
    #[inline]
    fn key(&self) -> Key {
        self.0
    }
}

/// An employee, ordered by salary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Employee {
    pub salary: Key,
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
}

impl Employee {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        job_title: impl Into<String>,
        salary: Key,
    ) -> Self {
        Self {
            salary,
            first_name: first_name.into(),
            last_name: last_name.into(),
            job_title: job_title.into(),
        }
    }
}

impl Keyed for Employee {
    #[inline]
    fn key(&self) -> Key {
        self.salary
    }
}

impl fmt::Display for Employee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, {} (${})",
            self.first_name, self.last_name, self.job_title, self.salary
        )
    }
}
