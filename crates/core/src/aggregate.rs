//! Aggregate root trait for the long-lived catalog aggregates (items, accounts).

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// Items and accounts are owned by the storage collaborator and mutated by every
/// rental operation. The version lets the store reject a commit whose snapshot
/// went stale between load and write.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Starts at 0 for a never-persisted aggregate and is bumped by the store on
    /// every successful save.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The aggregate must not exist yet.
    New,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation derived from a loaded snapshot.
    pub fn of<A: AggregateRoot>(aggregate: &A) -> Self {
        match aggregate.version() {
            0 => ExpectedVersion::New,
            v => ExpectedVersion::Exact(v),
        }
    }

    /// `actual` is `None` when the aggregate does not exist.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::New, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    /// Like [`matches`](Self::matches), reporting a mismatch as a conflict.
    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!("expected {self:?}, found {actual:?}")))
        }
    }
}
