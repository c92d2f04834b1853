//! Persistence boundary for the rental engine.
//!
//! The orchestrator reads snapshots through [`RentalStore`] and writes every
//! change produced by one operation as a single [`Changeset`]. A store commits
//! a changeset completely or not at all.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryRentalStore;
pub use r#trait::{Changeset, RentalStore, StoreError};
