//! Rental application layer: orchestration, locking, and storage boundaries.
//!
//! Domain crates decide (`saber-catalog`, `saber-ledger`, `saber-pricing`);
//! this crate loads state, applies their decisions atomically through a
//! [`RentalStore`], and emits notifications afterwards.

pub mod config;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod penalty;
pub mod queries;
pub mod store;

pub use config::{ConfigLoadError, RentalConfig};
pub use error::{ErrorKind, RentalError};
pub use locks::{LockGuard, LockKey, LockTable, LockTimeout};
pub use orchestrator::{Outcome, OutcomeDetails, RentalOrchestrator};
pub use penalty::{PenaltyEvaluator, PenaltyOutcome};
pub use queries::{AuditReport, BalanceMismatch, CatalogSummary};
pub use store::{Changeset, InMemoryRentalStore, RentalStore, StoreError};
