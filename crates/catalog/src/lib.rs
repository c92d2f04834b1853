//! Catalog domain module: lendable items and their lifecycle.
//!
//! This crate contains business rules for items, implemented purely as
//! deterministic domain logic (no IO, no storage). The rental lifecycle is a
//! pure function in [`state_machine`]; callers interpret the effect it returns.

pub mod category;
pub mod draft;
pub mod item;
pub mod records;
pub mod state_machine;

pub use category::Category;
pub use draft::ItemDraft;
pub use item::{Item, ItemMetadata, ItemState, Occupancy};
pub use records::{PenaltyCategory, PenaltyRecord, RentalRecord};
pub use state_machine::{Effect, Operation, Transition, TransitionError, transition};
