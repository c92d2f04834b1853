//! Coin ledger: per-account balances plus an append-only transfer log.
//!
//! Pure domain logic only: no IO, no persistence concerns. A [`Ledger`] stages
//! transfers over the accounts one operation touches; the caller commits the
//! staged accounts and entries together or drops them.

pub mod account;
pub mod entry;
pub mod ledger;

pub use account::{Account, AccountKind};
pub use entry::{LedgerEntry, TransferReason};
pub use ledger::{Ledger, LedgerError, replay_balances};
