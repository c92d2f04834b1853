//! Read-only views over the catalog and the ledger.
//!
//! Queries take no locks; each call reads a consistent snapshot of whatever
//! the store had committed when it ran.

use serde::{Deserialize, Serialize};

use saber_catalog::{Item, ItemState, PenaltyRecord, RentalRecord};
use saber_core::{AccountId, ItemId};
use saber_ledger::{LedgerEntry, replay_balances};

use crate::error::RentalError;
use crate::orchestrator::RentalOrchestrator;
use crate::store::RentalStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub total_items: usize,
    pub available: usize,
    pub rented: usize,
    pub reserved: usize,
    /// Regular accounts only.
    pub accounts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account: AccountId,
    pub stored: u64,
    pub replayed: i128,
}

/// Stored balances checked against a replay of the transfer log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub accounts_checked: usize,
    pub entries_replayed: usize,
    pub mismatches: Vec<BalanceMismatch>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl<S, N, C> RentalOrchestrator<S, N, C>
where
    S: RentalStore,
{
    pub fn item(&self, id: ItemId) -> Result<Item, RentalError> {
        self.store
            .load_item(id)?
            .ok_or_else(|| RentalError::not_found(format!("item {id}")))
    }

    /// Items in deposit order; `None` lists every state.
    pub fn list_items(&self, state: Option<ItemState>) -> Result<Vec<Item>, RentalError> {
        Ok(self.store.list_items(state)?)
    }

    pub fn catalog_summary(&self) -> Result<CatalogSummary, RentalError> {
        let items = self.store.list_items(None)?;
        let mut summary = CatalogSummary {
            total_items: items.len(),
            accounts: self.store.list_accounts()?.len(),
            ..CatalogSummary::default()
        };
        for item in &items {
            match item.state() {
                ItemState::Available => summary.available += 1,
                ItemState::Rented => summary.rented += 1,
                ItemState::Reserved => summary.reserved += 1,
            }
        }
        Ok(summary)
    }

    /// Every rental `account` has held, most recent first.
    pub fn rental_history(&self, account: AccountId) -> Result<Vec<RentalRecord>, RentalError> {
        self.require_account(account)?;
        let mut rentals = self.store.rentals_for(account)?;
        rentals.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(rentals)
    }

    pub fn penalties_for(&self, account: AccountId) -> Result<Vec<PenaltyRecord>, RentalError> {
        self.require_account(account)?;
        Ok(self.store.penalties_for(account)?)
    }

    /// Transfers where `account` is sender or receiver, in commit order.
    pub fn ledger_entries_for(&self, account: AccountId) -> Result<Vec<LedgerEntry>, RentalError> {
        self.require_account(account)?;
        Ok(self
            .store
            .ledger_entries()?
            .into_iter()
            .filter(|entry| entry.involves(account))
            .collect())
    }

    /// Current balance; `None` for the system account, which has none.
    pub fn balance(&self, account: AccountId) -> Result<Option<u64>, RentalError> {
        Ok(self
            .store
            .load_account(account)?
            .ok_or_else(|| RentalError::not_found(format!("account {account}")))?
            .balance())
    }

    pub fn audit(&self) -> Result<AuditReport, RentalError> {
        let entries = self.store.ledger_entries()?;
        let accounts = self.store.list_accounts()?;
        let replayed = replay_balances(&entries);

        let mismatches: Vec<BalanceMismatch> = accounts
            .iter()
            .filter_map(|account| {
                let stored = account.balance().unwrap_or(0);
                let expected = replayed.get(&account.id_typed()).copied().unwrap_or(0);
                (i128::from(stored) != expected).then(|| BalanceMismatch {
                    account: account.id_typed(),
                    stored,
                    replayed: expected,
                })
            })
            .collect();

        for mismatch in &mismatches {
            tracing::error!(
                account = %mismatch.account,
                stored = mismatch.stored,
                replayed = %mismatch.replayed,
                "stored balance disagrees with ledger replay"
            );
        }

        Ok(AuditReport {
            accounts_checked: accounts.len(),
            entries_replayed: entries.len(),
            mismatches,
        })
    }

    fn require_account(&self, account: AccountId) -> Result<(), RentalError> {
        match self.store.load_account(account)? {
            Some(_) => Ok(()),
            None => Err(RentalError::not_found(format!("account {account}"))),
        }
    }
}
