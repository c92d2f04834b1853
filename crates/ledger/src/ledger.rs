use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use saber_core::{AccountId, EntryId};

use crate::account::Account;
use crate::entry::{LedgerEntry, TransferReason};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Zero-coin transfers are a caller bug, not a no-op.
    #[error("transfer amount must be positive")]
    InvalidAmount,

    #[error("account {account} has {balance} coins, {required} required")]
    InsufficientFunds {
        account: AccountId,
        balance: u64,
        required: u64,
    },

    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    #[error("balance overflow on account {0}")]
    BalanceOverflow(AccountId),
}

/// Staged view of the accounts touched by one operation.
///
/// Accounts are loaded into the ledger with [`Ledger::track`]; every successful
/// [`Ledger::transfer`] mutates the staged balances and appends one entry. A
/// failed transfer leaves the ledger exactly as it was, so a caller can report a
/// shortfall and keep going (penalties) or drop the whole ledger (rent).
///
/// Nothing here is durable: [`Ledger::into_parts`] hands the touched accounts
/// and new entries to whoever commits them.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: BTreeMap<AccountId, Account>,
    touched: Vec<AccountId>,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an account resolvable by transfers. Re-tracking replaces the snapshot.
    pub fn track(&mut self, account: Account) {
        self.accounts.insert(account.id_typed(), account);
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Staged balance of a regular account.
    pub fn balance(&self, id: AccountId) -> Option<u64> {
        self.accounts.get(&id).and_then(Account::balance)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Move `amount` coins from `from` to `to`.
    ///
    /// `None` on either side (or an id that resolves to the system account)
    /// denotes the system: no balance check when sending, discarded when
    /// receiving. Both sides are validated before anything is mutated.
    pub fn transfer(
        &mut self,
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: u64,
        reason: TransferReason,
        occurred_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }

        let sender = self.resolve(from)?;
        let receiver = self.resolve(to)?;

        let debit = match sender {
            Some(id) => {
                let balance = self.balance(id).unwrap_or(0);
                if balance < amount {
                    return Err(LedgerError::InsufficientFunds {
                        account: id,
                        balance,
                        required: amount,
                    });
                }
                Some((id, balance - amount))
            }
            None => None,
        };

        let credit = match receiver {
            Some(id) => {
                // A self-transfer sees the post-debit balance.
                let base = match debit {
                    Some((debited, after)) if debited == id => after,
                    _ => self.balance(id).unwrap_or(0),
                };
                let after = base
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow(id))?;
                Some((id, after))
            }
            None => None,
        };

        for (id, balance) in debit.into_iter().chain(credit) {
            if let Some(account) = self.accounts.get_mut(&id) {
                account.set_balance(balance);
            }
            if !self.touched.contains(&id) {
                self.touched.push(id);
            }
        }

        let entry = LedgerEntry {
            id: EntryId::new(),
            sender,
            receiver,
            amount,
            reason,
            occurred_at,
        };
        tracing::debug!(
            sender = ?entry.sender,
            receiver = ?entry.receiver,
            amount,
            reason = ?reason,
            "ledger transfer staged"
        );
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Regular accounts whose balances changed, plus the new entries.
    pub fn into_parts(mut self) -> (Vec<Account>, Vec<LedgerEntry>) {
        let accounts = self
            .touched
            .iter()
            .filter_map(|id| self.accounts.remove(id))
            .collect();
        (accounts, self.entries)
    }

    /// Maps a party to the regular account it names, `None` meaning system.
    fn resolve(&self, party: Option<AccountId>) -> Result<Option<AccountId>, LedgerError> {
        match party {
            None => Ok(None),
            Some(id) => match self.accounts.get(&id) {
                None => Err(LedgerError::UnknownAccount(id)),
                Some(account) if account.is_system() => Ok(None),
                Some(_) => Ok(Some(id)),
            },
        }
    }
}

/// Rebuild regular-account balances from the full transfer log.
///
/// Accounts that never appear in the log are absent from the result (their
/// balance is zero).
pub fn replay_balances<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> BTreeMap<AccountId, i128> {
    let mut balances: BTreeMap<AccountId, i128> = BTreeMap::new();
    for entry in entries {
        if let Some(sender) = entry.sender {
            *balances.entry(sender).or_default() -= i128::from(entry.amount);
        }
        if let Some(receiver) = entry.receiver {
            *balances.entry(receiver).or_default() += i128::from(entry.amount);
        }
    }
    balances
}
