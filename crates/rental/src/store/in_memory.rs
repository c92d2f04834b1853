use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use saber_catalog::{Category, Item, ItemState, PenaltyRecord, RentalRecord};
use saber_core::{AccountId, AggregateRoot, ItemId, RentalId};
use saber_ledger::{Account, LedgerEntry};

use super::r#trait::{Changeset, RentalStore, StoreError};

#[derive(Debug)]
struct State {
    system: Account,
    items: HashMap<ItemId, Item>,
    item_order: Vec<ItemId>,
    accounts: HashMap<AccountId, Account>,
    account_order: Vec<AccountId>,
    categories: HashMap<String, Category>,
    rentals: Vec<RentalRecord>,
    penalties: Vec<PenaltyRecord>,
    entries: Vec<LedgerEntry>,
}

impl State {
    fn account(&self, id: AccountId) -> Option<&Account> {
        if id == self.system.id_typed() {
            Some(&self.system)
        } else {
            self.accounts.get(&id)
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.accounts.values().any(|a| a.name() == name)
    }

    /// Validate every staged write against current state without touching it.
    fn check(&self, changeset: &Changeset) -> Result<(), StoreError> {
        for (item, expected) in &changeset.items {
            let actual = self.items.get(item.id()).map(|i| i.version());
            expected
                .check(actual)
                .map_err(|e| StoreError::Concurrency(format!("item {}: {e}", item.id())))?;
        }

        let mut new_names = HashSet::new();
        for (account, expected) in &changeset.accounts {
            if account.is_system() {
                return Err(StoreError::Duplicate(
                    "the system account cannot be saved".to_string(),
                ));
            }
            let actual = self.accounts.get(account.id()).map(|a| a.version());
            expected
                .check(actual)
                .map_err(|e| StoreError::Concurrency(format!("account {}: {e}", account.id())))?;
            if actual.is_none()
                && (self.name_taken(account.name()) || !new_names.insert(account.name()))
            {
                return Err(StoreError::Duplicate(format!(
                    "account name '{}'",
                    account.name()
                )));
            }
        }

        let mut new_categories = HashSet::new();
        for category in &changeset.categories {
            if self.categories.contains_key(&category.name)
                || !new_categories.insert(category.name.as_str())
            {
                return Err(StoreError::Duplicate(format!(
                    "category name '{}'",
                    category.name
                )));
            }
        }

        let mut opening = HashSet::new();
        for record in &changeset.opened_rentals {
            let already_open = self
                .rentals
                .iter()
                .any(|r| r.item_id == record.item_id && r.is_open());
            if already_open || !opening.insert(record.item_id) {
                return Err(StoreError::Duplicate(format!(
                    "open rental for item {}",
                    record.item_id
                )));
            }
        }

        for record in &changeset.closed_rentals {
            match self.rentals.iter().find(|r| r.id == record.id) {
                None => return Err(StoreError::Missing(format!("rental {}", record.id))),
                Some(stored) if !stored.is_open() => {
                    return Err(StoreError::Concurrency(format!(
                        "rental {} is already closed",
                        record.id
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn apply(&mut self, changeset: Changeset) {
        for (mut item, _) in changeset.items {
            let id = item.id_typed();
            let next = self.items.get(&id).map(|i| i.version()).unwrap_or(0) + 1;
            item.mark_persisted(next);
            if self.items.insert(id, item).is_none() {
                self.item_order.push(id);
            }
        }

        for (mut account, _) in changeset.accounts {
            let id = account.id_typed();
            let next = self.accounts.get(&id).map(|a| a.version()).unwrap_or(0) + 1;
            account.mark_persisted(next);
            if self.accounts.insert(id, account).is_none() {
                self.account_order.push(id);
            }
        }

        for category in changeset.categories {
            self.categories.insert(category.name.clone(), category);
        }

        let closed: HashMap<RentalId, RentalRecord> = changeset
            .closed_rentals
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        for record in self.rentals.iter_mut() {
            if let Some(stamped) = closed.get(&record.id) {
                record.returned_at = stamped.returned_at;
            }
        }
        self.rentals.extend(changeset.opened_rentals);
        self.penalties.extend(changeset.penalties);
        self.entries.extend(changeset.entries);
    }
}

/// In-memory rental store.
///
/// Intended for tests/dev. A single `RwLock` around all tables makes every
/// commit trivially atomic.
#[derive(Debug)]
pub struct InMemoryRentalStore {
    state: RwLock<State>,
}

impl InMemoryRentalStore {
    pub fn new() -> Self {
        Self::with_system_account(Account::system(AccountId::new(), Utc::now()))
    }

    /// A store whose system account was opened at `opened_at`.
    pub fn opened_at(opened_at: DateTime<Utc>) -> Self {
        Self::with_system_account(Account::system(AccountId::new(), opened_at))
    }

    fn with_system_account(system: Account) -> Self {
        Self {
            state: RwLock::new(State {
                system,
                items: HashMap::new(),
                item_order: Vec::new(),
                accounts: HashMap::new(),
                account_order: Vec::new(),
                categories: HashMap::new(),
                rentals: Vec::new(),
                penalties: Vec::new(),
                entries: Vec::new(),
            }),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

impl Default for InMemoryRentalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RentalStore for InMemoryRentalStore {
    fn load_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    fn load_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.account(id).cloned())
    }

    fn system_account(&self) -> Result<Account, StoreError> {
        Ok(self.read()?.system.clone())
    }

    fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        let state = self.read()?;
        Ok(state.accounts.values().find(|a| a.name() == name).cloned())
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        Ok(self.read()?.categories.get(name).cloned())
    }

    fn load_open_rental(
        &self,
        item: ItemId,
        borrower: AccountId,
    ) -> Result<Option<RentalRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .rentals
            .iter()
            .rev()
            .find(|r| r.item_id == item && r.borrower == borrower && r.is_open())
            .cloned())
    }

    fn list_items(&self, state: Option<ItemState>) -> Result<Vec<Item>, StoreError> {
        let guard = self.read()?;
        Ok(guard
            .item_order
            .iter()
            .filter_map(|id| guard.items.get(id))
            .filter(|item| state.is_none_or(|s| item.state() == s))
            .cloned()
            .collect())
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let state = self.read()?;
        Ok(state
            .account_order
            .iter()
            .filter_map(|id| state.accounts.get(id))
            .cloned()
            .collect())
    }

    fn rentals_for(&self, borrower: AccountId) -> Result<Vec<RentalRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .rentals
            .iter()
            .filter(|r| r.borrower == borrower)
            .cloned()
            .collect())
    }

    fn penalties_for(&self, borrower: AccountId) -> Result<Vec<PenaltyRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .penalties
            .iter()
            .filter(|p| p.borrower == borrower)
            .cloned()
            .collect())
    }

    fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.read()?.entries.clone())
    }

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        if changeset.is_empty() {
            return Ok(());
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        state.check(&changeset)?;
        state.apply(changeset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saber_catalog::ItemDraft;

    fn item(depositor: AccountId) -> Item {
        let draft = ItemDraft::new("O Cortiço", "Aluísio Azevedo").validate().unwrap();
        Item::from_draft(ItemId::new(), draft, depositor, None, Utc::now())
    }

    #[test]
    fn commit_assigns_versions_and_keeps_deposit_order() {
        let store = InMemoryRentalStore::new();
        let owner = Account::regular(AccountId::new(), "ana", Utc::now());
        let first = item(owner.id_typed());
        let second = item(owner.id_typed());

        let mut changeset = Changeset::new();
        changeset
            .save_account(owner.clone())
            .save_item(first.clone())
            .save_item(second.clone());
        store.commit(changeset).unwrap();

        let listed = store.list_items(None).unwrap();
        assert_eq!(
            listed.iter().map(Item::id_typed).collect::<Vec<_>>(),
            vec![first.id_typed(), second.id_typed()]
        );
        assert!(listed.iter().all(|i| i.version() == 1));
        assert_eq!(
            store.load_account(owner.id_typed()).unwrap().unwrap().version(),
            1
        );
    }

    #[test]
    fn stale_snapshot_rejects_whole_changeset() {
        let store = InMemoryRentalStore::new();
        let owner = Account::regular(AccountId::new(), "ana", Utc::now());
        let book = item(owner.id_typed());

        let mut seed = Changeset::new();
        seed.save_account(owner.clone()).save_item(book.clone());
        store.commit(seed).unwrap();

        // `book` is still at version 0, so this save expects a new item.
        let mut stale = Changeset::new();
        stale.save_item(book).append_ledger_entry(LedgerEntry {
            id: saber_core::EntryId::new(),
            sender: None,
            receiver: Some(owner.id_typed()),
            amount: 10,
            reason: saber_ledger::TransferReason::DepositReward,
            occurred_at: Utc::now(),
        });

        let err = store.commit(stale).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert!(store.ledger_entries().unwrap().is_empty());
    }

    #[test]
    fn stale_account_save_is_a_version_conflict() {
        let store = InMemoryRentalStore::new();
        let ana = Account::regular(AccountId::new(), "ana", Utc::now());
        let mut seed = Changeset::new();
        seed.save_account(ana.clone());
        store.commit(seed).unwrap();

        let loaded = store.load_account(ana.id_typed()).unwrap().unwrap();
        let mut first = Changeset::new();
        first.save_account(loaded.clone());
        store.commit(first).unwrap();

        // Same snapshot again: the store has moved on to version 2.
        let mut second = Changeset::new();
        second.save_account(loaded);
        let err = store.commit(second).unwrap_err();
        let StoreError::Concurrency(message) = &err else {
            panic!("expected a concurrency error, got {err:?}");
        };
        assert!(message.contains(&format!("account {}", ana.id_typed())));
        assert!(message.contains("conflict: expected Exact(1), found Some(2)"));
        assert_eq!(store.load_account(ana.id_typed()).unwrap().unwrap().version(), 2);
    }

    #[test]
    fn duplicate_account_names_are_rejected() {
        let store = InMemoryRentalStore::new();
        let mut first = Changeset::new();
        first.save_account(Account::regular(AccountId::new(), "bia", Utc::now()));
        store.commit(first).unwrap();

        let mut second = Changeset::new();
        second.save_account(Account::regular(AccountId::new(), "bia", Utc::now()));
        assert!(matches!(
            store.commit(second).unwrap_err(),
            StoreError::Duplicate(_)
        ));
        assert_eq!(store.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn system_account_is_provisioned_and_resolvable() {
        let store = InMemoryRentalStore::new();
        let system = store.system_account().unwrap();
        assert!(system.is_system());
        assert_eq!(
            store.load_account(system.id_typed()).unwrap(),
            Some(system)
        );
        assert!(store.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn closing_an_unknown_rental_is_missing() {
        let store = InMemoryRentalStore::new();
        let record = RentalRecord::open(ItemId::new(), AccountId::new(), 7, Utc::now(), 7);
        let mut changeset = Changeset::new();
        changeset.close_rental_record(record);
        assert!(matches!(
            store.commit(changeset).unwrap_err(),
            StoreError::Missing(_)
        ));
    }
}
