use thiserror::Error;

use saber_catalog::{Category, Item, ItemState, PenaltyRecord, RentalRecord};
use saber_core::{AccountId, AggregateRoot, ExpectedVersion, ItemId};
use saber_ledger::{Account, LedgerEntry};

/// Store operation error.
///
/// These are infrastructure failures. Business rule violations never reach
/// the store; the orchestrator rejects them before building a changeset.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A saved record's version no longer matches the snapshot it was built from.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A record the changeset depends on does not exist.
    #[error("record missing: {0}")]
    Missing(String),

    /// A uniqueness rule would be broken (account or category name, open rental).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Every write produced by one rental operation.
///
/// Saved items and accounts carry the version they were loaded at; the store
/// rejects the whole changeset if any of them moved in the meantime. A
/// successful save bumps the stored version by one.
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub(crate) items: Vec<(Item, ExpectedVersion)>,
    pub(crate) accounts: Vec<(Account, ExpectedVersion)>,
    pub(crate) categories: Vec<Category>,
    pub(crate) opened_rentals: Vec<RentalRecord>,
    pub(crate) closed_rentals: Vec<RentalRecord>,
    pub(crate) penalties: Vec<PenaltyRecord>,
    pub(crate) entries: Vec<LedgerEntry>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an item. Saving the same item twice keeps the latest state and
    /// the first expectation.
    pub fn save_item(&mut self, item: Item) -> &mut Self {
        let expected = ExpectedVersion::of(&item);
        match self.items.iter_mut().find(|(i, _)| i.id() == item.id()) {
            Some(slot) => slot.0 = item,
            None => self.items.push((item, expected)),
        }
        self
    }

    pub fn save_account(&mut self, account: Account) -> &mut Self {
        let expected = ExpectedVersion::of(&account);
        match self.accounts.iter_mut().find(|(a, _)| a.id() == account.id()) {
            Some(slot) => slot.0 = account,
            None => self.accounts.push((account, expected)),
        }
        self
    }

    pub fn save_category(&mut self, category: Category) -> &mut Self {
        self.categories.push(category);
        self
    }

    pub fn append_rental_record(&mut self, record: RentalRecord) -> &mut Self {
        self.opened_rentals.push(record);
        self
    }

    /// Stage the return stamp of an existing open rental record.
    pub fn close_rental_record(&mut self, record: RentalRecord) -> &mut Self {
        self.closed_rentals.push(record);
        self
    }

    pub fn append_penalty_record(&mut self, record: PenaltyRecord) -> &mut Self {
        self.penalties.push(record);
        self
    }

    pub fn append_ledger_entry(&mut self, entry: LedgerEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.accounts.is_empty()
            && self.categories.is_empty()
            && self.opened_rentals.is_empty()
            && self.closed_rentals.is_empty()
            && self.penalties.is_empty()
            && self.entries.is_empty()
    }

    pub fn items(&self) -> &[(Item, ExpectedVersion)] {
        &self.items
    }

    pub fn accounts(&self) -> &[(Account, ExpectedVersion)] {
        &self.accounts
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn opened_rentals(&self) -> &[RentalRecord] {
        &self.opened_rentals
    }

    pub fn closed_rentals(&self) -> &[RentalRecord] {
        &self.closed_rentals
    }

    pub fn penalties(&self) -> &[PenaltyRecord] {
        &self.penalties
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}

/// Storage abstraction for catalog items, accounts, and the append-only
/// rental, penalty, and transfer logs.
///
/// Reads return owned snapshots. Implementations must make `commit`
/// all-or-nothing: either every staged write becomes visible or none does.
pub trait RentalStore: Send + Sync {
    fn load_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    fn load_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// The single system account, provisioned when the store is created.
    fn system_account(&self) -> Result<Account, StoreError>;

    fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError>;

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError>;

    /// The open rental of `item` held by `borrower`, if any.
    fn load_open_rental(
        &self,
        item: ItemId,
        borrower: AccountId,
    ) -> Result<Option<RentalRecord>, StoreError>;

    /// Items in deposit order, optionally filtered by state.
    fn list_items(&self, state: Option<ItemState>) -> Result<Vec<Item>, StoreError>;

    /// Regular accounts in opening order.
    fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Rental records where `borrower` is the renter, oldest first.
    fn rentals_for(&self, borrower: AccountId) -> Result<Vec<RentalRecord>, StoreError>;

    fn penalties_for(&self, borrower: AccountId) -> Result<Vec<PenaltyRecord>, StoreError>;

    /// The full transfer log in commit order.
    fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError>;
}

impl<S> RentalStore for std::sync::Arc<S>
where
    S: RentalStore + ?Sized,
{
    fn load_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).load_item(id)
    }

    fn load_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).load_account(id)
    }

    fn system_account(&self) -> Result<Account, StoreError> {
        (**self).system_account()
    }

    fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        (**self).find_account_by_name(name)
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        (**self).find_category_by_name(name)
    }

    fn load_open_rental(
        &self,
        item: ItemId,
        borrower: AccountId,
    ) -> Result<Option<RentalRecord>, StoreError> {
        (**self).load_open_rental(item, borrower)
    }

    fn list_items(&self, state: Option<ItemState>) -> Result<Vec<Item>, StoreError> {
        (**self).list_items(state)
    }

    fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        (**self).list_accounts()
    }

    fn rentals_for(&self, borrower: AccountId) -> Result<Vec<RentalRecord>, StoreError> {
        (**self).rentals_for(borrower)
    }

    fn penalties_for(&self, borrower: AccountId) -> Result<Vec<PenaltyRecord>, StoreError> {
        (**self).penalties_for(borrower)
    }

    fn ledger_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).ledger_entries()
    }

    fn commit(&self, changeset: Changeset) -> Result<(), StoreError> {
        (**self).commit(changeset)
    }
}
