use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saber_core::{AccountId, AggregateRoot, CategoryId, DomainError, DomainResult, ItemId};

use crate::draft::ItemDraft;
use crate::state_machine::Transition;

/// Item lifecycle state. Items cycle indefinitely; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Available,
    Rented,
    Reserved,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Available => "available",
            ItemState::Rented => "rented",
            ItemState::Reserved => "reserved",
        }
    }
}

impl core::fmt::Display for ItemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of an item the state machine reads and rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub state: ItemState,
    pub renter: Option<AccountId>,
    pub reservation_holder: Option<AccountId>,
}

impl Occupancy {
    pub const AVAILABLE: Occupancy = Occupancy {
        state: ItemState::Available,
        renter: None,
        reservation_holder: None,
    };

    /// `renter` set ⇔ Rented; Available never carries a holder; Reserved always does.
    pub fn check(&self) -> DomainResult<()> {
        if self.renter.is_some() != (self.state == ItemState::Rented) {
            return Err(DomainError::invariant(format!(
                "renter must be set exactly when rented (state: {})",
                self.state
            )));
        }
        match (self.state, self.reservation_holder) {
            (ItemState::Available, Some(_)) => Err(DomainError::invariant(
                "available item cannot carry a reservation",
            )),
            (ItemState::Reserved, None) => {
                Err(DomainError::invariant("reserved item has no reservation holder"))
            }
            _ => Ok(()),
        }
    }
}

/// Optional bibliographic details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub isbn: Option<String>,
    pub summary: Option<String>,
    pub cover_url: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<u32>,
}

/// Aggregate root: a lendable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    title: String,
    author: String,
    metadata: ItemMetadata,
    category: Option<CategoryId>,
    depositor: AccountId,
    occupancy: Occupancy,
    deposited_at: DateTime<Utc>,
    version: u64,
}

impl Item {
    /// A freshly deposited item, `Available` and never persisted.
    pub fn from_draft(
        id: ItemId,
        draft: ItemDraft,
        depositor: AccountId,
        category: Option<CategoryId>,
        deposited_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: draft.title,
            author: draft.author,
            metadata: draft.metadata,
            category,
            depositor,
            occupancy: Occupancy::AVAILABLE,
            deposited_at,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn metadata(&self) -> &ItemMetadata {
        &self.metadata
    }

    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn depositor(&self) -> AccountId {
        self.depositor
    }

    pub fn deposited_at(&self) -> DateTime<Utc> {
        self.deposited_at
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    pub fn state(&self) -> ItemState {
        self.occupancy.state
    }

    pub fn renter(&self) -> Option<AccountId> {
        self.occupancy.renter
    }

    pub fn reservation_holder(&self) -> Option<AccountId> {
        self.occupancy.reservation_holder
    }

    /// Adopt the occupancy decided by a transition.
    pub fn apply(&mut self, transition: &Transition) {
        self.occupancy = transition.next;
    }

    /// Record the version the store assigned on a successful save.
    pub fn mark_persisted(&mut self, version: u64) {
        self.version = version;
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposited_item_is_available_and_unpersisted() {
        let draft = ItemDraft::new("Vidas Secas", "Graciliano Ramos").validate().unwrap();
        let item = Item::from_draft(ItemId::new(), draft, AccountId::new(), None, Utc::now());

        assert_eq!(item.state(), ItemState::Available);
        assert_eq!(item.renter(), None);
        assert_eq!(item.version(), 0);
        assert!(item.occupancy().check().is_ok());
    }

    #[test]
    fn occupancy_check_rejects_renter_without_rented_state() {
        let bad = Occupancy {
            state: ItemState::Available,
            renter: Some(AccountId::new()),
            reservation_holder: None,
        };
        assert!(matches!(bad.check(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn occupancy_check_rejects_reserved_without_holder() {
        let bad = Occupancy {
            state: ItemState::Reserved,
            renter: None,
            reservation_holder: None,
        };
        assert!(bad.check().is_err());
    }
}
