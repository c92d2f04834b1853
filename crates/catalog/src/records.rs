//! Immutable-after-creation rental facts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use saber_core::{AccountId, DomainError, DomainResult, ItemId, PenaltyId, RentalId};

/// One borrowing episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalRecord {
    pub id: RentalId,
    pub item_id: ItemId,
    pub borrower: AccountId,
    /// Coins charged when the rental opened.
    pub price: u64,
    pub started_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl RentalRecord {
    pub fn open(
        item_id: ItemId,
        borrower: AccountId,
        price: u64,
        started_at: DateTime<Utc>,
        period_days: u32,
    ) -> Self {
        Self {
            id: RentalId::new(),
            item_id,
            borrower,
            price,
            started_at,
            due_at: started_at + Duration::days(i64::from(period_days)),
            returned_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Whole days past the due date at `at`; zero when on time.
    pub fn overdue_days(&self, at: DateTime<Utc>) -> u64 {
        let late = at.signed_duration_since(self.due_at).num_days();
        u64::try_from(late).unwrap_or(0)
    }

    /// Stamp the actual return. A record closes exactly once.
    pub fn close(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(returned_at) = self.returned_at {
            return Err(DomainError::invariant(format!(
                "rental {} already closed at {returned_at}",
                self.id
            )));
        }
        self.returned_at = Some(at);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyCategory {
    Overdue,
}

/// One charged penalty. Only written when the debit actually happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub id: PenaltyId,
    pub borrower: AccountId,
    pub item_id: ItemId,
    pub category: PenaltyCategory,
    /// Coins charged (base amount × multiplier).
    pub amount: u64,
    pub multiplier: u32,
    pub overdue_days: u64,
    pub occurred_at: DateTime<Utc>,
}
