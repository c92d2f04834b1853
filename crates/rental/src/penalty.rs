//! Overdue penalty evaluation at return time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saber_catalog::{PenaltyCategory, PenaltyRecord, RentalRecord};
use saber_core::{AccountId, PenaltyId};
use saber_ledger::{Ledger, LedgerError, TransferReason};
use saber_pricing::PricingPolicy;

/// Multiplier applied to overdue penalties.
const OVERDUE_MULTIPLIER: u32 = 1;

/// What happened to the penalty for one return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PenaltyOutcome {
    /// No open rental record was found; nothing to evaluate.
    NoOpenRental,
    /// Returned on or before the due date.
    OnTime,
    /// The borrower paid; the record was staged for persistence.
    Charged(PenaltyRecord),
    /// The borrower could not cover the penalty. Nothing was debited and the
    /// return proceeds anyway.
    Unpaid {
        amount: u64,
        overdue_days: u64,
        balance: u64,
    },
}

impl PenaltyOutcome {
    pub fn charged(&self) -> Option<&PenaltyRecord> {
        match self {
            PenaltyOutcome::Charged(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PenaltyEvaluator<'a> {
    pricing: &'a PricingPolicy,
}

impl<'a> PenaltyEvaluator<'a> {
    pub fn new(pricing: &'a PricingPolicy) -> Self {
        Self { pricing }
    }

    /// Charge `borrower` for returning late, moving coins to the system sink
    /// inside `ledger`.
    ///
    /// Shortfalls are reported as [`PenaltyOutcome::Unpaid`], not as errors.
    /// Any other ledger failure aborts the return.
    pub fn evaluate(
        &self,
        ledger: &mut Ledger,
        rental: Option<&RentalRecord>,
        borrower: AccountId,
        returned_at: DateTime<Utc>,
    ) -> Result<PenaltyOutcome, LedgerError> {
        let Some(rental) = rental else {
            return Ok(PenaltyOutcome::NoOpenRental);
        };

        let overdue_days = rental.overdue_days(returned_at);
        let base = self
            .pricing
            .penalty(i64::try_from(overdue_days).unwrap_or(i64::MAX));
        let amount = base.saturating_mul(u64::from(OVERDUE_MULTIPLIER));
        if amount == 0 {
            return Ok(PenaltyOutcome::OnTime);
        }

        match ledger.transfer(
            Some(borrower),
            None,
            amount,
            TransferReason::Penalty,
            returned_at,
        ) {
            Ok(_) => Ok(PenaltyOutcome::Charged(PenaltyRecord {
                id: PenaltyId::new(),
                borrower,
                item_id: rental.item_id,
                category: PenaltyCategory::Overdue,
                amount,
                multiplier: OVERDUE_MULTIPLIER,
                overdue_days,
                occurred_at: returned_at,
            })),
            Err(LedgerError::InsufficientFunds { balance, .. }) => {
                tracing::warn!(
                    borrower = %borrower,
                    item_id = %rental.item_id,
                    amount,
                    overdue_days,
                    balance,
                    "overdue penalty left unpaid"
                );
                Ok(PenaltyOutcome::Unpaid {
                    amount,
                    overdue_days,
                    balance,
                })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use saber_core::{Clock, ItemId, ManualClock};
    use saber_ledger::Account;
    use saber_pricing::{PolicyKind, PricingParams};

    fn pricing() -> PricingPolicy {
        PricingPolicy::new(
            PolicyKind::ByDuration,
            &PricingParams {
                deposit_reward: Some(10),
                rent_per_day: Some(1),
                penalty_per_day: Some(2),
                rental_period_days: Some(7),
            },
        )
        .unwrap()
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
    }

    fn funded(balance: u64) -> (Ledger, AccountId) {
        let id = AccountId::new();
        let opened = clock().now();
        let mut ledger = Ledger::new();
        ledger.track(Account::regular(id, "carla", opened));
        if balance > 0 {
            ledger
                .transfer(None, Some(id), balance, TransferReason::OpeningGrant, opened)
                .unwrap();
        }
        (ledger, id)
    }

    #[test]
    fn late_return_is_charged_per_day() {
        let pricing = pricing();
        let (mut ledger, borrower) = funded(50);
        let clock = clock();
        let rental = RentalRecord::open(ItemId::new(), borrower, 7, clock.now(), 7);
        clock.advance(Duration::days(17));

        let outcome = PenaltyEvaluator::new(&pricing)
            .evaluate(&mut ledger, Some(&rental), borrower, clock.now())
            .unwrap();

        let record = outcome.charged().unwrap();
        assert_eq!(record.amount, 20);
        assert_eq!(record.overdue_days, 10);
        assert_eq!(record.multiplier, 1);
        assert_eq!(ledger.balance(borrower), Some(30));
    }

    #[test]
    fn on_time_return_costs_nothing() {
        let pricing = pricing();
        let (mut ledger, borrower) = funded(5);
        let clock = clock();
        let rental = RentalRecord::open(ItemId::new(), borrower, 7, clock.now(), 7);
        clock.advance(Duration::days(7));

        let outcome = PenaltyEvaluator::new(&pricing)
            .evaluate(&mut ledger, Some(&rental), borrower, clock.now())
            .unwrap();

        assert_eq!(outcome, PenaltyOutcome::OnTime);
        assert_eq!(ledger.balance(borrower), Some(5));
    }

    #[test]
    fn shortfall_is_reported_not_debited() {
        let pricing = pricing();
        let (mut ledger, borrower) = funded(3);
        let clock = clock();
        let rental = RentalRecord::open(ItemId::new(), borrower, 7, clock.now(), 7);
        clock.advance(Duration::days(10));

        let outcome = PenaltyEvaluator::new(&pricing)
            .evaluate(&mut ledger, Some(&rental), borrower, clock.now())
            .unwrap();

        assert_eq!(
            outcome,
            PenaltyOutcome::Unpaid {
                amount: 6,
                overdue_days: 3,
                balance: 3
            }
        );
        assert_eq!(ledger.balance(borrower), Some(3));
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn missing_rental_record_skips_evaluation() {
        let pricing = pricing();
        let (mut ledger, borrower) = funded(0);
        let outcome = PenaltyEvaluator::new(&pricing)
            .evaluate(&mut ledger, None, borrower, clock().now())
            .unwrap();
        assert_eq!(outcome, PenaltyOutcome::NoOpenRental);
    }
}
