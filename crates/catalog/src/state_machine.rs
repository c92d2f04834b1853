//! Item lifecycle state machine.
//!
//! ```text
//! Available --rent-->               Rented
//! Available --reserve-->            Reserved
//! Reserved  --rent (holder)-->      Rented
//! Reserved  --cancel (holder)-->    Available
//! Rented    --reserve (not renter)  Rented, holder pending
//! Rented    --return (renter)-->    Reserved if a holder is pending, else Available
//! ```
//!
//! [`transition`] is pure: it reads an item snapshot and returns the next
//! occupancy plus an [`Effect`] describing the work the caller must carry out
//! (charges, rental records). It never performs that work itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use saber_core::AccountId;

use crate::item::{Item, ItemState, Occupancy};

/// What the acting account is trying to do to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Rent,
    /// `reservation_valid` tells whether a pending reservation holder still
    /// resolves to an account; a dangling holder is dropped on return.
    Return { reservation_valid: bool },
    Reserve,
    CancelReservation,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Rent => "rent",
            Operation::Return { .. } => "return",
            Operation::Reserve => "reserve",
            Operation::CancelReservation => "cancel_reservation",
        }
    }
}

/// Declarative description of the side effects a legal transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Charge the rental price to `borrower`, pay it to `payee` (the
    /// depositor), and open a rental record.
    OpenRental { borrower: AccountId, payee: AccountId },
    /// Evaluate overdue penalties for `borrower` and close the open rental
    /// record. `honoured_reservation` is the holder the item is now reserved
    /// for, if any.
    CloseRental {
        borrower: AccountId,
        honoured_reservation: Option<AccountId>,
    },
    /// Persist `holder` as the reservation holder. `visible` is false when the
    /// item stays rented and the reservation waits for the next return.
    RecordReservation { holder: AccountId, visible: bool },
    /// Drop `holder`'s reservation.
    ReleaseReservation { holder: AccountId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: Occupancy,
    pub next: Occupancy,
    pub effect: Effect,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    #[error("item is already rented")]
    AlreadyRented,

    #[error("item is already reserved")]
    AlreadyReserved,

    #[error("item is reserved for another account")]
    ReservedByOther,

    #[error("item is not rented by this account")]
    NotYourRental,

    #[error("item is not reserved by this account")]
    NotYourReservation,

    #[error("cannot {operation} an item that is {state}")]
    InvalidStateForOperation {
        state: ItemState,
        operation: &'static str,
    },
}

/// Decide whether `actor` may perform `operation` on `item`, and what follows.
pub fn transition(
    item: &Item,
    operation: Operation,
    actor: AccountId,
) -> Result<Transition, TransitionError> {
    let current = item.occupancy();
    let (next, effect) = match (current.state, operation) {
        (ItemState::Available, Operation::Rent) => {
            if current.reservation_holder.is_some_and(|holder| holder != actor) {
                return Err(TransitionError::ReservedByOther);
            }
            (rented_by(actor), open_rental(item, actor))
        }
        (ItemState::Reserved, Operation::Rent) => {
            if current.reservation_holder != Some(actor) {
                return Err(TransitionError::ReservedByOther);
            }
            (rented_by(actor), open_rental(item, actor))
        }
        (ItemState::Rented, Operation::Rent) => return Err(TransitionError::AlreadyRented),

        (ItemState::Rented, Operation::Return { reservation_valid }) => {
            if current.renter != Some(actor) {
                return Err(TransitionError::NotYourRental);
            }
            let honoured = current.reservation_holder.filter(|_| reservation_valid);
            let next = match honoured {
                Some(holder) => Occupancy {
                    state: ItemState::Reserved,
                    renter: None,
                    reservation_holder: Some(holder),
                },
                None => Occupancy::AVAILABLE,
            };
            (
                next,
                Effect::CloseRental {
                    borrower: actor,
                    honoured_reservation: honoured,
                },
            )
        }

        (ItemState::Available, Operation::Reserve) => {
            if current.reservation_holder.is_some() {
                return Err(TransitionError::AlreadyReserved);
            }
            (
                Occupancy {
                    state: ItemState::Reserved,
                    renter: None,
                    reservation_holder: Some(actor),
                },
                Effect::RecordReservation {
                    holder: actor,
                    visible: true,
                },
            )
        }
        (ItemState::Rented, Operation::Reserve) => {
            if current.renter == Some(actor) {
                return Err(TransitionError::AlreadyRented);
            }
            if current.reservation_holder.is_some() {
                return Err(TransitionError::AlreadyReserved);
            }
            (
                Occupancy {
                    reservation_holder: Some(actor),
                    ..current
                },
                Effect::RecordReservation {
                    holder: actor,
                    visible: false,
                },
            )
        }

        (ItemState::Reserved | ItemState::Rented, Operation::CancelReservation)
            if current.reservation_holder.is_some() =>
        {
            if current.reservation_holder != Some(actor) {
                return Err(TransitionError::NotYourReservation);
            }
            let next = match current.state {
                ItemState::Rented => Occupancy {
                    reservation_holder: None,
                    ..current
                },
                _ => Occupancy::AVAILABLE,
            };
            (next, Effect::ReleaseReservation { holder: actor })
        }

        (state, operation) => {
            return Err(TransitionError::InvalidStateForOperation {
                state,
                operation: operation.name(),
            });
        }
    };

    Ok(Transition {
        previous: current,
        next,
        effect,
    })
}

fn rented_by(actor: AccountId) -> Occupancy {
    Occupancy {
        state: ItemState::Rented,
        renter: Some(actor),
        reservation_holder: None,
    }
}

fn open_rental(item: &Item, actor: AccountId) -> Effect {
    Effect::OpenRental {
        borrower: actor,
        payee: item.depositor(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::ItemDraft;
    use chrono::Utc;
    use proptest::prelude::*;
    use saber_core::ItemId;

    fn test_item() -> Item {
        let draft = ItemDraft::new("O Cortiço", "Aluísio Azevedo").validate().unwrap();
        Item::from_draft(ItemId::new(), draft, AccountId::new(), None, Utc::now())
    }

    fn step(
        item: &mut Item,
        operation: Operation,
        actor: AccountId,
    ) -> Result<Effect, TransitionError> {
        let t = transition(item, operation, actor)?;
        item.apply(&t);
        Ok(t.effect)
    }

    const RETURN: Operation = Operation::Return {
        reservation_valid: true,
    };

    #[test]
    fn rent_available_item() {
        let mut item = test_item();
        let a = AccountId::new();

        let effect = step(&mut item, Operation::Rent, a).unwrap();

        assert_eq!(item.state(), ItemState::Rented);
        assert_eq!(item.renter(), Some(a));
        assert_eq!(
            effect,
            Effect::OpenRental {
                borrower: a,
                payee: item.depositor()
            }
        );
    }

    #[test]
    fn rented_item_cannot_be_rented_again() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();

        let err = transition(&item, Operation::Rent, b).unwrap_err();

        assert_eq!(err, TransitionError::AlreadyRented);
        assert_eq!(item.renter(), Some(a));
    }

    #[test]
    fn reservation_blocks_other_renters_but_not_holder() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Reserve, a).unwrap();
        assert_eq!(item.state(), ItemState::Reserved);

        assert_eq!(
            transition(&item, Operation::Rent, b).unwrap_err(),
            TransitionError::ReservedByOther
        );

        step(&mut item, Operation::Rent, a).unwrap();
        assert_eq!(item.state(), ItemState::Rented);
        assert_eq!(item.reservation_holder(), None);
    }

    #[test]
    fn only_renter_may_return() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();

        assert_eq!(
            transition(&item, RETURN, b).unwrap_err(),
            TransitionError::NotYourRental
        );
    }

    #[test]
    fn reservation_on_rented_item_takes_effect_at_return() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();

        let effect = step(&mut item, Operation::Reserve, b).unwrap();
        assert_eq!(effect, Effect::RecordReservation { holder: b, visible: false });
        assert_eq!(item.state(), ItemState::Rented);

        let effect = step(&mut item, RETURN, a).unwrap();
        assert_eq!(
            effect,
            Effect::CloseRental {
                borrower: a,
                honoured_reservation: Some(b)
            }
        );
        assert_eq!(item.state(), ItemState::Reserved);
        assert_eq!(item.reservation_holder(), Some(b));
    }

    #[test]
    fn dangling_reservation_is_dropped_on_return() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();
        step(&mut item, Operation::Reserve, b).unwrap();

        step(
            &mut item,
            Operation::Return {
                reservation_valid: false,
            },
            a,
        )
        .unwrap();

        assert_eq!(item.occupancy(), Occupancy::AVAILABLE);
    }

    #[test]
    fn renter_cannot_reserve_own_rental() {
        let mut item = test_item();
        let a = AccountId::new();
        step(&mut item, Operation::Rent, a).unwrap();

        assert_eq!(
            transition(&item, Operation::Reserve, a).unwrap_err(),
            TransitionError::AlreadyRented
        );
    }

    #[test]
    fn second_reservation_is_rejected() {
        let mut item = test_item();
        let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();
        step(&mut item, Operation::Reserve, b).unwrap();

        assert_eq!(
            transition(&item, Operation::Reserve, c).unwrap_err(),
            TransitionError::AlreadyReserved
        );
    }

    #[test]
    fn reserved_item_rejects_return_and_reserve() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Reserve, a).unwrap();

        assert_eq!(
            transition(&item, RETURN, a).unwrap_err(),
            TransitionError::InvalidStateForOperation {
                state: ItemState::Reserved,
                operation: "return"
            }
        );
        assert!(matches!(
            transition(&item, Operation::Reserve, b).unwrap_err(),
            TransitionError::InvalidStateForOperation { .. }
        ));
    }

    #[test]
    fn returning_an_available_item_is_invalid() {
        let item = test_item();
        assert!(matches!(
            transition(&item, RETURN, AccountId::new()).unwrap_err(),
            TransitionError::InvalidStateForOperation {
                state: ItemState::Available,
                ..
            }
        ));
    }

    #[test]
    fn holder_can_cancel_reservation() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Reserve, a).unwrap();

        assert_eq!(
            transition(&item, Operation::CancelReservation, b).unwrap_err(),
            TransitionError::NotYourReservation
        );
        step(&mut item, Operation::CancelReservation, a).unwrap();
        assert_eq!(item.occupancy(), Occupancy::AVAILABLE);
    }

    #[test]
    fn cancelling_pending_reservation_keeps_item_rented() {
        let mut item = test_item();
        let (a, b) = (AccountId::new(), AccountId::new());
        step(&mut item, Operation::Rent, a).unwrap();
        step(&mut item, Operation::Reserve, b).unwrap();

        step(&mut item, Operation::CancelReservation, b).unwrap();

        assert_eq!(item.state(), ItemState::Rented);
        assert_eq!(item.renter(), Some(a));
        assert_eq!(item.reservation_holder(), None);
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            Just(Operation::Rent),
            any::<bool>().prop_map(|reservation_valid| Operation::Return { reservation_valid }),
            Just(Operation::Reserve),
            Just(Operation::CancelReservation),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of attempted operations by any mix of actors
        /// ever produces an occupancy that breaks the item invariants, and a
        /// rejected operation leaves the item untouched.
        #[test]
        fn occupancy_invariants_hold(
            ops in prop::collection::vec((arb_operation(), 0usize..3), 0..60)
        ) {
            let actors = [AccountId::new(), AccountId::new(), AccountId::new()];
            let mut item = test_item();

            for (operation, who) in ops {
                let before = item.occupancy();
                match transition(&item, operation, actors[who]) {
                    Ok(t) => {
                        prop_assert_eq!(t.previous, before);
                        item.apply(&t);
                    }
                    Err(_) => prop_assert_eq!(item.occupancy(), before),
                }
                prop_assert!(item.occupancy().check().is_ok(), "broken: {:?}", item.occupancy());
            }
        }
    }
}
