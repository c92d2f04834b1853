//! Rental operation pipeline.
//!
//! Every state-changing operation runs the same steps:
//!
//! ```text
//! 1. Lock the item (bounded wait, Busy on timeout)
//!   ↓
//! 2. Load the item, then lock the accounts whose balances may move
//!   ↓
//! 3. Decide with the pure state machine (Transition + Effect)
//!   ↓
//! 4. Interpret the Effect: stage transfers, records, the new occupancy
//!   ↓
//! 5. Commit the whole changeset atomically
//!   ↓
//! 6. Release locks, emit notifications
//! ```
//!
//! Any failure before step 5 drops the staged changeset, so a rejected
//! operation leaves no trace in the store. Notifications go out only after a
//! successful commit and cannot undo it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::field;

use saber_catalog::{
    Category, Effect, Item, ItemDraft, Operation, RentalRecord, Transition, transition,
};
use saber_core::{AccountId, AggregateRoot, Clock, ItemId, SystemClock};
use saber_events::{
    BookRented, BookReserved, BookReturned, CoinReceived, NotificationSink, PenaltyApplied,
    RentalEvent, ReservationCancelled,
};
use saber_ledger::{Account, Ledger, LedgerEntry, LedgerError, TransferReason};
use saber_pricing::PricingPolicy;

use crate::config::RentalConfig;
use crate::error::{ErrorKind, RentalError};
use crate::locks::{LockKey, LockTable};
use crate::penalty::{PenaltyEvaluator, PenaltyOutcome};
use crate::store::{Changeset, RentalStore};

/// Operation-specific details of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeDetails {
    Deposited {
        reward: u64,
    },
    Rented {
        rental: RentalRecord,
    },
    Returned {
        /// The closed record; `None` when no open record existed.
        rental: Option<RentalRecord>,
        penalty: PenaltyOutcome,
        /// Holder the item is now reserved for, if a reservation was honoured.
        reserved_for: Option<AccountId>,
    },
    Reserved {
        holder: AccountId,
        /// True when the item is still rented and the reservation waits.
        pending: bool,
    },
    ReservationCancelled {
        holder: AccountId,
    },
}

/// Result of a successful rental operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The item as committed.
    pub item: Item,
    pub message: String,
    pub details: OutcomeDetails,
}

#[derive(Debug)]
pub struct RentalOrchestrator<S, N, C = SystemClock> {
    pub(crate) store: S,
    notifier: N,
    clock: C,
    pricing: PricingPolicy,
    locks: LockTable,
}

impl<S, N, C> RentalOrchestrator<S, N, C> {
    pub fn new(
        store: S,
        notifier: N,
        clock: C,
        pricing: PricingPolicy,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            pricing,
            locks: LockTable::new(lock_timeout),
        }
    }

    /// Build from loaded configuration, validating the pricing policy.
    pub fn from_config(
        store: S,
        notifier: N,
        clock: C,
        config: &RentalConfig,
    ) -> Result<Self, RentalError> {
        let pricing = config.pricing_policy()?;
        Ok(Self::new(store, notifier, clock, pricing, config.lock_timeout()))
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn into_parts(self) -> (S, N, C) {
        (self.store, self.notifier, self.clock)
    }
}

impl<S, N, C> RentalOrchestrator<S, N, C>
where
    S: RentalStore,
    N: NotificationSink,
    C: Clock,
{
    /// Add a new item to the catalog and reward its depositor.
    pub fn deposit(&self, draft: ItemDraft, depositor: AccountId) -> Result<Outcome, RentalError> {
        let span = tracing::info_span!(
            "rental.deposit",
            depositor = %depositor,
            item_id = field::Empty
        );
        let _enter = span.enter();
        finish("deposit", self.run_deposit(draft, depositor, &span))
    }

    pub fn rent(&self, item_id: ItemId, actor: AccountId) -> Result<Outcome, RentalError> {
        let span = tracing::info_span!("rental.rent", item_id = %item_id, actor = %actor);
        let _enter = span.enter();
        finish("rent", self.run_rent(item_id, actor))
    }

    /// Give an item back. Overdue penalties are charged when affordable; an
    /// unaffordable penalty never blocks the return.
    pub fn return_item(&self, item_id: ItemId, actor: AccountId) -> Result<Outcome, RentalError> {
        let span = tracing::info_span!("rental.return", item_id = %item_id, actor = %actor);
        let _enter = span.enter();
        finish("return", self.run_return(item_id, actor))
    }

    pub fn reserve(&self, item_id: ItemId, actor: AccountId) -> Result<Outcome, RentalError> {
        let span = tracing::info_span!("rental.reserve", item_id = %item_id, actor = %actor);
        let _enter = span.enter();
        finish("reserve", self.run_reservation(item_id, actor, Operation::Reserve))
    }

    pub fn cancel_reservation(
        &self,
        item_id: ItemId,
        actor: AccountId,
    ) -> Result<Outcome, RentalError> {
        let span = tracing::info_span!(
            "rental.cancel_reservation",
            item_id = %item_id,
            actor = %actor
        );
        let _enter = span.enter();
        finish(
            "cancel_reservation",
            self.run_reservation(item_id, actor, Operation::CancelReservation),
        )
    }

    /// Open a regular account, minting `opening_grant` coins into it.
    pub fn open_account(&self, name: &str, opening_grant: u64) -> Result<Account, RentalError> {
        let span = tracing::info_span!("rental.open_account", name = %name.trim());
        let _enter = span.enter();
        finish("open_account", self.run_open_account(name, opening_grant))
    }

    fn run_deposit(
        &self,
        draft: ItemDraft,
        depositor: AccountId,
        span: &tracing::Span,
    ) -> Result<Outcome, RentalError> {
        let draft = draft.validate()?;

        let mut keys = vec![LockKey::Account(depositor)];
        if let Some(name) = &draft.category {
            keys.push(LockKey::CategoryName(name.clone()));
        }
        let guard = self.locks.acquire(keys)?;

        let account = self.load_actor(depositor)?;
        let system = self.store.system_account()?;
        let now = self.clock.now();
        let mut changeset = Changeset::new();

        let category = match &draft.category {
            None => None,
            Some(name) => match self.store.find_category_by_name(name)? {
                Some(existing) => Some(existing.id),
                None => {
                    let created = Category::for_name(name.clone());
                    tracing::debug!(category = %created.name, "creating category");
                    let id = created.id;
                    changeset.save_category(created);
                    Some(id)
                }
            },
        };

        let item = Item::from_draft(ItemId::new(), draft, depositor, category, now);
        span.record("item_id", field::display(item.id_typed()));

        let reward = self.pricing.deposit_reward();
        let mut ledger = Ledger::new();
        ledger.track(account);
        ledger.track(system.clone());
        stage_transfer(
            &mut ledger,
            system.id_typed(),
            depositor,
            reward,
            TransferReason::DepositReward,
            now,
        )?;

        stage_ledger(&mut changeset, ledger);
        changeset.save_item(item.clone());
        self.store.commit(changeset)?;
        drop(guard);

        let item = committed(item);
        tracing::info!(reward, "item deposited");
        if reward > 0 {
            self.notifier.emit(RentalEvent::CoinReceived(CoinReceived {
                account_id: depositor,
                amount: reward,
                source: None,
                occurred_at: now,
            }));
        }

        Ok(Outcome {
            message: format!("'{}' deposited; {reward} coins credited", item.title()),
            item,
            details: OutcomeDetails::Deposited { reward },
        })
    }

    fn run_rent(&self, item_id: ItemId, actor: AccountId) -> Result<Outcome, RentalError> {
        let mut guard = self.locks.acquire([LockKey::Item(item_id)])?;
        let mut item = self.load_item(item_id)?;
        guard.extend([LockKey::Account(actor), LockKey::Account(item.depositor())])?;

        let renter = self.load_actor(actor)?;
        let transition = self.decide(&item, Operation::Rent, actor)?;
        let Effect::OpenRental { borrower, payee } = transition.effect else {
            return Err(unexpected_effect(Operation::Rent, transition.effect));
        };

        let now = self.clock.now();
        let payee = match self.store.load_account(payee)? {
            Some(account) => account,
            None => {
                tracing::warn!(
                    depositor = %payee,
                    "depositor account missing; rent goes to system"
                );
                self.store.system_account()?
            }
        };

        let days = self.pricing.rental_period_days();
        let price = self.pricing.rental_price(days);
        let mut ledger = Ledger::new();
        ledger.track(renter);
        ledger.track(payee.clone());
        stage_transfer(
            &mut ledger,
            borrower,
            payee.id_typed(),
            price,
            TransferReason::RentalFee,
            now,
        )?;

        let rental = RentalRecord::open(item_id, borrower, price, now, days);
        item.apply(&transition);
        item.occupancy().check()?;

        let mut changeset = Changeset::new();
        stage_ledger(&mut changeset, ledger);
        changeset
            .save_item(item.clone())
            .append_rental_record(rental.clone());
        self.store.commit(changeset)?;
        drop(guard);

        let item = committed(item);
        tracing::info!(price, due_at = %rental.due_at, "item rented");
        self.notifier.emit(RentalEvent::BookRented(BookRented {
            item_id,
            title: item.title().to_string(),
            borrower,
            due_at: rental.due_at,
            occurred_at: now,
        }));
        if price > 0 && !payee.is_system() {
            self.notifier.emit(RentalEvent::CoinReceived(CoinReceived {
                account_id: payee.id_typed(),
                amount: price,
                source: Some(borrower),
                occurred_at: now,
            }));
        }

        Ok(Outcome {
            message: format!(
                "'{}' rented for {price} coins; due {}",
                item.title(),
                rental.due_at.format("%Y-%m-%d")
            ),
            item,
            details: OutcomeDetails::Rented { rental },
        })
    }

    fn run_return(&self, item_id: ItemId, actor: AccountId) -> Result<Outcome, RentalError> {
        let mut guard = self.locks.acquire([LockKey::Item(item_id)])?;
        let mut item = self.load_item(item_id)?;
        guard.extend([LockKey::Account(actor)])?;

        let borrower_account = self.load_actor(actor)?;
        let reservation_valid = match item.reservation_holder() {
            Some(holder) => self
                .store
                .load_account(holder)?
                .is_some_and(|account| !account.is_system()),
            None => false,
        };

        let transition = self.decide(&item, Operation::Return { reservation_valid }, actor)?;
        let Effect::CloseRental {
            borrower,
            honoured_reservation,
        } = transition.effect
        else {
            return Err(unexpected_effect(
                Operation::Return { reservation_valid },
                transition.effect,
            ));
        };
        if let (Some(holder), None) = (item.reservation_holder(), honoured_reservation) {
            tracing::info!(holder = %holder, "dropping reservation of unknown account");
        }

        let now = self.clock.now();
        let open = self.store.load_open_rental(item_id, borrower)?;
        if open.is_none() {
            tracing::warn!("no open rental record; returning without penalty evaluation");
        }

        let mut ledger = Ledger::new();
        ledger.track(borrower_account);
        let penalty = PenaltyEvaluator::new(&self.pricing).evaluate(
            &mut ledger,
            open.as_ref(),
            borrower,
            now,
        )?;

        let closed = match open {
            Some(mut record) => {
                record.close(now)?;
                Some(record)
            }
            None => None,
        };

        item.apply(&transition);
        item.occupancy().check()?;

        let mut changeset = Changeset::new();
        stage_ledger(&mut changeset, ledger);
        changeset.save_item(item.clone());
        if let Some(record) = &closed {
            changeset.close_rental_record(record.clone());
        }
        if let Some(record) = penalty.charged() {
            changeset.append_penalty_record(record.clone());
        }
        self.store.commit(changeset)?;
        drop(guard);

        let item = committed(item);
        tracing::info!(state = %item.state(), "item returned");
        let title = item.title().to_string();
        self.notifier.emit(RentalEvent::BookReturned(BookReturned {
            item_id,
            title: title.clone(),
            borrower,
            occurred_at: now,
        }));
        if let Some(record) = penalty.charged() {
            self.notifier.emit(RentalEvent::PenaltyApplied(PenaltyApplied {
                item_id,
                title: title.clone(),
                borrower,
                amount: record.amount,
                overdue_days: record.overdue_days,
                occurred_at: now,
            }));
        }
        if let Some(holder) = honoured_reservation {
            self.notifier.emit(RentalEvent::BookReserved(BookReserved {
                item_id,
                title: title.clone(),
                holder,
                occurred_at: now,
            }));
        }

        let mut message = format!("'{title}' returned");
        match &penalty {
            PenaltyOutcome::Charged(record) => {
                message.push_str(&format!(
                    "; {} days late, {} coins charged",
                    record.overdue_days, record.amount
                ));
            }
            PenaltyOutcome::Unpaid {
                amount,
                overdue_days,
                ..
            } => {
                message.push_str(&format!(
                    "; {overdue_days} days late, penalty of {amount} coins could not be paid"
                ));
            }
            PenaltyOutcome::OnTime | PenaltyOutcome::NoOpenRental => {}
        }
        if honoured_reservation.is_some() {
            message.push_str("; now held for the next reader");
        }

        Ok(Outcome {
            item,
            message,
            details: OutcomeDetails::Returned {
                rental: closed,
                penalty,
                reserved_for: honoured_reservation,
            },
        })
    }

    /// Reserve and cancel only touch the item; no balance moves.
    fn run_reservation(
        &self,
        item_id: ItemId,
        actor: AccountId,
        operation: Operation,
    ) -> Result<Outcome, RentalError> {
        let guard = self.locks.acquire([LockKey::Item(item_id)])?;
        let mut item = self.load_item(item_id)?;
        self.load_actor(actor)?;

        let transition = self.decide(&item, operation, actor)?;
        item.apply(&transition);
        item.occupancy().check()?;

        let mut changeset = Changeset::new();
        changeset.save_item(item.clone());
        self.store.commit(changeset)?;
        drop(guard);

        let item = committed(item);
        let now = self.clock.now();
        let title = item.title().to_string();

        let (message, details) = match transition.effect {
            Effect::RecordReservation { holder, visible } => {
                tracing::info!(pending = !visible, "item reserved");
                self.notifier.emit(RentalEvent::BookReserved(BookReserved {
                    item_id,
                    title: title.clone(),
                    holder,
                    occurred_at: now,
                }));
                let message = if visible {
                    format!("'{title}' reserved")
                } else {
                    format!("'{title}' is out; it will be held for you when returned")
                };
                (
                    message,
                    OutcomeDetails::Reserved {
                        holder,
                        pending: !visible,
                    },
                )
            }
            Effect::ReleaseReservation { holder } => {
                tracing::info!("reservation cancelled");
                self.notifier
                    .emit(RentalEvent::ReservationCancelled(ReservationCancelled {
                        item_id,
                        title: title.clone(),
                        holder,
                        occurred_at: now,
                    }));
                (
                    format!("reservation for '{title}' cancelled"),
                    OutcomeDetails::ReservationCancelled { holder },
                )
            }
            other => return Err(unexpected_effect(operation, other)),
        };

        Ok(Outcome {
            item,
            message,
            details,
        })
    }

    fn run_open_account(&self, name: &str, opening_grant: u64) -> Result<Account, RentalError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RentalError::Validation(
                "account name cannot be empty".to_string(),
            ));
        }

        let guard = self
            .locks
            .acquire([LockKey::AccountName(name.to_string())])?;
        if self.store.find_account_by_name(name)?.is_some() {
            return Err(RentalError::Validation(format!(
                "account name '{name}' is already taken"
            )));
        }

        let now = self.clock.now();
        let fresh = Account::regular(AccountId::new(), name, now);
        let id = fresh.id_typed();
        let system = self.store.system_account()?;

        let mut ledger = Ledger::new();
        ledger.track(fresh.clone());
        ledger.track(system.clone());
        stage_transfer(
            &mut ledger,
            system.id_typed(),
            id,
            opening_grant,
            TransferReason::OpeningGrant,
            now,
        )?;

        let (accounts, entries) = ledger.into_parts();
        let mut account = accounts
            .into_iter()
            .find(|a| a.id_typed() == id)
            .unwrap_or(fresh);

        let mut changeset = Changeset::new();
        changeset.save_account(account.clone());
        for entry in entries {
            changeset.append_ledger_entry(entry);
        }
        self.store.commit(changeset)?;
        drop(guard);

        account.mark_persisted(account.version() + 1);
        tracing::info!(account_id = %id, opening_grant, "account opened");
        if opening_grant > 0 {
            self.notifier.emit(RentalEvent::CoinReceived(CoinReceived {
                account_id: id,
                amount: opening_grant,
                source: None,
                occurred_at: now,
            }));
        }

        Ok(account)
    }

    fn load_item(&self, id: ItemId) -> Result<Item, RentalError> {
        self.store
            .load_item(id)?
            .ok_or_else(|| RentalError::not_found(format!("item {id}")))
    }

    /// Load the account acting in an operation. The system account never acts.
    fn load_actor(&self, id: AccountId) -> Result<Account, RentalError> {
        let account = self
            .store
            .load_account(id)?
            .ok_or_else(|| RentalError::not_found(format!("account {id}")))?;
        if account.is_system() {
            return Err(RentalError::Validation(
                "the system account cannot take part in rentals".to_string(),
            ));
        }
        Ok(account)
    }

    fn decide(
        &self,
        item: &Item,
        operation: Operation,
        actor: AccountId,
    ) -> Result<Transition, RentalError> {
        let transition = transition(item, operation, actor)?;
        tracing::debug!(
            operation = operation.name(),
            from = %transition.previous.state,
            to = %transition.next.state,
            "transition accepted"
        );
        Ok(transition)
    }
}

/// Stage a transfer unless it moves nothing. Zero-priced charges are skipped
/// rather than logged as empty entries.
fn stage_transfer(
    ledger: &mut Ledger,
    from: AccountId,
    to: AccountId,
    amount: u64,
    reason: TransferReason,
    at: DateTime<Utc>,
) -> Result<Option<LedgerEntry>, LedgerError> {
    if amount == 0 {
        return Ok(None);
    }
    ledger
        .transfer(Some(from), Some(to), amount, reason, at)
        .map(Some)
}

fn stage_ledger(changeset: &mut Changeset, ledger: Ledger) {
    let (accounts, entries) = ledger.into_parts();
    for account in accounts {
        changeset.save_account(account);
    }
    for entry in entries {
        changeset.append_ledger_entry(entry);
    }
}

/// The store bumps versions by one on every successful save.
fn committed(mut item: Item) -> Item {
    let version = item.version() + 1;
    item.mark_persisted(version);
    item
}

fn unexpected_effect(operation: Operation, effect: Effect) -> RentalError {
    RentalError::internal(format!(
        "{} produced unexpected effect {effect:?}",
        operation.name()
    ))
}

fn finish<T>(operation: &'static str, result: Result<T, RentalError>) -> Result<T, RentalError> {
    if let Err(err) = &result {
        match err.kind() {
            ErrorKind::Internal => {
                tracing::error!(operation, error = %err, "rental operation failed");
            }
            ErrorKind::Busy => {
                tracing::warn!(operation, error = %err, "rental operation timed out on locks");
            }
            kind => {
                tracing::info!(operation, kind = ?kind, error = %err, "rental operation rejected");
            }
        }
    }
    result
}
