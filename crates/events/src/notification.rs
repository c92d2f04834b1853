//! Rental domain events and the notification sink they are emitted into.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use saber_core::{AccountId, ItemId};

use crate::bus::EventBus;
use crate::envelope::EventEnvelope;
use crate::event::Event;

/// Event: coins were credited to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinReceived {
    pub account_id: AccountId,
    pub amount: u64,
    /// `None` when the coins were minted by the system account.
    pub source: Option<AccountId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an item was rented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRented {
    pub item_id: ItemId,
    pub title: String,
    pub borrower: AccountId,
    pub due_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an item was returned by its renter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReturned {
    pub item_id: ItemId,
    pub title: String,
    pub borrower: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an item was reserved, or a pending reservation took effect on return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReserved {
    pub item_id: ItemId,
    pub title: String,
    pub holder: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an overdue penalty was charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyApplied {
    pub item_id: ItemId,
    pub title: String,
    pub borrower: AccountId,
    pub amount: u64,
    pub overdue_days: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a reservation was withdrawn by its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub item_id: ItemId,
    pub title: String,
    pub holder: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RentalEvent {
    CoinReceived(CoinReceived),
    BookRented(BookRented),
    BookReturned(BookReturned),
    BookReserved(BookReserved),
    PenaltyApplied(PenaltyApplied),
    ReservationCancelled(ReservationCancelled),
}

impl Event for RentalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalEvent::CoinReceived(_) => "coin_received",
            RentalEvent::BookRented(_) => "book_rented",
            RentalEvent::BookReturned(_) => "book_returned",
            RentalEvent::BookReserved(_) => "book_reserved",
            RentalEvent::PenaltyApplied(_) => "penalty_applied",
            RentalEvent::ReservationCancelled(_) => "reservation_cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalEvent::CoinReceived(e) => e.occurred_at,
            RentalEvent::BookRented(e) => e.occurred_at,
            RentalEvent::BookReturned(e) => e.occurred_at,
            RentalEvent::BookReserved(e) => e.occurred_at,
            RentalEvent::PenaltyApplied(e) => e.occurred_at,
            RentalEvent::ReservationCancelled(e) => e.occurred_at,
        }
    }
}

/// Notification collaborator boundary.
///
/// Fire-and-forget: implementations swallow (and log) their own delivery
/// failures. Nothing emitted here can undo a committed rental operation.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: RentalEvent);
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn emit(&self, event: RentalEvent) {
        (**self).emit(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn emit(&self, _event: RentalEvent) {}
}

/// Sink that wraps events in envelopes and publishes them on an [`EventBus`].
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
    next_sequence: AtomicU64,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> NotificationSink for BusNotifier<B>
where
    B: EventBus<EventEnvelope<RentalEvent>>,
{
    fn emit(&self, event: RentalEvent) {
        let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let event_type = event.event_type();
        let envelope = EventEnvelope::new(Uuid::now_v7(), event_type, sequence_number, event);

        if let Err(err) = self.bus.publish(envelope) {
            tracing::warn!(
                event_type,
                sequence_number,
                error = ?err,
                "notification publish failed; event dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryEventBus, Subscription};

    fn returned_event() -> RentalEvent {
        RentalEvent::BookReturned(BookReturned {
            item_id: ItemId::new(),
            title: "Dom Casmurro".to_string(),
            borrower: AccountId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn bus_notifier_assigns_increasing_sequence_numbers() {
        let bus = Arc::new(InMemoryEventBus::new());
        let sub: Subscription<EventEnvelope<RentalEvent>> = bus.subscribe();
        let notifier = BusNotifier::new(bus.clone());

        notifier.emit(returned_event());
        notifier.emit(returned_event());

        let received = sub.drain();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].sequence_number(), 1);
        assert_eq!(received[1].sequence_number(), 2);
        assert_eq!(received[0].event_type(), "book_returned");
    }

    #[derive(Debug)]
    struct ClosedBus;

    impl EventBus<EventEnvelope<RentalEvent>> for ClosedBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<RentalEvent>) -> Result<(), Self::Error> {
            Err("closed")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<RentalEvent>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[test]
    fn publish_failures_do_not_escape_the_sink() {
        let notifier = BusNotifier::new(ClosedBus);
        notifier.emit(returned_event());
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(returned_event()).unwrap();
        assert_eq!(json["event"], "book_returned");
        assert_eq!(json["title"], "Dom Casmurro");
    }
}
