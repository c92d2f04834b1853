//! Domain events and notification plumbing.
//!
//! Rental operations describe what happened as [`RentalEvent`]s. Delivery is
//! the notification collaborator's concern: the orchestrator hands events to a
//! [`NotificationSink`] after commit and never looks back.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{
    BookRented, BookReserved, BookReturned, BusNotifier, CoinReceived, NoopNotifier,
    NotificationSink, PenaltyApplied, RentalEvent, ReservationCancelled,
};
