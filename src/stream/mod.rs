//! Real-time event distribution
//!
//! Producers publish [`Event`]s on the [`Hub`]; consumers hold a
//! [`Subscription`] per event class and receive the events addressed to
//! them. Three classes exist: actions, player changes and punishments.

mod error;
mod event;
mod hub;
mod sink;
mod subscription;

pub use error::{HubError, HubResult};
pub use event::{
    ActionEvent, ActionPayload, Event, EventBody, EventClass, GLOBAL_TARGET, Payload, PlayerEntry,
    PlayerEvent, PlayerPayload, PunishEvent, PunishPayload,
};
pub use hub::{Channel, ConsumerId, DEFAULT_OUTBOX_CAPACITY, Hub, Registry};
pub use sink::{EventSink, forward};
pub use subscription::Subscription;
