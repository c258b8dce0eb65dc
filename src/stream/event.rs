//! Event model
//!
//! Every event shares one envelope: a routing target and a body that is
//! either a class-specific payload or a QUIT order. The payload type decides
//! which class (and which registry) an event belongs to.

use crate::punish::{PunishmentRecord, ReportEntry};
use crate::stream::hub::{Channel, Registry};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target that every consumer of a class accepts
pub const GLOBAL_TARGET: &str = "GLOBAL";

/// Event classes, each with its own consumer registry
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    #[display("action")]
    Action,
    #[display("player")]
    Player,
    #[display("punish")]
    Punish,
}

impl EventClass {
    pub const ALL: [Self; 3] = [Self::Action, Self::Player, Self::Punish];
}

/// A payload that can be carried by an [`Event`]
///
/// Implemented by the three payload types of this crate. The `channel`
/// accessor ties the payload to its slot in the hub registry.
pub trait Payload: Clone + fmt::Debug + Send + Sync + 'static {
    /// Class this payload is published on
    const CLASS: EventClass;

    /// Event type name used in logs
    fn kind(&self) -> &'static str;

    #[doc(hidden)]
    fn channel(registry: &mut Registry) -> &mut Channel<Self>;
}

/// Body of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventBody<P> {
    /// Payload for the consumer
    Deliver(P),
    /// Ends the subscription of every addressed consumer
    Quit,
}

/// Routed event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<P> {
    /// [`GLOBAL_TARGET`] or a consumer-name prefix
    pub target: String,
    pub body: EventBody<P>,
}

impl<P: Payload> Event<P> {
    pub fn new(target: impl Into<String>, payload: P) -> Self {
        Self {
            target: target.into(),
            body: EventBody::Deliver(payload),
        }
    }

    /// Event addressed to every consumer
    pub fn global(payload: P) -> Self {
        Self::new(GLOBAL_TARGET, payload)
    }

    /// QUIT order addressed to `target`
    pub fn quit(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            body: EventBody::Quit,
        }
    }

    pub fn class(&self) -> EventClass {
        P::CLASS
    }

    pub fn kind(&self) -> &'static str {
        match &self.body {
            EventBody::Deliver(payload) => payload.kind(),
            EventBody::Quit => "QUIT",
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(self.body, EventBody::Quit)
    }

    pub fn payload(&self) -> Option<&P> {
        match &self.body {
            EventBody::Deliver(payload) => Some(payload),
            EventBody::Quit => None,
        }
    }

    /// Whether a consumer named `consumer` accepts this event
    ///
    /// Routing is by prefix: a consumer named `lobby` accepts events
    /// targeted at `lobby-1`.
    pub fn is_addressed_to(&self, consumer: &str) -> bool {
        self.target == GLOBAL_TARGET || self.target.starts_with(consumer)
    }
}

/// Generic action sent to servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPayload {
    /// Console command for the server to run
    Dispatch { cmd: String },
    /// Message to broadcast to players
    Announce { message: String },
}

impl Payload for ActionPayload {
    const CLASS: EventClass = EventClass::Action;

    fn kind(&self) -> &'static str {
        match self {
            Self::Dispatch { .. } => "DISPATCH",
            Self::Announce { .. } => "ANNOUNCE",
        }
    }

    fn channel(registry: &mut Registry) -> &mut Channel<Self> {
        &mut registry.action
    }
}

/// Player state carried by player events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub uuid: String,
    pub groups: Vec<String>,
}

/// Player state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerPayload {
    /// Group membership of a player changed
    Groups(PlayerEntry),
}

impl Payload for PlayerPayload {
    const CLASS: EventClass = EventClass::Player;

    fn kind(&self) -> &'static str {
        match self {
            Self::Groups(_) => "GROUPS",
        }
    }

    fn channel(registry: &mut Registry) -> &mut Channel<Self> {
        &mut registry.player
    }
}

/// Moderation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunishPayload {
    /// A recorded punishment
    Punish {
        entry: PunishmentRecord,
        /// The receiving server has to enforce the punishment itself
        require_remote_execution: bool,
    },
    /// A player report for online moderators
    Report(ReportEntry),
}

impl PunishPayload {
    pub fn punishment(&self) -> Option<&PunishmentRecord> {
        match self {
            Self::Punish { entry, .. } => Some(entry),
            Self::Report(_) => None,
        }
    }

    pub fn report(&self) -> Option<&ReportEntry> {
        match self {
            Self::Report(report) => Some(report),
            Self::Punish { .. } => None,
        }
    }

    pub fn requires_remote_execution(&self) -> bool {
        matches!(
            self,
            Self::Punish {
                require_remote_execution: true,
                ..
            }
        )
    }
}

impl Payload for PunishPayload {
    const CLASS: EventClass = EventClass::Punish;

    fn kind(&self) -> &'static str {
        match self {
            Self::Punish { .. } => "PUNISH",
            Self::Report(_) => "REPORT",
        }
    }

    fn channel(registry: &mut Registry) -> &mut Channel<Self> {
        &mut registry.punish
    }
}

pub type ActionEvent = Event<ActionPayload>;
pub type PlayerEvent = Event<PlayerPayload>;
pub type PunishEvent = Event<PunishPayload>;
