//! Consumer registry and fan-out
//!
//! One [`Hub`] is built at startup and shared behind an `Arc`. It keeps a
//! registry per event class, all three guarded by a single mutex. Publishing
//! holds that mutex for the whole fan-out, which gives every class a total
//! publish order.
//!
//! Each consumer owns a bounded outbox. Publishing never waits on a
//! consumer: a consumer whose outbox is full is evicted and its subscription
//! ends with [`HubError::Overflow`](crate::stream::HubError::Overflow) once
//! it has drained what it already received. A QUIT that finds the outbox
//! full still ends the subscription cleanly.

use crate::HUB_TARGET;
use crate::punish::{PunishmentRecord, ReportEntry};
use crate::stream::event::{
    ActionPayload, Event, EventClass, GLOBAL_TARGET, Payload, PlayerEntry, PlayerPayload,
    PunishPayload,
};
use crate::stream::subscription::Subscription;
use derive_more::Display;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Default number of undelivered events a consumer may hold
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Hub-unique consumer handle
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("#{_0}")]
pub struct ConsumerId(u64);

/// Why the hub dropped a registration, read by the subscription once its
/// outbox is drained
#[derive(Debug, Default)]
pub(crate) struct Ejection {
    evicted: AtomicBool,
    quit: AtomicBool,
}

impl Ejection {
    pub(crate) fn evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    pub(crate) fn quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }
}

/// A registered consumer
pub(crate) struct Registration<P> {
    pub(crate) name: String,
    pub(crate) sender: mpsc::Sender<Event<P>>,
    pub(crate) ejection: Arc<Ejection>,
}

/// Consumers of one event class
pub struct Channel<P> {
    pub(crate) consumers: HashMap<ConsumerId, Registration<P>>,
}

impl<P> Default for Channel<P> {
    fn default() -> Self {
        Self {
            consumers: HashMap::new(),
        }
    }
}

impl<P> Channel<P> {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .consumers
            .values()
            .map(|registration| registration.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Registries of all three classes
#[derive(Default)]
pub struct Registry {
    pub(crate) action: Channel<ActionPayload>,
    pub(crate) player: Channel<PlayerPayload>,
    pub(crate) punish: Channel<PunishPayload>,
    closed: bool,
}

impl Registry {
    fn len(&self, class: EventClass) -> usize {
        match class {
            EventClass::Action => self.action.consumers.len(),
            EventClass::Player => self.player.consumers.len(),
            EventClass::Punish => self.punish.consumers.len(),
        }
    }

    fn names(&self, class: EventClass) -> Vec<String> {
        match class {
            EventClass::Action => self.action.names(),
            EventClass::Player => self.player.names(),
            EventClass::Punish => self.punish.names(),
        }
    }

    /// Hand `event` to every consumer of its class, evicting full outboxes
    fn deliver<P: Payload>(&mut self, event: &Event<P>, capacity: usize) -> usize {
        let mut delivered = 0;

        P::channel(self).consumers.retain(|id, registration| {
            match registration.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_))
                    if event.is_quit() && event.is_addressed_to(&registration.name) =>
                {
                    registration.ejection.quit.store(true, Ordering::Release);
                    info!(
                        target: HUB_TARGET,
                        class = %P::CLASS,
                        consumer = %registration.name,
                        consumer_id = %id,
                        "QUIT with full outbox, disconnecting"
                    );
                    delivered += 1;
                    false
                }
                Err(TrySendError::Full(_)) => {
                    registration.ejection.evicted.store(true, Ordering::Release);
                    warn!(
                        target: HUB_TARGET,
                        class = %P::CLASS,
                        consumer = %registration.name,
                        consumer_id = %id,
                        capacity,
                        "[!] EVICTED: outbox full"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(
                        target: HUB_TARGET,
                        class = %P::CLASS,
                        consumer = %registration.name,
                        consumer_id = %id,
                        "Dropping consumer with closed outbox"
                    );
                    false
                }
            }
        });

        delivered
    }
}

/// Event distribution hub
pub struct Hub {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl Hub {
    /// Create a hub whose consumers buffer up to `outbox_capacity` events
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
            capacity: outbox_capacity.max(1),
        }
    }

    pub fn outbox_capacity(&self) -> usize {
        self.capacity
    }

    /// Register a consumer on the class of `P`
    ///
    /// The registration lives as long as the returned subscription. On a
    /// closed hub the subscription ends immediately.
    pub fn subscribe<P: Payload>(self: &Arc<Self>, name: impl Into<String>) -> Subscription<P> {
        let name = name.into();
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.capacity);
        let ejection = Arc::new(Ejection::default());

        let mut registry = self.registry.lock();
        if registry.closed {
            debug!(
                target: HUB_TARGET,
                class = %P::CLASS,
                consumer = %name,
                "Subscription refused, hub is closed"
            );
        } else {
            P::channel(&mut registry).consumers.insert(
                id,
                Registration {
                    name: name.clone(),
                    sender,
                    ejection: Arc::clone(&ejection),
                },
            );
            info!(
                target: HUB_TARGET,
                class = %P::CLASS,
                consumer = %name,
                consumer_id = %id,
                consumers = registry.len(P::CLASS),
                "[>] CONNECT"
            );
        }
        drop(registry);

        Subscription::new(Arc::clone(self), id, name, receiver, ejection)
    }

    /// Remove a registration, returning how many consumers remain on the class
    pub(crate) fn unregister<P: Payload>(&self, id: ConsumerId) -> usize {
        let mut registry = self.registry.lock();
        P::channel(&mut registry).consumers.remove(&id);
        registry.len(P::CLASS)
    }

    /// Publish an event to every consumer of its class
    ///
    /// Returns the number of outboxes the event was placed in. Filtering by
    /// target happens on the consumer side.
    pub fn publish<P: Payload>(&self, event: Event<P>) -> usize {
        let mut registry = self.registry.lock();
        if registry.closed {
            return 0;
        }
        registry.deliver(&event, self.capacity)
    }

    /// Broadcast a chat message
    pub fn announce(&self, target: impl Into<String>, message: impl Into<String>) -> usize {
        self.publish(Event::new(
            target,
            ActionPayload::Announce {
                message: message.into(),
            },
        ))
    }

    /// Ask servers to run a console command
    pub fn dispatch(&self, target: impl Into<String>, cmd: impl Into<String>) -> usize {
        self.publish(Event::new(target, ActionPayload::Dispatch { cmd: cmd.into() }))
    }

    pub fn publish_player_groups(&self, target: impl Into<String>, entry: PlayerEntry) -> usize {
        self.publish(Event::new(target, PlayerPayload::Groups(entry)))
    }

    pub fn publish_punish(
        &self,
        target: impl Into<String>,
        entry: PunishmentRecord,
        require_remote_execution: bool,
    ) -> usize {
        self.publish(Event::new(
            target,
            PunishPayload::Punish {
                entry,
                require_remote_execution,
            },
        ))
    }

    /// Broadcast a player report to every server
    pub fn publish_report(&self, report: ReportEntry) -> usize {
        self.publish(Event::global(PunishPayload::Report(report)))
    }

    /// Disconnect every consumer addressed by `name` from all three classes
    pub fn quit_all(&self, name: &str) -> usize {
        let mut registry = self.registry.lock();
        if registry.closed {
            return 0;
        }

        let delivered = registry.deliver(&Event::<ActionPayload>::quit(name), self.capacity)
            + registry.deliver(&Event::<PlayerPayload>::quit(name), self.capacity)
            + registry.deliver(&Event::<PunishPayload>::quit(name), self.capacity);

        info!(
            target: HUB_TARGET,
            consumer = %name,
            global = name == GLOBAL_TARGET,
            delivered,
            "QUIT requested"
        );
        delivered
    }

    pub fn consumer_count(&self, class: EventClass) -> usize {
        self.registry.lock().len(class)
    }

    /// Names of the consumers of a class, sorted
    pub fn consumer_names(&self, class: EventClass) -> Vec<String> {
        self.registry.lock().names(class)
    }

    /// Stop the hub
    ///
    /// Every outbox is closed so subscriptions end once drained. Later
    /// subscriptions end immediately and publishing becomes a no-op.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;

        let dropped: usize = EventClass::ALL.iter().map(|class| registry.len(*class)).sum();
        registry.action.consumers.clear();
        registry.player.consumers.clear();
        registry.punish.consumers.clear();

        info!(target: HUB_TARGET, consumers = dropped, "Hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }
}
