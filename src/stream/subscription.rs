//! Consumer side of the hub
//!
//! A [`Subscription`] owns one registration. Dropping it removes the
//! registration, so a consumer task that returns, fails, panics or is
//! cancelled never leaves an entry behind.

use crate::HUB_TARGET;
use crate::stream::hub::Ejection;
use crate::stream::{ConsumerId, Event, Hub, HubError, Payload};
use futures::Stream;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Filtered event sequence of one consumer
///
/// Yields events targeted at [`GLOBAL_TARGET`](crate::stream::GLOBAL_TARGET)
/// or at a name this consumer's name is a prefix of. Ends on a matching QUIT,
/// on hub shutdown, or with [`HubError::Overflow`] after an eviction.
pub struct Subscription<P: Payload> {
    hub: Arc<Hub>,
    id: ConsumerId,
    name: String,
    receiver: mpsc::Receiver<Event<P>>,
    ejection: Arc<Ejection>,
    finished: bool,
    released: bool,
}

impl<P: Payload> Subscription<P> {
    pub(crate) fn new(
        hub: Arc<Hub>,
        id: ConsumerId,
        name: String,
        receiver: mpsc::Receiver<Event<P>>,
        ejection: Arc<Ejection>,
    ) -> Self {
        Self {
            hub,
            id,
            name,
            receiver,
            ejection,
            finished: false,
            released: false,
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sequence has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next event addressed to this consumer
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<Result<Event<P>, HubError>> {
        poll_fn(|cx| self.poll_event(cx)).await
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Event<P>, HubError>>> {
        loop {
            if self.finished {
                return Poll::Ready(None);
            }

            let Some(event) = ready!(self.receiver.poll_recv(cx)) else {
                self.finish();
                if self.ejection.quit() {
                    debug!(
                        target: HUB_TARGET,
                        class = %P::CLASS,
                        consumer = %self.name,
                        "QUIT received with full outbox"
                    );
                    return Poll::Ready(None);
                }
                if self.ejection.evicted() {
                    return Poll::Ready(Some(Err(HubError::Overflow {
                        consumer: self.name.clone(),
                    })));
                }
                return Poll::Ready(None);
            };

            if !event.is_addressed_to(&self.name) {
                debug!(
                    target: HUB_TARGET,
                    class = %P::CLASS,
                    kind = event.kind(),
                    consumer = %self.name,
                    target_name = %event.target,
                    "Skipping event for another consumer"
                );
                continue;
            }

            if event.is_quit() {
                debug!(
                    target: HUB_TARGET,
                    class = %P::CLASS,
                    consumer = %self.name,
                    target_name = %event.target,
                    "QUIT received"
                );
                self.finish();
                return Poll::Ready(None);
            }

            return Poll::Ready(Some(Ok(event)));
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.release();
    }

    /// Remove the registration, once
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.receiver.close();
        let remaining = self.hub.unregister::<P>(self.id);

        info!(
            target: HUB_TARGET,
            class = %P::CLASS,
            consumer = %self.name,
            consumer_id = %self.id,
            consumers = remaining,
            "[x] CLOSED"
        );
    }
}

impl<P: Payload> Stream for Subscription<P> {
    type Item = Result<Event<P>, HubError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_event(cx)
    }
}

impl<P: Payload> Drop for Subscription<P> {
    fn drop(&mut self) {
        self.release();
    }
}
