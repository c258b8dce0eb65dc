//! Outbound transport
//!
//! The RPC layer a consumer is connected through is modelled as an
//! [`EventSink`]. [`forward`] pumps a subscription into a sink until the
//! subscription ends or the sink fails.

use crate::stream::{Event, HubError, Payload, Subscription};
use crate::{Error, HUB_TARGET};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Destination of the events of one consumer
#[async_trait]
pub trait EventSink<P: Payload>: Send {
    /// Send one event to the remote consumer
    async fn send(&mut self, event: Event<P>) -> Result<(), Error>;
}

#[async_trait]
impl<P: Payload> EventSink<P> for mpsc::Sender<Event<P>> {
    async fn send(&mut self, event: Event<P>) -> Result<(), Error> {
        mpsc::Sender::send(self, event)
            .await
            .map_err(|_| "receiver dropped".into())
    }
}

/// Drive `subscription` into `sink`, returning the number of events sent
///
/// Ends with `Ok` on QUIT or hub shutdown. A sink failure ends the
/// subscription and is returned as [`HubError::Transport`].
pub async fn forward<P, S>(
    mut subscription: Subscription<P>,
    sink: &mut S,
) -> Result<usize, HubError>
where
    P: Payload,
    S: EventSink<P> + ?Sized,
{
    let mut sent = 0;

    while let Some(event) = subscription.next_event().await {
        let event = event?;
        let kind = event.kind();
        let target = event.target.clone();

        if let Err(e) = sink.send(event).await {
            error!(
                target: HUB_TARGET,
                class = %P::CLASS,
                consumer = %subscription.name(),
                error = %e,
                "Failed to send event"
            );
            return Err(HubError::Transport {
                consumer: subscription.name().to_string(),
                reason: e.to_string(),
            });
        }

        info!(
            target: HUB_TARGET,
            class = %P::CLASS,
            kind,
            consumer = %subscription.name(),
            target_name = %target,
            "[<->]"
        );
        sent += 1;
    }

    Ok(sent)
}
