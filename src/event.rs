//! Connection-lifecycle notifications.
//!
//! [`FailoverTransport`](crate::FailoverTransport) publishes a
//! [`TransportEvent`] whenever it swaps in a new connection. Observers
//! (metrics, upstream re-registration) subscribe to the bus:
//!
//! ```text
//! FailoverTransport → publish(TransportEvent) → TransportEventBus → subscribers
//! ```
//!
//! Events are advisory. The bus is bounded and publishing never waits: a
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones and observes [`broadcast::error::RecvError::Lagged`].

use crate::metrics;
use crate::transport::SharedTransport;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Default bus capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Kind of lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEventType {
    /// A replacement connection was swapped in.
    Reconnect,
}

impl TransportEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for TransportEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification carrying the connection it concerns.
///
/// For [`TransportEventType::Reconnect`] the transport is the NEW delegate.
#[derive(Clone)]
pub struct TransportEvent {
    pub event_type: TransportEventType,
    pub transport: SharedTransport,
}

impl TransportEvent {
    pub fn new(event_type: TransportEventType, transport: SharedTransport) -> Self {
        Self {
            event_type,
            transport,
        }
    }

    pub fn reconnect(transport: SharedTransport) -> Self {
        Self::new(TransportEventType::Reconnect, transport)
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvent")
            .field("event_type", &self.event_type)
            .field("address", &self.transport.remote_address())
            .field("state", &self.transport.state())
            .finish()
    }
}

/// In-process publish/subscribe channel for [`TransportEvent`]s.
pub struct TransportEventBus {
    sender: broadcast::Sender<TransportEvent>,
}

impl TransportEventBus {
    /// Create a bus holding at most `capacity` undelivered events per subscriber.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will receive it; 0 when nobody
    /// is listening (not an error).
    pub fn publish(&self, event: TransportEvent) -> usize {
        let event_type = event.event_type;
        let receivers = match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type = %event_type, receivers = count, "Published transport event");
                count
            }
            Err(_) => {
                debug!(event_type = %event_type, "No subscribers for transport event");
                0
            }
        };
        metrics::record_event_published(event_type.as_str(), receivers);
        receivers
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TransportEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for TransportEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
