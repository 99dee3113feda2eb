//! Event Bus for fanning out events from the sensor server.
//!
//! Subscribers register callbacks for one event kind (or for all of them) and
//! get a [`SubscriptionHandle`] back. Publishing is synchronous: every
//! callback registered when `publish` starts runs before it returns, in
//! registration order.
//!
//! The registry lock is never held while callbacks run, so a callback may
//! subscribe or unsubscribe; the change applies from the next publish. A
//! panicking callback is logged and skipped.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rehaflow_domain::SensorReading;
use rehaflow_shared::{CommandResponse, ConnectionNotice, ServerErrorFrame};

// =============================================================================
// Events
// =============================================================================

/// Names of the events published by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    ConnectionConfirmed,
    WeightData,
    CommandResponse,
    ServerError,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::ConnectionConfirmed,
        EventKind::WeightData,
        EventKind::CommandResponse,
        EventKind::ServerError,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::ConnectionConfirmed => "connectionConfirmed",
            EventKind::WeightData => "weightData",
            EventKind::CommandResponse => "commandResponse",
            EventKind::ServerError => "serverError",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event: {s}"))
    }
}

/// An event published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The socket opened
    Connected,
    /// The socket closed without `disconnect()` being called
    Disconnected { reason: Option<String> },
    /// The server greeted the client
    ConnectionConfirmed(ConnectionNotice),
    /// A telemetry sample, already translated into a domain reading
    WeightData(SensorReading),
    /// A command response, before correlation
    CommandResponse(CommandResponse),
    /// The server reported an error frame
    ServerError(ServerErrorFrame),
    /// A local transport failure
    Error { message: String },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected { .. } => EventKind::Disconnected,
            ClientEvent::ConnectionConfirmed(_) => EventKind::ConnectionConfirmed,
            ClientEvent::WeightData(_) => EventKind::WeightData,
            ClientEvent::CommandResponse(_) => EventKind::CommandResponse,
            ClientEvent::ServerError(_) => EventKind::ServerError,
            ClientEvent::Error { .. } => EventKind::Error,
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

type Callback = Arc<dyn Fn(&ClientEvent) + Send + Sync + 'static>;

/// Returned by `subscribe`; pass it to [`EventBus::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    kind: Option<EventKind>,
}

impl SubscriptionHandle {
    /// The kind this handle listens to, or `None` for a catch-all subscription.
    pub fn kind(&self) -> Option<EventKind> {
        self.kind
    }
}

struct Subscriber {
    id: u64,
    /// `None` receives every kind
    kind: Option<EventKind>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Publish/subscribe register keyed by [`EventKind`].
///
/// Cheap to clone; clones share one registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to one event kind.
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.register(Some(kind), Arc::new(callback))
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all(
        &self,
        callback: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.register(None, Arc::new(callback))
    }

    fn register(&self, kind: Option<EventKind>, callback: Callback) -> SubscriptionHandle {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.push(Subscriber { id, kind, callback });
        SubscriptionHandle { id, kind }
    }

    /// Remove a subscription.
    ///
    /// Returns false if it was already removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut registry = self.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| s.id != handle.id);
        registry.subscribers.len() != before
    }

    /// Deliver an event to its subscribers.
    pub fn publish(&self, event: ClientEvent) {
        let kind = event.kind();
        let snapshot: Vec<(u64, Callback)> = self
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| (s.id, Arc::clone(&s.callback)))
            .collect();

        for (id, callback) in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
            if let Err(payload) = outcome {
                tracing::error!(
                    event = %kind,
                    subscription_id = id,
                    panic = %panic_message(payload.as_ref()),
                    "Event subscriber panicked"
                );
            }
        }
    }

    /// Number of subscribers that would receive an event of `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .count()
    }

    /// Remove all subscribers.
    pub fn clear(&self) {
        self.lock().subscribers.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.lock().subscribers.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
