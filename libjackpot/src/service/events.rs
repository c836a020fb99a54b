//! Event bus for state change notifications
//!
//! Every slice publishes a [`StateEvent`] after a successful mutation.
//! Consumers register synchronous handlers per [`EventKind`]; the bus calls
//! them in registration order with the same borrowed payload.
//!
//! # Failure isolation
//!
//! A handler that returns an error or panics is logged and skipped. The
//! remaining handlers still run and the publisher never sees the failure.
//!
//! # Re-entrancy
//!
//! Handlers are called after the registry lock is released, so a handler
//! may publish further events or (un)subscribe. The statistics view relies
//! on this to republish from inside its `movementsChanged` handler.
//!
//! # Async consumers
//!
//! Every published event is also forwarded to a `tokio::sync::broadcast`
//! channel available through [`EventBus::watch`], before any handler runs.
//! Events a handler publishes in reaction therefore reach watchers after
//! the event that caused them. If nobody is watching, the event is dropped.
//!
//! # Example
//!
//! ```
//! use libjackpot::service::events::{EventBus, EventKind, StateEvent};
//! use libjackpot::UserData;
//!
//! let bus = EventBus::new(16);
//! let id = bus.subscribe(EventKind::UserDataChanged, |event| {
//!     if let StateEvent::UserDataChanged(user) = event {
//!         println!("balance is now {}", user.balance);
//!     }
//!     Ok(())
//! });
//!
//! bus.publish(StateEvent::UserDataChanged(UserData::default()));
//! bus.unsubscribe(EventKind::UserDataChanged, id);
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{AvatarInfo, Movement, NotificationPreferences, Statistics, UserData};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<StateEvent>;

/// Result type returned by handlers
pub type HandlerResult = anyhow::Result<()>;

type Handler = Arc<dyn Fn(&StateEvent) -> HandlerResult + Send + Sync>;

/// Opaque handle identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Discriminant of [`StateEvent`], used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    UserDataChanged,
    MovementsChanged,
    StatisticsChanged,
    AvatarChanged,
    PasswordChanged,
    NotificationsChanged,
    RegistrationChanged,
}

impl EventKind {
    /// Event name as consumers know it
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::UserDataChanged => "userDataChanged",
            EventKind::MovementsChanged => "movementsChanged",
            EventKind::StatisticsChanged => "statisticsChanged",
            EventKind::AvatarChanged => "avatarChanged",
            EventKind::PasswordChanged => "passwordChanged",
            EventKind::NotificationsChanged => "notificationsChanged",
            EventKind::RegistrationChanged => "registrationChanged",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// State change notification carrying the new snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum StateEvent {
    UserDataChanged(UserData),
    /// Full ledger, newest first
    MovementsChanged(Arc<Vec<Movement>>),
    StatisticsChanged(Statistics),
    AvatarChanged(AvatarInfo),
    /// The secret itself never travels on the bus
    PasswordChanged,
    NotificationsChanged(NotificationPreferences),
    RegistrationChanged(bool),
}

impl StateEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StateEvent::UserDataChanged(_) => EventKind::UserDataChanged,
            StateEvent::MovementsChanged(_) => EventKind::MovementsChanged,
            StateEvent::StatisticsChanged(_) => EventKind::StatisticsChanged,
            StateEvent::AvatarChanged(_) => EventKind::AvatarChanged,
            StateEvent::PasswordChanged => EventKind::PasswordChanged,
            StateEvent::NotificationsChanged(_) => EventKind::NotificationsChanged,
            StateEvent::RegistrationChanged(_) => EventKind::RegistrationChanged,
        }
    }
}

/// Typed publish/subscribe bus shared by every slice
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<StateEvent>,
}

impl EventBus {
    /// Create a new event bus
    ///
    /// `capacity` bounds how many events a lagging [`watch`](Self::watch)
    /// receiver can fall behind before it starts missing them.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Register a handler for one event kind
    ///
    /// Every registration must be paired with an [`unsubscribe`](Self::unsubscribe)
    /// once the consumer stops observing, otherwise the handler keeps
    /// running for the lifetime of the bus.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StateEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        tracing::trace!(event = %kind, id = id.0, "Handler subscribed");
        id
    }

    /// Register a handler that is removed when the returned guard drops
    pub fn subscribe_scoped<F>(self: &Arc<Self>, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StateEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.subscribe(kind, handler);
        Subscription {
            bus: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Remove a handler
    ///
    /// Idempotent: unknown or already removed ids are ignored. Returns
    /// whether a handler was actually removed.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(&kind);
        }
        if removed {
            tracing::trace!(event = %kind, id = id.0, "Handler unsubscribed");
        }
        removed
    }

    /// Deliver an event to every handler registered for its kind
    pub fn publish(&self, event: StateEvent) {
        let kind = event.kind();

        // Snapshot so handlers run without the lock held
        let snapshot: Vec<(SubscriptionId, Handler)> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(&kind).cloned().unwrap_or_default()
        };

        tracing::trace!(event = %kind, handlers = snapshot.len(), "Publishing");

        if self.sender.receiver_count() > 0 {
            // Err only means the last watcher just went away
            let _ = self.sender.send(event.clone());
        }

        for (id, handler) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %kind, id = id.0, error = %e, "Event handler failed");
                }
                Err(_) => {
                    tracing::warn!(event = %kind, id = id.0, "Event handler panicked");
                }
            }
        }
    }

    /// Receive every published event on an async channel
    pub fn watch(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Number of handlers registered for a kind
    ///
    /// Useful for spotting consumers that forgot to unsubscribe.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<EventKind, usize> =
            handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("handlers", &counts)
            .field("watchers", &self.sender.receiver_count())
            .finish()
    }
}

/// RAII registration: unsubscribes exactly once when dropped
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<EventBus>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.kind, self.id);
        }
    }
}
