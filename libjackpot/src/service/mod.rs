//! Service layer for Jackpot
//!
//! Each slice owns its storage keys, caches its last value and publishes on
//! the shared [`EventBus`] after every mutation. Screens observe state by
//! subscribing to the bus rather than holding references to each other.
//!
//! # Architecture
//!
//! `StateStore` is the facade the app root constructs once and passes down.
//! It owns the bus, the storage backend and every slice:
//!
//! - `UserService`: balance and display name
//! - `MovementsService`: the ledger of bets, deposits and contributions
//! - `StatisticsService`: spending per category, derived from the ledger
//! - `AvatarService`: selected profile image
//! - `SecurityService`: password, verify-then-set
//! - `NotificationsService`: notification opt-ins
//! - `RegistrationService`: whether onboarding finished
//!
//! # Example
//!
//! ```no_run
//! use libjackpot::service::StateStore;
//! use libjackpot::service::events::{EventKind, StateEvent};
//! use libjackpot::{MovementKind, NewMovement};
//!
//! # async fn example() -> libjackpot::Result<()> {
//! let state = StateStore::in_memory();
//! state.init().await;
//!
//! let id = state.subscribe(EventKind::StatisticsChanged, |event| {
//!     if let StateEvent::StatisticsChanged(stats) = event {
//!         println!("spent {} this month", stats.total_amount);
//!     }
//!     Ok(())
//! });
//!
//! state
//!     .movements()
//!     .append(NewMovement::new(MovementKind::Lottery, "Lotería", "12 Oct", "$10.000"))
//!     .await?;
//!
//! state.unsubscribe(EventKind::StatisticsChanged, id);
//! # Ok(())
//! # }
//! ```

pub mod avatar;
pub mod events;
pub mod movements;
pub mod notifications;
pub mod registration;
pub mod security;
pub mod statistics;
pub mod user;

use std::sync::Arc;

use self::avatar::AvatarService;
use self::events::{EventBus, EventKind, EventReceiver, HandlerResult, StateEvent, SubscriptionId};
use self::movements::MovementsService;
use self::notifications::NotificationsService;
use self::registration::RegistrationService;
use self::security::SecurityService;
use self::statistics::StatisticsService;
use self::user::UserService;
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};
use crate::{Config, Result};

/// Owner of every state slice
///
/// Construct one per app process (or per test) and share it by reference;
/// there is no global instance.
pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    user: UserService,
    movements: Arc<MovementsService>,
    statistics: StatisticsService,
    avatar: AvatarService,
    security: SecurityService,
    notifications: NotificationsService,
    registration: RegistrationService,
}

impl StateStore {
    /// Open the SQLite-backed store described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::new(&config.storage.path).await?;
        Ok(Self::with_store(
            Arc::new(store),
            config.events.channel_capacity,
        ))
    }

    /// Non-persistent store, for previews and tests
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), 100)
    }

    /// Build every slice over a given backend
    pub fn with_store(store: Arc<dyn KeyValueStore>, channel_capacity: usize) -> Self {
        let bus = Arc::new(EventBus::new(channel_capacity));

        let movements = Arc::new(MovementsService::new(Arc::clone(&store), Arc::clone(&bus)));
        let statistics = StatisticsService::new(Arc::clone(&movements), Arc::clone(&bus));

        tracing::debug!(backend = store.backend_name(), "State store created");

        Self {
            user: UserService::new(Arc::clone(&store), Arc::clone(&bus)),
            avatar: AvatarService::new(Arc::clone(&store), Arc::clone(&bus)),
            security: SecurityService::new(Arc::clone(&store), Arc::clone(&bus)),
            notifications: NotificationsService::new(Arc::clone(&store), Arc::clone(&bus)),
            registration: RegistrationService::new(Arc::clone(&store), Arc::clone(&bus)),
            movements,
            statistics,
            store,
            bus,
        }
    }

    /// Load every slice once so defaults are seeded and the first
    /// statistics snapshot is published
    pub async fn init(&self) {
        self.user.read().await;
        self.movements.get_all().await;
        self.avatar.read().await;
        self.notifications.read().await;
        self.registration.is_registered().await;
        if self.security.has_default_password().await {
            tracing::debug!("Default password still in use");
        }
        self.statistics.get_statistics().await;

        tracing::info!(backend = self.store.backend_name(), "State store initialized");
    }

    /// Logout: forget the user's profile, ledger, avatar and preferences
    ///
    /// Each reset republishes its default snapshot. The credential and the
    /// registration flag survive a logout.
    pub async fn reset(&self) {
        self.user.reset().await;
        self.movements.clear().await;
        self.avatar.reset().await;
        self.notifications.reset().await;

        tracing::info!("State store reset");
    }

    pub fn user(&self) -> &UserService {
        &self.user
    }

    pub fn movements(&self) -> &MovementsService {
        &self.movements
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    pub fn avatar(&self) -> &AvatarService {
        &self.avatar
    }

    pub fn security(&self) -> &SecurityService {
        &self.security
    }

    pub fn notifications(&self) -> &NotificationsService {
        &self.notifications
    }

    pub fn registration(&self) -> &RegistrationService {
        &self.registration
    }

    /// The shared bus, e.g. for [`EventBus::subscribe_scoped`]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StateEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    /// Receive every state event on an async channel
    pub fn watch(&self) -> EventReceiver {
        self.bus.watch()
    }
}
