//! Jackpot - client state for a lottery and payments app
//!
//! This library provides the reactive state layer shared by the app's
//! screens: persisted domain slices, a typed event bus that announces every
//! change, and spending statistics derived from the movements ledger.

pub mod amount;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use amount::{format_amount, parse_amount};
pub use config::Config;
pub use error::{JackpotError, Result};
pub use service::events::{EventBus, EventKind, StateEvent, Subscription, SubscriptionId};
pub use service::StateStore;
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::{
    AvatarInfo, CategoryData, Movement, MovementKind, NewMovement, NotificationPatch,
    NotificationPreferences, PasswordChangeOutcome, Statistics, UserData, UserDataPatch,
};
