//! User data slice: balance and display name
//!
//! The two fields live under separate keys but are only ever read or
//! written as a pair. If either key is missing the default pair is used
//! and written back, so the fields never drift apart.
//!
//! While the keys cannot be read, writes touch only the keys they change
//! and balance adjustments are held until the next successful read.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::amount::{format_amount, parse_amount};
use crate::storage::{self, keys, KeyValueStore, Loaded};
use crate::types::{UserData, UserDataPatch};

#[derive(Default)]
struct UserState {
    cached: Option<UserData>,
    /// Balance delta accepted while storage was unreadable
    pending_delta: i64,
}

/// User data service
pub struct UserService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    state: Mutex<UserState>,
}

impl UserService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            state: Mutex::new(UserState::default()),
        }
    }

    /// Current user data, seeding defaults on first use
    pub async fn read(&self) -> UserData {
        let mut state = self.state.lock().await;
        self.load(&mut state).await.unwrap_or_default()
    }

    /// Merge a partial update, persist it and publish `userDataChanged`
    ///
    /// If the stored pair cannot be read, only the fields present in the
    /// patch are written and the untouched ones stay as stored.
    pub async fn write(&self, patch: UserDataPatch) -> UserData {
        let user = {
            let mut state = self.state.lock().await;
            match self.load(&mut state).await {
                Some(current) => {
                    let user = current.merged(patch);
                    self.persist(&user).await;
                    state.cached = Some(user.clone());
                    user
                }
                None => {
                    if let Some(balance) = patch.balance.as_deref() {
                        state.pending_delta = 0;
                        storage::persist(self.store.as_ref(), keys::USER_BALANCE, balance).await;
                    }
                    if let Some(name) = patch.name.as_deref() {
                        storage::persist(self.store.as_ref(), keys::USER_NAME, name).await;
                    }
                    UserData::default().merged(patch)
                }
            }
        };

        self.bus.publish(StateEvent::UserDataChanged(user.clone()));
        user
    }

    /// Add a signed delta to the balance
    ///
    /// The balance is parsed with [`parse_amount`] (an unreadable balance
    /// counts as zero) and never goes below zero. If storage cannot be
    /// read the delta is held and applied on the next successful read; the
    /// returned value then only reflects held deltas.
    pub async fn adjust_balance(&self, delta: i64) -> UserData {
        let user = {
            let mut state = self.state.lock().await;
            match self.load(&mut state).await {
                Some(current) => {
                    let user = UserData {
                        balance: adjusted_balance(&current.balance, delta),
                        name: current.name,
                    };
                    self.persist(&user).await;
                    state.cached = Some(user.clone());
                    user
                }
                None => {
                    state.pending_delta = state.pending_delta.saturating_add(delta);
                    tracing::warn!(
                        delta,
                        pending = state.pending_delta,
                        "Balance unreadable, holding adjustment"
                    );
                    let fallback = UserData::default();
                    UserData {
                        balance: adjusted_balance(&fallback.balance, state.pending_delta),
                        name: fallback.name,
                    }
                }
            }
        };

        self.bus.publish(StateEvent::UserDataChanged(user.clone()));
        user
    }

    /// Drop persisted user data and republish the default
    pub async fn reset(&self) -> UserData {
        let user = UserData::default();
        {
            let mut state = self.state.lock().await;
            storage::erase(self.store.as_ref(), keys::USER_BALANCE).await;
            storage::erase(self.store.as_ref(), keys::USER_NAME).await;
            state.cached = Some(user.clone());
            state.pending_delta = 0;
        }

        tracing::debug!("User data reset");
        self.bus.publish(StateEvent::UserDataChanged(user.clone()));
        user
    }

    /// Cached or stored pair; `None` while storage cannot be read
    async fn load(&self, state: &mut UserState) -> Option<UserData> {
        if let Some(user) = state.cached.as_ref() {
            return Some(user.clone());
        }

        let balance = storage::load(self.store.as_ref(), keys::USER_BALANCE).await;
        let name = storage::load(self.store.as_ref(), keys::USER_NAME).await;

        let mut user = match (balance, name) {
            (Loaded::Present(balance), Loaded::Present(name)) => UserData { balance, name },
            (Loaded::Faulted, _) | (_, Loaded::Faulted) => return None,
            _ => {
                tracing::debug!("No complete user data stored, seeding defaults");
                let user = UserData::default();
                self.persist(&user).await;
                user
            }
        };

        if state.pending_delta != 0 {
            user.balance = adjusted_balance(&user.balance, state.pending_delta);
            tracing::debug!(delta = state.pending_delta, "Applying held balance adjustment");
            state.pending_delta = 0;
            storage::persist(self.store.as_ref(), keys::USER_BALANCE, &user.balance).await;
        }

        state.cached = Some(user.clone());
        Some(user)
    }

    async fn persist(&self, user: &UserData) {
        storage::persist(self.store.as_ref(), keys::USER_BALANCE, &user.balance).await;
        storage::persist(self.store.as_ref(), keys::USER_NAME, &user.name).await;
    }
}

fn adjusted_balance(balance: &str, delta: i64) -> String {
    let balance = parse_amount(balance);
    let adjusted = if delta >= 0 {
        balance.saturating_add(delta.unsigned_abs())
    } else {
        balance.saturating_sub(delta.unsigned_abs())
    };
    format_amount(adjusted)
}
