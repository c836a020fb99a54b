//! Notification preferences slice
//!
//! Toggles changed while the stored record cannot be read are held and
//! applied on top of it once a read succeeds.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::storage::{self, keys, KeyValueStore, Loaded};
use crate::types::{NotificationPatch, NotificationPreferences};

#[derive(Default)]
struct PreferencesState {
    cached: Option<NotificationPreferences>,
    pending: Option<NotificationPatch>,
}

pub struct NotificationsService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    state: Mutex<PreferencesState>,
}

impl NotificationsService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            state: Mutex::new(PreferencesState::default()),
        }
    }

    pub async fn read(&self) -> NotificationPreferences {
        let mut state = self.state.lock().await;
        match self.load(&mut state).await {
            Some(preferences) => preferences,
            None => fallback(&state),
        }
    }

    /// Merge toggles, persist and publish `notificationsChanged`
    pub async fn write(&self, patch: NotificationPatch) -> NotificationPreferences {
        let preferences = {
            let mut state = self.state.lock().await;
            match self.load(&mut state).await {
                Some(current) => {
                    let preferences = current.merged(patch);
                    storage::persist_json(self.store.as_ref(), keys::NOTIFICATIONS, &preferences)
                        .await;
                    state.cached = Some(preferences);
                    preferences
                }
                None => {
                    tracing::warn!("Notification preferences unreadable, holding change");
                    state.pending = Some(match state.pending {
                        Some(held) => held.then(patch),
                        None => patch,
                    });
                    fallback(&state)
                }
            }
        };

        self.bus
            .publish(StateEvent::NotificationsChanged(preferences));
        preferences
    }

    pub async fn reset(&self) -> NotificationPreferences {
        let preferences = NotificationPreferences::default();
        {
            let mut state = self.state.lock().await;
            storage::erase(self.store.as_ref(), keys::NOTIFICATIONS).await;
            state.cached = Some(preferences);
            state.pending = None;
        }

        self.bus
            .publish(StateEvent::NotificationsChanged(preferences));
        preferences
    }

    /// Cached or stored preferences; `None` while storage cannot be read
    async fn load(&self, state: &mut PreferencesState) -> Option<NotificationPreferences> {
        if let Some(preferences) = state.cached {
            return Some(preferences);
        }

        let stored = match storage::load(self.store.as_ref(), keys::NOTIFICATIONS).await {
            Loaded::Present(raw) => {
                storage::decode::<NotificationPreferences>(keys::NOTIFICATIONS, &raw)
            }
            Loaded::Absent => None,
            Loaded::Faulted => return None,
        };

        let (mut preferences, mut dirty) = match stored {
            Some(preferences) => (preferences, false),
            None => (NotificationPreferences::default(), true),
        };
        if let Some(held) = state.pending.take() {
            preferences = preferences.merged(held);
            dirty = true;
        }
        if dirty {
            storage::persist_json(self.store.as_ref(), keys::NOTIFICATIONS, &preferences).await;
        }

        state.cached = Some(preferences);
        Some(preferences)
    }
}

fn fallback(state: &PreferencesState) -> NotificationPreferences {
    let defaults = NotificationPreferences::default();
    match state.pending {
        Some(held) => defaults.merged(held),
        None => defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_write_merges_toggles() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationsService::new(store.clone(), Arc::new(EventBus::new(10)));

        let preferences = service
            .write(NotificationPatch {
                sms: Some(true),
                push: Some(false),
                ..Default::default()
            })
            .await;

        assert!(preferences.sms);
        assert!(!preferences.push);
        assert_eq!(preferences.email, NotificationPreferences::default().email);

        let raw = store.get(keys::NOTIFICATIONS).await.unwrap().unwrap();
        let stored: NotificationPreferences = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, preferences);
    }

    #[tokio::test]
    async fn test_malformed_json_reads_as_default() {
        let store = Arc::new(MemoryStore::with_entries([(keys::NOTIFICATIONS, "[1,2")]));
        let service = NotificationsService::new(store, Arc::new(EventBus::new(10)));

        assert_eq!(service.read().await, NotificationPreferences::default());
    }

    #[tokio::test]
    async fn test_reset_publishes_default() {
        let bus = Arc::new(EventBus::new(10));
        let service = NotificationsService::new(Arc::new(MemoryStore::new()), Arc::clone(&bus));
        service
            .write(NotificationPatch {
                promotions: Some(true),
                ..Default::default()
            })
            .await;
        let mut receiver = bus.watch();

        service.reset().await;

        match receiver.recv().await.unwrap() {
            StateEvent::NotificationsChanged(preferences) => {
                assert_eq!(preferences, NotificationPreferences::default());
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(!service.read().await.promotions);
    }
}
