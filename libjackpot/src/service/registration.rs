//! "Is registered" flag, stored as `"true"` / `"false"`

use std::sync::Arc;

use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::storage::{self, keys, KeyValueStore, Loaded};

pub struct RegistrationService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    cached: Mutex<Option<bool>>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            cached: Mutex::new(None),
        }
    }

    /// Any stored value other than `"true"` reads as unregistered
    pub async fn is_registered(&self) -> bool {
        let mut cached = self.cached.lock().await;
        if let Some(flag) = *cached {
            return flag;
        }

        let flag = match storage::load(self.store.as_ref(), keys::USER_REGISTERED).await {
            Loaded::Present(raw) => raw == "true",
            Loaded::Absent => {
                storage::persist(self.store.as_ref(), keys::USER_REGISTERED, "false").await;
                false
            }
            Loaded::Faulted => return false,
        };

        *cached = Some(flag);
        flag
    }

    pub async fn set_registered(&self, registered: bool) {
        {
            let mut cached = self.cached.lock().await;
            let raw = if registered { "true" } else { "false" };
            storage::persist(self.store.as_ref(), keys::USER_REGISTERED, raw).await;
            *cached = Some(registered);
        }

        self.bus.publish(StateEvent::RegistrationChanged(registered));
    }

    pub async fn reset(&self) {
        {
            let mut cached = self.cached.lock().await;
            storage::erase(self.store.as_ref(), keys::USER_REGISTERED).await;
            *cached = Some(false);
        }

        self.bus.publish(StateEvent::RegistrationChanged(false));
    }
}
