//! Avatar selection slice

use std::sync::Arc;

use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::error::{JackpotError, Result};
use crate::storage::{self, keys, KeyValueStore, Loaded};
use crate::types::AvatarInfo;

/// (id, image reference, display name)
const CATALOG: [(&str, &str, &str); 6] = [
    ("1", "avatar-trebol", "Trébol"),
    ("2", "avatar-herradura", "Herradura"),
    ("3", "avatar-estrella", "Estrella"),
    ("4", "avatar-dado", "Dado"),
    ("5", "avatar-corona", "Corona"),
    ("6", "avatar-diamante", "Diamante"),
];

/// The fixed avatar catalog
pub fn catalog() -> Vec<AvatarInfo> {
    CATALOG
        .iter()
        .map(|(id, source, name)| AvatarInfo {
            id: id.to_string(),
            source: source.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Catalog entry for an id, if it exists
pub fn find_avatar(id: &str) -> Option<AvatarInfo> {
    catalog().into_iter().find(|avatar| avatar.id == id)
}

/// Avatar shown before the user picks one
pub fn default_avatar() -> AvatarInfo {
    let (id, source, name) = CATALOG[0];
    AvatarInfo {
        id: id.to_string(),
        source: source.to_string(),
        name: name.to_string(),
    }
}

/// Avatar selection service
pub struct AvatarService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    cached: Mutex<Option<AvatarInfo>>,
}

impl AvatarService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            cached: Mutex::new(None),
        }
    }

    /// Currently selected avatar
    ///
    /// A stored id that is no longer in the catalog reads as the default.
    pub async fn read(&self) -> AvatarInfo {
        let mut cached = self.cached.lock().await;
        if let Some(avatar) = cached.as_ref() {
            return avatar.clone();
        }

        let avatar = match storage::load(self.store.as_ref(), keys::AVATAR).await {
            Loaded::Present(id) => match find_avatar(&id) {
                Some(avatar) => avatar,
                None => {
                    tracing::warn!(id = %id, "Stored avatar is not in the catalog");
                    self.seed().await
                }
            },
            Loaded::Absent => self.seed().await,
            Loaded::Faulted => return default_avatar(),
        };

        *cached = Some(avatar.clone());
        avatar
    }

    /// Select an avatar from the catalog and publish `avatarChanged`
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `id` is not in the catalog.
    pub async fn select(&self, id: &str) -> Result<AvatarInfo> {
        let avatar = find_avatar(id)
            .ok_or_else(|| JackpotError::InvalidInput(format!("Unknown avatar: {}", id)))?;

        {
            let mut cached = self.cached.lock().await;
            storage::persist(self.store.as_ref(), keys::AVATAR, &avatar.id).await;
            *cached = Some(avatar.clone());
        }

        self.bus.publish(StateEvent::AvatarChanged(avatar.clone()));
        Ok(avatar)
    }

    /// Forget the selection and republish the default avatar
    pub async fn reset(&self) -> AvatarInfo {
        let avatar = default_avatar();
        {
            let mut cached = self.cached.lock().await;
            storage::erase(self.store.as_ref(), keys::AVATAR).await;
            *cached = Some(avatar.clone());
        }

        self.bus.publish(StateEvent::AvatarChanged(avatar.clone()));
        avatar
    }

    async fn seed(&self) -> AvatarInfo {
        let avatar = default_avatar();
        storage::persist(self.store.as_ref(), keys::AVATAR, &avatar.id).await;
        avatar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: HashSet<String> = catalog().into_iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[tokio::test]
    async fn test_default_selection_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let service = AvatarService::new(store.clone(), Arc::new(EventBus::new(10)));

        assert_eq!(service.read().await, default_avatar());
        assert_eq!(store.get(keys::AVATAR).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_select_persists_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new(10));
        let service = AvatarService::new(store.clone(), Arc::clone(&bus));
        let mut receiver = bus.watch();

        let avatar = service.select("4").await.unwrap();

        assert_eq!(avatar.name, "Dado");
        assert_eq!(service.read().await, avatar);
        assert_eq!(store.get(keys::AVATAR).await.unwrap().as_deref(), Some("4"));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            StateEvent::AvatarChanged(published) if published.id == "4"
        ));
    }

    #[tokio::test]
    async fn test_select_unknown_id_is_rejected() {
        let service = AvatarService::new(Arc::new(MemoryStore::new()), Arc::new(EventBus::new(10)));

        let result = service.select("99").await;
        assert!(matches!(result, Err(JackpotError::InvalidInput(_))));
        assert_eq!(service.read().await, default_avatar());
    }

    #[tokio::test]
    async fn test_stale_stored_id_reads_as_default() {
        let store = Arc::new(MemoryStore::with_entries([(keys::AVATAR, "42")]));
        let service = AvatarService::new(store.clone(), Arc::new(EventBus::new(10)));

        assert_eq!(service.read().await, default_avatar());
        assert_eq!(store.get(keys::AVATAR).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_reset() {
        let store = Arc::new(MemoryStore::new());
        let service = AvatarService::new(store.clone(), Arc::new(EventBus::new(10)));
        service.select("6").await.unwrap();

        assert_eq!(service.reset().await, default_avatar());
        assert_eq!(store.get(keys::AVATAR).await.unwrap(), None);
        assert_eq!(service.read().await, default_avatar());
    }
}
