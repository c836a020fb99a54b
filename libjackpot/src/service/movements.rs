//! Movements ledger
//!
//! The ledger is persisted as one JSON array, newest entry first. A missing
//! or malformed snapshot is replaced by a fixed sample set. While the
//! snapshot cannot be read, appends are held in memory and merged onto the
//! stored ledger once a read succeeds.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use super::events::{EventBus, StateEvent};
use crate::error::{JackpotError, Result};
use crate::storage::{self, keys, KeyValueStore, Loaded};
use crate::types::{Movement, MovementKind, NewMovement};

/// Shared, immutable ledger snapshot
pub type Ledger = Arc<Vec<Movement>>;

#[derive(Default)]
struct LedgerState {
    movements: Option<Ledger>,
    /// Appends not yet persisted because the ledger was unreadable, newest first
    pending: Vec<Movement>,
    /// Last id handed out, in epoch milliseconds
    last_id: i64,
}

impl LedgerState {
    /// What readers see while storage is unreadable
    fn fallback(&self) -> Ledger {
        let mut movements = self.pending.clone();
        movements.extend(seed_movements());
        Arc::new(movements)
    }
}

/// Movements ledger service
pub struct MovementsService {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<EventBus>,
    state: Mutex<LedgerState>,
}

impl MovementsService {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// All movements, newest first
    ///
    /// Seeds the sample ledger the first time nothing is stored.
    pub async fn get_all(&self) -> Ledger {
        let mut state = self.state.lock().await;
        match self.load(&mut state).await {
            Some(ledger) => ledger,
            None => state.fallback(),
        }
    }

    /// Look up a single movement by id
    pub async fn get(&self, id: &str) -> Option<Movement> {
        self.get_all().await.iter().find(|m| m.id == id).cloned()
    }

    /// Prepend a movement, persist the ledger and publish `movementsChanged`
    ///
    /// If the stored ledger cannot be read the movement is held in memory
    /// and persisted together with the stored entries on the next
    /// successful read.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the movement kind is not one of the four
    /// known kinds.
    pub async fn append(&self, new: NewMovement) -> Result<Movement> {
        if !new.kind.is_known() {
            return Err(JackpotError::InvalidInput(format!(
                "Unknown movement type: {}",
                new.kind
            )));
        }

        let (movement, ledger) = {
            let mut state = self.state.lock().await;
            let loaded = self.load(&mut state).await;
            let current = match &loaded {
                Some(ledger) => Arc::clone(ledger),
                None => state.fallback(),
            };

            let id = next_id(&mut state.last_id, &current);
            let movement = new.into_movement(id);

            let mut movements = Vec::with_capacity(current.len() + 1);
            movements.push(movement.clone());
            movements.extend(current.iter().cloned());
            let ledger: Ledger = Arc::new(movements);

            if loaded.is_some() {
                self.persist(&ledger).await;
                state.movements = Some(Arc::clone(&ledger));
            } else {
                tracing::warn!(id = %movement.id, "Ledger unreadable, holding movement");
                state.pending.insert(0, movement.clone());
            }
            (movement, ledger)
        };

        tracing::debug!(id = %movement.id, kind = %movement.kind, "Movement appended");
        self.bus.publish(StateEvent::MovementsChanged(ledger));
        Ok(movement)
    }

    /// Remove the persisted ledger and publish an empty one
    ///
    /// Held movements are dropped as well.
    pub async fn clear(&self) {
        let ledger: Ledger = Arc::new(Vec::new());
        {
            let mut state = self.state.lock().await;
            storage::erase(self.store.as_ref(), keys::MOVEMENTS).await;
            state.movements = Some(Arc::clone(&ledger));
            state.pending.clear();
        }

        tracing::debug!("Ledger cleared");
        self.bus.publish(StateEvent::MovementsChanged(ledger));
    }

    /// Cached or stored ledger; `None` while storage cannot be read
    async fn load(&self, state: &mut LedgerState) -> Option<Ledger> {
        if let Some(ledger) = state.movements.as_ref() {
            return Some(Arc::clone(ledger));
        }

        let stored = match storage::load(self.store.as_ref(), keys::MOVEMENTS).await {
            Loaded::Present(raw) => storage::decode::<Vec<Movement>>(keys::MOVEMENTS, &raw),
            Loaded::Absent => None,
            Loaded::Faulted => return None,
        };

        let (mut movements, mut dirty) = match stored {
            Some(movements) => (movements, false),
            None => {
                tracing::debug!("Seeding sample ledger");
                (seed_movements(), true)
            }
        };

        if !state.pending.is_empty() {
            tracing::debug!(count = state.pending.len(), "Merging held movements");
            let mut merged = std::mem::take(&mut state.pending);
            merged.append(&mut movements);
            movements = merged;
            dirty = true;
        }

        if dirty {
            self.persist(&movements).await;
        }

        let ledger: Ledger = Arc::new(movements);
        state.movements = Some(Arc::clone(&ledger));
        Some(ledger)
    }

    async fn persist(&self, ledger: &[Movement]) {
        storage::persist_json(self.store.as_ref(), keys::MOVEMENTS, ledger).await;
    }
}

/// Time-based id, strictly increasing within the session and never equal
/// to an id already in the ledger
///
/// Not unique across devices or sessions; the ledger is local-only.
fn next_id(last_id: &mut i64, ledger: &[Movement]) -> String {
    let mut candidate = Utc::now().timestamp_millis().max(*last_id + 1);
    while ledger.iter().any(|m| m.id == candidate.to_string()) {
        candidate += 1;
    }
    *last_id = candidate;
    candidate.to_string()
}

/// Sample ledger shown to a fresh install, newest first
pub fn seed_movements() -> Vec<Movement> {
    let entry = |id: &str, kind: MovementKind, title: &str, date: &str, amount: &str, logo: &str| Movement {
        id: id.to_string(),
        kind,
        title: title.to_string(),
        date: date.to_string(),
        amount: amount.to_string(),
        group_id: None,
        logo_source: Some(logo.to_string()),
    };

    let mut group_bet = entry(
        "seed-4",
        MovementKind::Group,
        "Grupo Oficina",
        "08 Oct 2024",
        "$20.000",
        "group-default",
    );
    group_bet.group_id = Some("grp-oficina".to_string());

    vec![
        entry(
            "seed-5",
            MovementKind::Lottery,
            "Lotería de Bogotá",
            "10 Oct 2024",
            "$15.000",
            "lottery-bogota",
        ),
        entry(
            "seed-3",
            MovementKind::Chance,
            "Chance Dorado",
            "06 Oct 2024",
            "$5.000",
            "chance-dorado",
        ),
        group_bet,
        entry(
            "seed-2",
            MovementKind::International,
            "Powerball",
            "03 Oct 2024",
            "$12.000",
            "powerball",
        ),
        entry(
            "seed-1",
            MovementKind::Lottery,
            "Lotería de Medellín",
            "01 Oct 2024",
            "$10.000",
            "lottery-medellin",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;

    fn setup() -> (MovementsService, Arc<MemoryStore>, Arc<EventBus>) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new(10));
        let service = MovementsService::new(store.clone(), Arc::clone(&bus));
        (service, store, bus)
    }

    fn bet(amount: &str) -> NewMovement {
        NewMovement::new(MovementKind::Chance, "Chance", "11 Oct 2024", amount)
    }

    #[tokio::test]
    async fn test_first_read_seeds_once() {
        let (service, store, _bus) = setup();

        let first = service.get_all().await;
        assert_eq!(*first, seed_movements());
        assert!(store.get(keys::MOVEMENTS).await.unwrap().is_some());

        service.append(bet("$1")).await.unwrap();
        let again = service.get_all().await;
        assert_eq!(again.len(), seed_movements().len() + 1);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::with_entries([(keys::MOVEMENTS, "{not json")]));
        let service = MovementsService::new(store.clone(), Arc::new(EventBus::new(10)));

        assert_eq!(*service.get_all().await, seed_movements());
        let raw = store.get(keys::MOVEMENTS).await.unwrap().unwrap();
        assert!(serde_json::from_str::<Vec<Movement>>(&raw).is_ok());
    }

    #[tokio::test]
    async fn test_existing_snapshot_is_loaded() {
        let stored = vec![bet("$3").into_movement("abc".to_string())];
        let raw = serde_json::to_string(&stored).unwrap();
        let store = Arc::new(MemoryStore::with_entries([(keys::MOVEMENTS, raw)]));
        let service = MovementsService::new(store, Arc::new(EventBus::new(10)));

        assert_eq!(*service.get_all().await, stored);
        assert_eq!(service.get("abc").await.map(|m| m.amount), Some("$3".to_string()));
        assert_eq!(service.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_append_is_newest_first_with_unique_ids() {
        let (service, _store, _bus) = setup();
        service.clear().await;

        let mut appended = Vec::new();
        for i in 0..20 {
            appended.push(service.append(bet(&format!("${}", i))).await.unwrap());
        }

        let ledger = service.get_all().await;
        let ids: Vec<&str> = ledger.iter().map(|m| m.id.as_str()).collect();
        let expected: Vec<&str> = appended.iter().rev().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, expected);

        let unique: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn test_append_publishes_full_ledger() {
        let (service, _store, bus) = setup();
        let mut receiver = bus.watch();

        let movement = service.append(bet("$2.000")).await.unwrap();

        match receiver.recv().await.unwrap() {
            StateEvent::MovementsChanged(ledger) => {
                assert_eq!(ledger[0], movement);
                assert_eq!(ledger.len(), seed_movements().len() + 1);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_append_rejects_unknown_kind() {
        let (service, _store, bus) = setup();
        let mut receiver = bus.watch();
        let new = NewMovement::new(MovementKind::Other("raffle".to_string()), "Rifa", "d", "$1");

        let result = service.append(new).await;
        assert!(matches!(result, Err(JackpotError::InvalidInput(_))));
        assert!(receiver.try_recv().is_err());
        assert_eq!(*service.get_all().await, seed_movements());
    }

    #[tokio::test]
    async fn test_clear_removes_key_and_publishes_empty() {
        let (service, store, bus) = setup();
        service.append(bet("$1")).await.unwrap();
        let mut receiver = bus.watch();

        service.clear().await;

        assert_eq!(store.get(keys::MOVEMENTS).await.unwrap(), None);
        assert!(service.get_all().await.is_empty());
        match receiver.recv().await.unwrap() {
            StateEvent::MovementsChanged(ledger) => assert!(ledger.is_empty()),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_next_id_skips_existing_ids() {
        let now = Utc::now().timestamp_millis();
        let taken: Vec<Movement> = (0..3)
            .map(|offset| bet("$1").into_movement((now + 1_000 + offset).to_string()))
            .collect();

        let mut last = now + 999;
        let id = next_id(&mut last, &taken);
        assert_eq!(id, (now + 1_003).to_string());
        assert_eq!(last, now + 1_003);
    }

    #[test]
    fn test_seed_ids_are_unique() {
        let seed = seed_movements();
        let unique: HashSet<&str> = seed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(unique.len(), seed.len());
    }
}
