//! Spending statistics derived from the movements ledger
//!
//! The view holds no incremental state. Every `movementsChanged` event
//! rebuilds the whole snapshot from the published ledger, stores it and
//! republishes it as `statisticsChanged`. Reads recompute from the ledger
//! as well, so a snapshot built while storage was unreadable does not
//! outlive the fault.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, Local, Month};

use super::events::{EventBus, EventKind, StateEvent, SubscriptionId};
use super::movements::MovementsService;
use crate::amount::parse_amount;
use crate::types::{CategoryData, Movement, MovementKind, Statistics};

/// Display title and color per category, in display order
const CATEGORY_STYLE: [(MovementKind, &str, &str); 4] = [
    (MovementKind::Lottery, "Loterías", "#F5A623"),
    (MovementKind::Chance, "Chance", "#4A90E2"),
    (MovementKind::Group, "Grupos", "#7ED321"),
    (MovementKind::International, "Internacionales", "#BD10E0"),
];

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Statistics view service
pub struct StatisticsService {
    movements: Arc<MovementsService>,
    bus: Arc<EventBus>,
    snapshot: Arc<Mutex<Option<Statistics>>>,
    subscription: SubscriptionId,
}

impl StatisticsService {
    /// Create the view and subscribe it to `movementsChanged`
    ///
    /// The subscription is released when the service is dropped.
    pub fn new(movements: Arc<MovementsService>, bus: Arc<EventBus>) -> Self {
        let snapshot: Arc<Mutex<Option<Statistics>>> = Arc::new(Mutex::new(None));

        let handler_snapshot = Arc::clone(&snapshot);
        let handler_bus = Arc::downgrade(&bus);
        let subscription = bus.subscribe(EventKind::MovementsChanged, move |event| {
            let StateEvent::MovementsChanged(ledger) = event else {
                return Ok(());
            };

            let statistics = compute_statistics(ledger, current_month());
            store_snapshot(&handler_snapshot, &statistics);

            if let Some(bus) = handler_bus.upgrade() {
                bus.publish(StateEvent::StatisticsChanged(statistics));
            }
            Ok(())
        });

        Self {
            movements,
            bus,
            snapshot,
            subscription,
        }
    }

    /// Current statistics, recomputed from the ledger
    ///
    /// Publishes `statisticsChanged` when the result differs from the last
    /// snapshot, which includes the first call.
    pub async fn get_statistics(&self) -> Statistics {
        let ledger = self.movements.get_all().await;
        let statistics = compute_statistics(&ledger, current_month());

        if store_snapshot(&self.snapshot, &statistics) {
            tracing::debug!(total = statistics.total_amount, "Statistics computed");
            self.bus
                .publish(StateEvent::StatisticsChanged(statistics.clone()));
        }
        statistics
    }
}

impl Drop for StatisticsService {
    fn drop(&mut self) {
        self.bus
            .unsubscribe(EventKind::MovementsChanged, self.subscription);
    }
}

/// Replace the snapshot, returning whether it changed
fn store_snapshot(slot: &Mutex<Option<Statistics>>, statistics: &Statistics) -> bool {
    let mut snapshot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if snapshot.as_ref() == Some(statistics) {
        return false;
    }
    *snapshot = Some(statistics.clone());
    true
}

fn current_month() -> Month {
    // month() is always 1..=12
    Month::try_from(Local::now().month() as u8).unwrap_or(Month::January)
}

/// Display name of a calendar month
pub fn month_name(month: Month) -> &'static str {
    MONTH_NAMES[month.number_from_month() as usize - 1]
}

/// Rebuild the statistics view from a ledger
///
/// Every known kind gets exactly one bucket, even at zero. Amounts that do
/// not parse count as zero and unknown kinds are skipped, so one bad entry
/// never spoils the rest.
pub fn compute_statistics(movements: &[Movement], month: Month) -> Statistics {
    let mut categories: Vec<CategoryData> = CATEGORY_STYLE
        .iter()
        .map(|(kind, title, color)| CategoryData {
            kind: kind.clone(),
            title: title.to_string(),
            amount: 0,
            color: color.to_string(),
            percentage: None,
        })
        .collect();

    for movement in movements {
        if let Some(category) = categories.iter_mut().find(|c| c.kind == movement.kind) {
            category.amount = category.amount.saturating_add(parse_amount(&movement.amount));
        }
    }

    let total_amount = categories
        .iter()
        .fold(0u64, |total, c| total.saturating_add(c.amount));

    if total_amount > 0 {
        for category in &mut categories {
            category.percentage = Some(100.0 * category.amount as f64 / total_amount as f64);
        }
    }

    Statistics {
        categories,
        total_amount,
        current_month: month_name(month).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::NewMovement;

    fn movement(kind: MovementKind, amount: &str) -> Movement {
        NewMovement::new(kind, "t", "d", amount).into_movement(format!("{}-{}", amount, next_suffix()))
    }

    fn next_suffix() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT: AtomicU64 = AtomicU64::new(0);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    fn amounts(statistics: &Statistics) -> Vec<(String, u64)> {
        statistics
            .categories
            .iter()
            .map(|c| (c.kind.to_string(), c.amount))
            .collect()
    }

    #[test]
    fn test_empty_ledger() {
        let statistics = compute_statistics(&[], Month::March);

        assert_eq!(statistics.total_amount, 0);
        assert_eq!(statistics.categories.len(), 4);
        assert!(statistics.categories.iter().all(|c| c.amount == 0));
        assert!(statistics.categories.iter().all(|c| c.percentage.is_none()));
        assert_eq!(statistics.current_month, "Marzo");
    }

    #[test]
    fn test_fixed_display_order() {
        let statistics = compute_statistics(&[], Month::January);
        let kinds: Vec<MovementKind> = statistics.categories.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(kinds, MovementKind::CATEGORIES.to_vec());
    }

    #[test]
    fn test_single_lottery_entry() {
        let ledger = vec![movement(MovementKind::Lottery, "$10.000")];
        let statistics = compute_statistics(&ledger, Month::October);

        assert_eq!(
            amounts(&statistics),
            vec![
                ("lottery".to_string(), 10_000),
                ("chance".to_string(), 0),
                ("group".to_string(), 0),
                ("international".to_string(), 0),
            ]
        );
        assert_eq!(statistics.total_amount, 10_000);
        let lottery = statistics.category(&MovementKind::Lottery).unwrap();
        assert_eq!(lottery.percentage, Some(100.0));
        let chance = statistics.category(&MovementKind::Chance).unwrap();
        assert_eq!(chance.percentage, Some(0.0));
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let ledger = vec![
            movement(MovementKind::Lottery, "$1.000"),
            movement(MovementKind::Chance, "$1.000"),
            movement(MovementKind::Group, "$1.000"),
            movement(MovementKind::International, "$3.333"),
        ];
        let statistics = compute_statistics(&ledger, Month::June);

        let sum: f64 = statistics.categories.iter().filter_map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        let amount_sum: u64 = statistics.categories.iter().map(|c| c.amount).sum();
        assert_eq!(statistics.total_amount, amount_sum);
    }

    #[test]
    fn test_bad_amount_and_unknown_kind_are_isolated() {
        let ledger = vec![
            movement(MovementKind::Chance, "N/A"),
            movement(MovementKind::Other("raffle".to_string()), "$9.999"),
            movement(MovementKind::Chance, "$2.000"),
        ];
        let statistics = compute_statistics(&ledger, Month::May);

        assert_eq!(statistics.category(&MovementKind::Chance).unwrap().amount, 2_000);
        assert_eq!(statistics.total_amount, 2_000);
        assert_eq!(statistics.categories.len(), 4);
    }

    #[test]
    fn test_month_names() {
        assert_eq!(month_name(Month::January), "Enero");
        assert_eq!(month_name(Month::December), "Diciembre");
    }

    #[tokio::test]
    async fn test_recomputes_on_ledger_change() {
        let bus = Arc::new(EventBus::new(10));
        let movements = Arc::new(MovementsService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&bus),
        ));
        let statistics = StatisticsService::new(Arc::clone(&movements), Arc::clone(&bus));

        movements.clear().await;
        assert_eq!(statistics.get_statistics().await.total_amount, 0);

        let mut receiver = bus.watch();
        movements
            .append(NewMovement::new(MovementKind::Group, "Grupo", "d", "$4.000"))
            .await
            .unwrap();

        assert!(matches!(
            receiver.recv().await.unwrap(),
            StateEvent::MovementsChanged(_)
        ));
        match receiver.recv().await.unwrap() {
            StateEvent::StatisticsChanged(published) => {
                assert_eq!(published.category(&MovementKind::Group).unwrap().amount, 4_000);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(statistics.get_statistics().await.total_amount, 4_000);
    }

    #[tokio::test]
    async fn test_first_call_uses_seeded_ledger_and_is_stable() {
        let bus = Arc::new(EventBus::new(10));
        let movements = Arc::new(MovementsService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&bus),
        ));
        let statistics = StatisticsService::new(movements, Arc::clone(&bus));

        let first = statistics.get_statistics().await;
        let second = statistics.get_statistics().await;

        assert_eq!(first, second);
        assert_eq!(first.total_amount, 62_000);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let bus = Arc::new(EventBus::new(10));
        let movements = Arc::new(MovementsService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&bus),
        ));

        let statistics = StatisticsService::new(movements, Arc::clone(&bus));
        assert_eq!(bus.handler_count(EventKind::MovementsChanged), 1);

        drop(statistics);
        assert_eq!(bus.handler_count(EventKind::MovementsChanged), 0);
    }
}
