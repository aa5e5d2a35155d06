//! Concurrent proposals for one slot: exactly one is admitted, whether the
//! writers share a service (per-date lock) or not (partition token).

use std::sync::Arc;

use chrono::NaiveDate;
use resv_engine::{EngineConfig, ReservationDraft, ReservationError, ReservationService};
use resv_interval::TimeWindow;
use resv_store::MemoryStore;

fn draft() -> ReservationDraft {
    ReservationDraft::booking(
        NaiveDate::from_ymd_opt(2025, 12, 10).unwrap(),
        TimeWindow::new(600, 780).unwrap(),
    )
}

async fn race(services: Vec<ReservationService>) -> (usize, usize) {
    let handles: Vec<_> = services
        .into_iter()
        .map(|svc| tokio::spawn(async move { svc.create_reservation(&draft()).await }))
        .collect();

    let (mut admitted, mut conflicts) = (0, 0);
    for h in handles {
        match h.await.expect("task") {
            Ok(_) => admitted += 1,
            Err(ReservationError::SlotConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    (admitted, conflicts)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_shared_service_admits_exactly_one() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));
    let (admitted, conflicts) = race(vec![svc.clone(); 16]).await;
    assert_eq!(admitted, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_independent_writers_admit_exactly_one() {
    // Separate services share nothing but the store, like separate processes.
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        max_commit_attempts: 32,
    };
    let services = (0..8)
        .map(|_| ReservationService::with_config(store.clone(), config.clone()))
        .collect();

    let (admitted, conflicts) = race(services).await;
    assert_eq!(admitted, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(store.len(resv_schemas::RESERVATIONS), 1);
    assert_eq!(store.len(resv_schemas::LEDGER_ENTRIES), 1);
}
