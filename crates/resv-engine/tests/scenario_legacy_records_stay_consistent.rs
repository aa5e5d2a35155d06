//! Records written by older clients: a stale `remainingAmount` is re-derived
//! on every rewrite, and a record with no readable date stays visible to the
//! live view and the ledger audit instead of disappearing.

use std::sync::Arc;

use chrono::NaiveDate;
use resv_engine::{LedgerFinding, ReservationDraft, ReservationService};
use resv_interval::TimeWindow;
use resv_schemas::{LedgerEntry, Reservation, ReservationStatus, LEDGER_ENTRIES, RESERVATIONS};
use resv_store::{DocumentStore, MemoryStore, WriteMode};
use serde_json::{json, Value};

async fn insert(store: &MemoryStore, collection: &str, id: &str, doc: Value) {
    store
        .put(collection, id, doc.as_object().unwrap().clone(), WriteMode::Insert)
        .await
        .unwrap();
}

async fn stored_reservation(store: &MemoryStore, id: &str) -> Reservation {
    let doc = store.get(RESERVATIONS, id).await.unwrap().unwrap();
    Reservation::from_fields(id, &doc.fields).unwrap()
}

async fn stored_entry(store: &MemoryStore, id: &str) -> LedgerEntry {
    let doc = store.get(LEDGER_ENTRIES, id).await.unwrap().unwrap();
    LedgerEntry::from_fields(id, &doc.fields).unwrap()
}

async fn seed_stale_booking(store: &MemoryStore) {
    // remainingAmount disagrees with totalPrice - advanceAmount.
    insert(
        store,
        RESERVATIONS,
        "b-old",
        json!({
            "eventDate": "2025-12-10",
            "startTime": "10:00 AM",
            "endTime": "01:00 PM",
            "status": "Confirmed",
            "totalPrice": 5000,
            "advanceAmount": 2000,
            "remainingAmount": 2500
        }),
    )
    .await;
    insert(
        store,
        LEDGER_ENTRIES,
        "p-old",
        json!({
            "bookingId": "b-old",
            "totalPrice": 5000,
            "advanceAmount": 2000,
            "remainingAmount": 2500
        }),
    )
    .await;
}

#[tokio::test]
async fn scenario_reschedule_rederives_stale_pending() {
    let store = Arc::new(MemoryStore::new());
    let svc = ReservationService::new(store.clone());
    seed_stale_booking(&store).await;

    let moved = svc
        .revise_booking(
            "b-old",
            NaiveDate::from_ymd_opt(2025, 12, 11).unwrap(),
            TimeWindow::new(600, 780).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(moved.pending_amount, 3000);

    let r = stored_reservation(&store, "b-old").await;
    let e = stored_entry(&store, "p-old").await;
    assert_eq!((r.total_amount, r.received_amount, r.pending_amount), (5000, 2000, 3000));
    assert_eq!(e.pending_amount, r.pending_amount);
    assert!(svc.audit().await.unwrap().is_clean());
}

#[tokio::test]
async fn scenario_status_change_rederives_stale_pending() {
    let store = Arc::new(MemoryStore::new());
    let svc = ReservationService::new(store.clone());
    seed_stale_booking(&store).await;

    svc.update_status("b-old", ReservationStatus::Cancelled)
        .await
        .unwrap();

    let r = stored_reservation(&store, "b-old").await;
    assert_eq!(r.status, ReservationStatus::Cancelled);
    assert_eq!(r.pending_amount, 3000);
}

#[tokio::test]
async fn scenario_undated_record_stays_visible() {
    let store = Arc::new(MemoryStore::new());
    let svc = ReservationService::new(store.clone());
    svc.create_reservation(
        &ReservationDraft::booking(
            NaiveDate::from_ymd_opt(2025, 12, 10).unwrap(),
            TimeWindow::new(600, 780).unwrap(),
        )
        .with_total(1000),
    )
    .await
    .unwrap();

    insert(
        &store,
        RESERVATIONS,
        "undated",
        json!({"eventDate": "", "totalPrice": 1200, "advanceAmount": 200, "personName": "Ravi"}),
    )
    .await;
    insert(
        &store,
        LEDGER_ENTRIES,
        "p-undated",
        json!({"bookingId": "undated", "totalPrice": 1200, "advanceAmount": 200}),
    )
    .await;

    let snapshot = svc.live_view().snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[1].id, "undated");
    assert_eq!(snapshot[1].resource_date, None);

    // Its ledger entry is not an orphan, and the pair can be paid and repaired.
    let report = svc.audit().await.unwrap();
    assert!(
        !report
            .findings
            .iter()
            .any(|f| matches!(f, LedgerFinding::OrphanedEntry { .. })),
        "{report:?}"
    );
    let receipt = svc.receive_pending_payment("undated", 1000).await.unwrap();
    assert_eq!(receipt.pending_amount, 0);
    assert_eq!(stored_entry(&store, "p-undated").await.pending_amount, 0);
    svc.repair_ledger("undated").await.unwrap();
    assert!(svc.audit().await.unwrap().is_clean());

    // Undated records never hold a slot on any date.
    let on_date = svc
        .reservations_on(NaiveDate::from_ymd_opt(2025, 12, 10).unwrap())
        .await
        .unwrap();
    assert_eq!(on_date.len(), 1);
}
