//! Date 2025-12-10: A occupies 10:00–13:00. B at 12:00–14:00 overlaps and is
//! rejected; C at 13:00–15:00 only touches A and is admitted.

use std::sync::Arc;

use chrono::NaiveDate;
use resv_engine::{ReservationDraft, ReservationError, ReservationService};
use resv_interval::TimeWindow;
use resv_schemas::ReservationStatus;
use resv_store::MemoryStore;

fn dec10() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 10).unwrap()
}

fn slot(start: &str, end: &str) -> TimeWindow {
    TimeWindow::from_clock(start, end).unwrap()
}

#[tokio::test]
async fn scenario_overlap_rejected_touching_admitted() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));

    let a = svc
        .create_reservation(&ReservationDraft::booking(dec10(), slot("10:00", "13:00")).with_total(5000))
        .await
        .expect("A admitted");
    assert_eq!((a.start_minutes, a.end_minutes), (Some(600), Some(780)));

    let b = svc
        .create_reservation(&ReservationDraft::booking(dec10(), slot("12:00", "14:00")))
        .await
        .expect_err("B overlaps A");
    match b {
        ReservationError::SlotConflict {
            conflicting_id,
            occupied,
            ..
        } => {
            assert_eq!(conflicting_id, a.id);
            assert_eq!(occupied, (600, 780));
        }
        other => panic!("expected SlotConflict, got {other:?}"),
    }

    svc.create_reservation(&ReservationDraft::booking(dec10(), slot("13:00", "15:00")))
        .await
        .expect("C touches A and is admitted");

    assert_eq!(svc.reservations_on(dec10()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_propose_is_read_only() {
    let store = Arc::new(MemoryStore::new());
    let svc = ReservationService::new(store.clone());

    svc.propose_reservation(dec10(), slot("10:00", "13:00"), None)
        .await
        .expect("empty date admits");
    assert!(store.is_empty(resv_schemas::RESERVATIONS));
}

#[tokio::test]
async fn scenario_other_dates_do_not_conflict() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));
    svc.create_reservation(&ReservationDraft::booking(dec10(), slot("10:00", "13:00")))
        .await
        .unwrap();

    let dec11 = NaiveDate::from_ymd_opt(2025, 12, 11).unwrap();
    svc.create_reservation(&ReservationDraft::booking(dec11, slot("10:00", "13:00")))
        .await
        .expect("same window, other date");
}

#[tokio::test]
async fn scenario_cancelled_booking_frees_its_slot_for_good() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));
    let a = svc
        .create_reservation(&ReservationDraft::booking(dec10(), slot("10:00", "13:00")))
        .await
        .unwrap();

    svc.update_status(&a.id, ReservationStatus::Cancelled)
        .await
        .unwrap();
    svc.create_reservation(&ReservationDraft::booking(dec10(), slot("11:00", "12:00")))
        .await
        .expect("cancelled booking no longer blocks");

    let reopen = svc
        .update_status(&a.id, ReservationStatus::Confirmed)
        .await
        .expect_err("cancelled is terminal");
    assert_eq!(reopen.kind(), "ValidationError");
}

#[tokio::test]
async fn scenario_revision_excludes_itself_but_not_others() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));
    let a = svc
        .create_reservation(&ReservationDraft::booking(dec10(), slot("10:00", "13:00")))
        .await
        .unwrap();
    svc.create_reservation(&ReservationDraft::booking(dec10(), slot("15:00", "17:00")))
        .await
        .unwrap();

    let moved = svc
        .revise_booking(&a.id, dec10(), slot("11:00", "14:00"))
        .await
        .expect("overlapping only its own old window");
    assert_eq!(moved.start_minutes, Some(660));
    assert_eq!(moved.start_time.as_deref(), Some("11:00 AM"));

    let err = svc
        .revise_booking(&a.id, dec10(), slot("14:00", "16:00"))
        .await
        .expect_err("overlaps the 15:00 booking");
    assert_eq!(err.kind(), "SlotConflict");

    let stored = svc.get_reservation(&a.id).await.unwrap();
    assert_eq!(stored.start_minutes, Some(660), "rejected revision wrote nothing");
}

#[tokio::test]
async fn scenario_distributions_skip_admission() {
    let svc = ReservationService::new(Arc::new(MemoryStore::new()));
    svc.create_reservation(&ReservationDraft::booking(dec10(), slot("00:00", "23:59")))
        .await
        .unwrap();
    svc.create_reservation(&ReservationDraft::distribution(
        dec10(),
        vec![resv_engine::LineItemDraft::new("Plate", 50, 2)],
    ))
    .await
    .expect("loans hold no window");
}
