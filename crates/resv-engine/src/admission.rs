//! Reservation admission control.
//!
//! A proposal is admitted when no live booking on the same date overlaps its
//! window. "Live" means: a booking (distributions hold no window), not
//! cancelled, and not the record being revised.
//!
//! The check is only half of admission. Writers also claim the date's
//! partition token (`reservationPartitions/<date>`): the token revision read
//! before the check becomes a precondition on the write, so any commit that
//! lands on the same date in between invalidates the check and forces a
//! re-run. Inside one process the per-date lock serialises writers first.

use chrono::{DateTime, NaiveDate, Utc};
use resv_interval::TimeWindow;
use resv_schemas::{field, Fields, Reservation, RESERVATION_PARTITIONS};
use resv_store::{WriteBatch, WriteMode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::service::DATE_FORMAT;
use crate::{ReservationError, ReservationService};

/// Document id of a date's partition token.
pub fn partition_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Interval a stored booking occupies.
///
/// Persisted offsets win; records without them fall back to their 12-hour
/// labels. A missing or unparseable label counts as `00:00`.
pub fn occupied_interval(r: &Reservation) -> (u32, u32) {
    if let (Some(start), Some(end)) = (r.start_minutes, r.end_minutes) {
        return (start, end);
    }
    (
        label_offset(&r.id, "startTime", r.start_time.as_deref()),
        label_offset(&r.id, "endTime", r.end_time.as_deref()),
    )
}

fn label_offset(id: &str, field: &'static str, label: Option<&str>) -> u32 {
    match label.map(resv_interval::to_offset_minutes) {
        Some(Ok(minutes)) => minutes,
        Some(Err(e)) => {
            warn!(reservation = id, field, error = %e, "unparseable stored time; using 00:00");
            0
        }
        None => {
            warn!(reservation = id, field, "stored booking has no time; using 00:00");
            0
        }
    }
}

/// Whether `r` takes part in overlap checks.
pub fn holds_slot(r: &Reservation, exclude_id: Option<&str>) -> bool {
    r.is_booking() && !r.status.is_cancelled() && exclude_id != Some(r.id.as_str())
}

/// First candidate whose interval overlaps `window`, with that interval.
pub fn find_conflict<'a>(
    candidates: &'a [Reservation],
    window: TimeWindow,
    exclude_id: Option<&str>,
) -> Option<(&'a Reservation, (u32, u32))> {
    candidates
        .iter()
        .filter(|r| holds_slot(r, exclude_id))
        .map(|r| (r, occupied_interval(r)))
        .find(|(_, (start, end))| window.overlaps_raw(*start, *end))
}

/// Add the partition-token guard and bump to `batch`.
///
/// The first claim on a date inserts the token, so two first writers cannot
/// both succeed: the second fails with `AlreadyExists` even on a backend
/// whose absent-row precondition takes no lock.
pub(crate) fn claim_partition(
    batch: WriteBatch,
    date: NaiveDate,
    observed: Option<u64>,
    now: DateTime<Utc>,
) -> WriteBatch {
    let key = partition_key(date);
    let mut token = Fields::new();
    token.insert(
        field::REVISION.to_string(),
        Value::from(observed.unwrap_or(0) + 1),
    );
    token.insert(field::RESOURCE_DATE.to_string(), Value::from(key.clone()));
    token.insert(field::UPDATED_AT.to_string(), Value::from(now.to_rfc3339()));
    let mode = match observed {
        None => WriteMode::Insert,
        Some(_) => WriteMode::Merge,
    };
    batch
        .expect_revision(RESERVATION_PARTITIONS, key.clone(), observed)
        .put(RESERVATION_PARTITIONS, key, token, mode)
}

impl ReservationService {
    /// Check a proposed window against the date's live bookings.
    ///
    /// Read-only; pass `exclude_id` when revising an existing reservation so
    /// it never conflicts with itself.
    pub async fn propose_reservation(
        &self,
        date: NaiveDate,
        window: TimeWindow,
        exclude_id: Option<&str>,
    ) -> Result<(), ReservationError> {
        self.check_slot(date, window, exclude_id).await.map(|_| ())
    }

    /// Admission check. Returns the partition token revision observed
    /// before reading the candidates (`None`: no token yet).
    pub(crate) async fn check_slot(
        &self,
        date: NaiveDate,
        window: TimeWindow,
        exclude_id: Option<&str>,
    ) -> Result<Option<u64>, ReservationError> {
        let observed = self
            .store
            .get(RESERVATION_PARTITIONS, &partition_key(date))
            .await?
            .map(|doc| doc.revision());

        let candidates = self.reservations_on(date).await?;
        if let Some((existing, occupied)) = find_conflict(&candidates, window, exclude_id) {
            debug!(
                %date,
                requested = %window,
                conflicting = %existing.id,
                "admission rejected"
            );
            return Err(ReservationError::SlotConflict {
                date,
                requested: window,
                conflicting_id: existing.id.clone(),
                occupied,
            });
        }
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resv_schemas::{ReservationKind, ReservationStatus};
    use serde_json::json;

    fn booking(id: &str, start: u32, end: u32) -> Reservation {
        let doc = json!({
            "resourceDate": "2025-12-10",
            "startMinutes": start,
            "endMinutes": end,
        });
        Reservation::from_fields(id, doc.as_object().unwrap()).unwrap()
    }

    fn window(start: u32, end: u32) -> TimeWindow {
        TimeWindow::new(start, end).unwrap()
    }

    #[test]
    fn overlapping_window_conflicts() {
        let existing = vec![booking("a", 600, 780)];
        let (r, occupied) = find_conflict(&existing, window(720, 840), None).unwrap();
        assert_eq!(r.id, "a");
        assert_eq!(occupied, (600, 780));
    }

    #[test]
    fn touching_windows_are_admitted() {
        let existing = vec![booking("a", 600, 780)];
        assert!(find_conflict(&existing, window(780, 900), None).is_none());
        assert!(find_conflict(&existing, window(480, 600), None).is_none());
    }

    #[test]
    fn cancelled_and_distribution_records_never_block() {
        let mut cancelled = booking("a", 600, 780);
        cancelled.status = ReservationStatus::Cancelled;
        let mut loan = booking("b", 600, 780);
        loan.kind = ReservationKind::Distribution;
        assert!(find_conflict(&[cancelled, loan], window(600, 780), None).is_none());
    }

    #[test]
    fn excluded_record_does_not_conflict_with_itself() {
        let existing = vec![booking("a", 600, 780)];
        assert!(find_conflict(&existing, window(630, 700), Some("a")).is_none());
        assert!(find_conflict(&existing, window(630, 700), Some("z")).is_some());
    }

    #[test]
    fn legacy_labels_are_used_without_offsets() {
        let doc = json!({
            "eventDate": "2025-12-10",
            "startTime": "10:00 AM",
            "endTime": "01:00 PM",
        });
        let r = Reservation::from_fields("legacy", doc.as_object().unwrap()).unwrap();
        assert_eq!(occupied_interval(&r), (600, 780));
        assert!(find_conflict(&[r], window(720, 840), None).is_some());
    }

    #[test]
    fn unparseable_labels_count_as_midnight() {
        let doc = json!({"resourceDate": "2025-12-10", "startTime": "noon", "endTime": "late"});
        let r = Reservation::from_fields("x", doc.as_object().unwrap()).unwrap();
        assert_eq!(occupied_interval(&r), (0, 0));
        // A degenerate stored interval blocks nothing.
        assert!(find_conflict(&[r], window(0, 60), None).is_none());
    }

    #[test]
    fn partition_claim_guards_and_bumps_token() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        let batch = claim_partition(WriteBatch::new(), date, Some(3), Utc::now());
        assert_eq!(batch.preconditions[0].id, "2025-12-10");
        assert_eq!(batch.preconditions[0].expected_revision, Some(3));
        match &batch.ops[0] {
            resv_store::WriteOp::Put { fields, .. } => assert_eq!(fields["revision"], json!(4)),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn first_claim_on_a_date_inserts_the_token() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        let batch = claim_partition(WriteBatch::new(), date, None, Utc::now());
        assert_eq!(batch.preconditions[0].expected_revision, None);
        match &batch.ops[0] {
            resv_store::WriteOp::Put { fields, mode, .. } => {
                assert_eq!(*mode, WriteMode::Insert);
                assert_eq!(fields["revision"], json!(1));
            }
            other => panic!("unexpected op {other:?}"),
        }

        let batch = claim_partition(WriteBatch::new(), date, Some(1), Utc::now());
        match &batch.ops[0] {
            resv_store::WriteOp::Put { mode, .. } => assert_eq!(*mode, WriteMode::Merge),
            other => panic!("unexpected op {other:?}"),
        }
    }
}
