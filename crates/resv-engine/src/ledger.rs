//! Payment ledger reconciliation.
//!
//! A reservation and its ledger entries form one aggregate. Every write that
//! touches the financial triple goes through a single [`WriteBatch`] that
//! - is guarded by the reservation's `revision` (precondition),
//! - rewrites the reservation with `revision + 1`,
//! - rewrites every ledger entry with the same triple (or creates one when
//!   legacy data has none).
//!
//! The store applies the batch all-or-nothing, so the ledger's pending
//! amount can never diverge from the reservation's. In-process writers are
//! also serialised per reservation id; the revision guard catches writers in
//! other processes, and the attempt is re-run from a fresh read.

use chrono::{DateTime, NaiveDate, Utc};
use resv_interval::TimeWindow;
use resv_schemas::{
    FinancialTriple, LedgerEntry, Reservation, ReservationKind, ReservationStatus,
    LEDGER_ENTRIES, RESERVATIONS,
};
use resv_store::{WriteBatch, WriteMode};
use tracing::{info, warn};

use crate::admission::{claim_partition, partition_key};
use crate::service::{settle, Attempt};
use crate::types::set_window;
use crate::{LedgerRepair, PaymentReceipt, ReservationDraft, ReservationError, ReservationService};

/// Rewrite `r` under a revision guard. Bumps `revision` and `updatedAt`,
/// and re-derives `pendingAmount` so a stale stored mirror is never written
/// back next to a freshly mirrored ledger entry.
fn stage_reservation(
    batch: WriteBatch,
    observed_revision: u64,
    r: &mut Reservation,
    now: DateTime<Utc>,
) -> WriteBatch {
    r.set_triple(r.triple());
    r.revision = observed_revision + 1;
    r.updated_at = Some(now);
    batch
        .expect_revision(RESERVATIONS, r.id.clone(), Some(observed_revision))
        .put(RESERVATIONS, r.id.clone(), r.to_fields(), WriteMode::Merge)
}

/// Copy `r`'s triple (and the denormalised fields) onto every entry, or
/// create the entry when there is none. Returns whether one was created.
fn mirror_ledger(
    mut batch: WriteBatch,
    entries: Vec<LedgerEntry>,
    r: &Reservation,
    now: DateTime<Utc>,
) -> (WriteBatch, bool) {
    if entries.is_empty() {
        let entry = LedgerEntry::for_reservation(r, now);
        let batch = batch.put(
            LEDGER_ENTRIES,
            entry.id.clone(),
            entry.to_fields(),
            WriteMode::Insert,
        );
        return (batch, true);
    }
    for mut entry in entries {
        entry.set_triple(r.triple());
        entry.kind = r.kind;
        entry.person_name = r.person_name.clone();
        entry.resource_date = r.resource_date;
        entry.updated_at = Some(now);
        batch = batch.put(
            LEDGER_ENTRIES,
            entry.id.clone(),
            entry.to_fields(),
            WriteMode::Merge,
        );
    }
    (batch, false)
}

impl ReservationService {
    /// Admit (bookings) and persist a reservation together with its ledger
    /// entry, then best-effort sync item names into the catalog.
    ///
    /// Cancelled bookings and distributions skip admission.
    pub async fn create_reservation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<Reservation, ReservationError> {
        let prepared = draft.prepare()?;
        let item_names = prepared.item_names();
        let admission = match (prepared.kind, prepared.window) {
            (ReservationKind::Booking, Some(w)) if !prepared.status.is_cancelled() => Some(w),
            _ => None,
        };

        let date = prepared.resource_date;
        let now = Utc::now();
        let reservation = prepared.into_reservation(self.store.new_id(), now);
        let entry = LedgerEntry::for_reservation(&reservation, now);
        let base = WriteBatch::new()
            .put(
                RESERVATIONS,
                reservation.id.clone(),
                reservation.to_fields(),
                WriteMode::Insert,
            )
            .put(
                LEDGER_ENTRIES,
                entry.id.clone(),
                entry.to_fields(),
                WriteMode::Insert,
            );

        match admission {
            Some(window) => {
                let _partition = self.partitions.acquire(&partition_key(date)).await;
                self.retry_on_conflict("create_reservation", || {
                    let base = base.clone();
                    async move {
                        let observed = self.check_slot(date, window, None).await?;
                        let batch = claim_partition(base, date, observed, Utc::now());
                        settle(self.store.commit(batch).await, ())
                    }
                })
                .await?;
            }
            None => {
                self.retry_on_conflict("create_reservation", || {
                    let base = base.clone();
                    async move { settle(self.store.commit(base).await, ()) }
                })
                .await?;
            }
        }

        info!(
            id = %reservation.id,
            kind = reservation.kind.as_str(),
            %date,
            total = reservation.total_amount,
            received = reservation.received_amount,
            "reservation created"
        );

        if reservation.kind == ReservationKind::Distribution && !item_names.is_empty() {
            self.catalog.sync_names(&item_names).await;
        }
        Ok(reservation)
    }

    /// Apply a partial payment to the reservation and its ledger entries.
    ///
    /// A booking whose pending amount reaches zero is marked Completed
    /// unless it is Cancelled. Distributions keep their status.
    pub async fn receive_pending_payment(
        &self,
        id: &str,
        amount: u64,
    ) -> Result<PaymentReceipt, ReservationError> {
        if amount == 0 {
            return Err(ReservationError::InvalidAmount(
                "payment amount must be greater than zero".to_string(),
            ));
        }

        let _aggregate = self.aggregates.acquire(id).await;
        let receipt = self
            .retry_on_conflict("receive_pending_payment", || async move {
                let (doc, mut r) = self.load(id).await?;
                let current = r.triple();
                if current.pending == 0 {
                    return Err(ReservationError::NothingPending { id: id.to_string() });
                }
                if amount > current.pending {
                    return Err(ReservationError::AmountExceedsPending {
                        amount,
                        pending: current.pending,
                    });
                }

                let next =
                    FinancialTriple::new(current.total, current.received.saturating_add(amount));
                r.set_triple(next);
                if r.is_booking() && next.is_settled() && !r.status.is_cancelled() {
                    r.status = ReservationStatus::Completed;
                }

                let entries = self.ledger_entries_for(id).await?;
                let now = Utc::now();
                let batch = stage_reservation(WriteBatch::new(), doc.revision(), &mut r, now);
                let (batch, created) = mirror_ledger(batch, entries, &r, now);
                if created {
                    warn!(reservation = id, "ledger entry missing; creating it with this payment");
                }

                let receipt = PaymentReceipt {
                    reservation_id: r.id.clone(),
                    received_amount: next.received,
                    pending_amount: next.pending,
                    status: r.status,
                };
                settle(self.store.commit(batch).await, receipt)
            })
            .await?;

        info!(
            id,
            amount,
            received = receipt.received_amount,
            pending = receipt.pending_amount,
            status = %receipt.status,
            "payment received"
        );
        Ok(receipt)
    }

    /// Delete a reservation and every ledger entry that points at it, in one
    /// batch.
    pub async fn delete_reservation(&self, id: &str) -> Result<(), ReservationError> {
        let _aggregate = self.aggregates.acquire(id).await;
        let removed = self
            .retry_on_conflict("delete_reservation", || async move {
                let (doc, _) = self.load(id).await?;
                let entries = self.ledger_entries_for(id).await?;
                let mut batch = WriteBatch::new()
                    .expect_revision(RESERVATIONS, id, Some(doc.revision()))
                    .delete(RESERVATIONS, id);
                for entry in &entries {
                    batch = batch.delete(LEDGER_ENTRIES, entry.id.clone());
                }
                settle(self.store.commit(batch).await, entries.len())
            })
            .await?;

        info!(id, ledger_entries = removed, "reservation deleted");
        Ok(())
    }

    /// Change status. Cancelled is terminal: a cancelled reservation can be
    /// deleted but never reopened.
    pub async fn update_status(
        &self,
        id: &str,
        status: ReservationStatus,
    ) -> Result<Reservation, ReservationError> {
        let _aggregate = self.aggregates.acquire(id).await;
        self.retry_on_conflict("update_status", || async move {
            let (doc, mut r) = self.load(id).await?;
            if r.status == status {
                return Ok(Attempt::Committed(r));
            }
            if r.status.is_cancelled() {
                return Err(ReservationError::validation(format!(
                    "reservation {id} is cancelled and cannot become {status}"
                )));
            }
            let from = r.status;
            r.status = status;
            let batch = stage_reservation(WriteBatch::new(), doc.revision(), &mut r, Utc::now());
            let committed = settle(self.store.commit(batch).await, r)?;
            if let Attempt::Committed(r) = &committed {
                info!(id, %from, to = %r.status, "status updated");
            }
            Ok(committed)
        })
        .await
    }

    /// Move a booking to a new date/window, re-running admission with the
    /// booking itself excluded.
    pub async fn revise_booking(
        &self,
        id: &str,
        date: NaiveDate,
        window: TimeWindow,
    ) -> Result<Reservation, ReservationError> {
        let _aggregate = self.aggregates.acquire(id).await;
        let _partition = self.partitions.acquire(&partition_key(date)).await;
        let revised = self
            .retry_on_conflict("revise_booking", || async move {
                let (doc, mut r) = self.load(id).await?;
                if !r.is_booking() {
                    return Err(ReservationError::validation(format!(
                        "reservation {id} is a distribution and has no time window"
                    )));
                }
                if r.status.is_cancelled() {
                    return Err(ReservationError::validation(format!(
                        "reservation {id} is cancelled and cannot be rescheduled"
                    )));
                }

                let observed = self.check_slot(date, window, Some(id)).await?;
                r.resource_date = Some(date);
                set_window(&mut r, Some(window));

                let entries = self.ledger_entries_for(id).await?;
                let now = Utc::now();
                let batch = stage_reservation(WriteBatch::new(), doc.revision(), &mut r, now);
                let (batch, _) = mirror_ledger(batch, entries, &r, now);
                let batch = claim_partition(batch, date, observed, now);
                settle(self.store.commit(batch).await, r)
            })
            .await?;

        info!(id, %date, %window, "booking rescheduled");
        Ok(revised)
    }

    /// Replace a distribution's date, items, amounts and party details.
    /// Status is left as stored; use [`ReservationService::update_status`].
    pub async fn update_distribution(
        &self,
        id: &str,
        draft: &ReservationDraft,
    ) -> Result<Reservation, ReservationError> {
        if draft.kind != ReservationKind::Distribution {
            return Err(ReservationError::validation(
                "distribution update requires a distribution draft",
            ));
        }
        let prepared = draft.prepare()?;
        let item_names = prepared.item_names();

        let _aggregate = self.aggregates.acquire(id).await;
        let prepared = &prepared;
        let updated = self
            .retry_on_conflict("update_distribution", || async move {
                let (doc, mut r) = self.load(id).await?;
                if r.is_booking() {
                    return Err(ReservationError::validation(format!(
                        "reservation {id} is a booking"
                    )));
                }
                prepared.clone().apply_to(&mut r);

                let entries = self.ledger_entries_for(id).await?;
                let now = Utc::now();
                let batch = stage_reservation(WriteBatch::new(), doc.revision(), &mut r, now);
                let (batch, _) = mirror_ledger(batch, entries, &r, now);
                settle(self.store.commit(batch).await, r)
            })
            .await?;

        info!(
            id,
            total = updated.total_amount,
            received = updated.received_amount,
            items = updated.items.len(),
            "distribution updated"
        );
        if !item_names.is_empty() {
            self.catalog.sync_names(&item_names).await;
        }
        Ok(updated)
    }

    /// Rewrite the reservation's pending mirror and every ledger entry from
    /// `(total, received)`. Creates the entry if it is missing.
    pub async fn repair_ledger(&self, id: &str) -> Result<LedgerRepair, ReservationError> {
        let _aggregate = self.aggregates.acquire(id).await;
        let repair = self
            .retry_on_conflict("repair_ledger", || async move {
                let (doc, mut r) = self.load(id).await?;
                let triple = r.triple();
                r.set_triple(triple);

                let entries = self.ledger_entries_for(id).await?;
                let rewritten = entries.len();
                let now = Utc::now();
                let batch = stage_reservation(WriteBatch::new(), doc.revision(), &mut r, now);
                let (batch, created) = mirror_ledger(batch, entries, &r, now);
                let repair = LedgerRepair {
                    reservation_id: r.id.clone(),
                    entries_rewritten: rewritten,
                    entry_created: created,
                    triple,
                };
                settle(self.store.commit(batch).await, repair)
            })
            .await?;

        info!(
            id,
            rewritten = repair.entries_rewritten,
            created = repair.entry_created,
            "ledger repaired"
        );
        Ok(repair)
    }
}
