//! resv-engine
//!
//! Reservation admission control, payment-ledger reconciliation and the
//! live view, over any [`resv_store::DocumentStore`].
//!
//! Architectural decisions:
//! - No two admitted bookings overlap on the same date. Admission holds a
//!   per-date lock and claims the date's partition token in the same atomic
//!   batch as the write.
//! - A reservation and its ledger entries are one aggregate, written by one
//!   batch under the reservation's revision.
//! - Catalog sync is a non-critical side effect: logged, never propagated.
//! - Business-rule errors surface verbatim and are never retried; write
//!   conflicts are retried a bounded number of times.

mod admission;
mod audit;
mod error;
mod ledger;
mod live_view;
mod locks;
mod report;
mod service;
mod types;

pub use admission::{find_conflict, holds_slot, occupied_interval, partition_key};
pub use audit::{audit_ledger, LedgerAuditReport, LedgerFinding};
pub use error::{amount_from_input, ReservationError};
pub use live_view::{display_order, sort_for_display, LiveView, Snapshot, Subscription};
pub use locks::KeyedLocks;
pub use report::{summarize_month, PeriodSummary, ReservationFilter};
pub use service::{EngineConfig, ReservationService, DEFAULT_MAX_COMMIT_ATTEMPTS};
pub use types::{
    LedgerRepair, LineItemDraft, PartyDetails, PaymentReceipt, ReservationDraft,
};
