//! Search filters and period summaries over live-view snapshots.
//!
//! Pure functions; callers pass whatever snapshot they hold.

use chrono::{Datelike, NaiveDate};
use resv_schemas::{Reservation, ReservationKind};
use serde::{Deserialize, Serialize};

/// Search filter. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReservationFilter {
    pub kind: Option<ReservationKind>,
    pub date: Option<NaiveDate>,
    /// Case-insensitive substring of the person name.
    pub person_name: Option<String>,
    /// Exact event purpose.
    pub event_purpose: Option<String>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        if self.kind.is_some_and(|k| k != r.kind) {
            return false;
        }
        if self.date.is_some_and(|d| r.resource_date != Some(d)) {
            return false;
        }
        if let Some(needle) = self.person_name.as_deref().map(str::trim) {
            if !needle.is_empty()
                && !r
                    .person_name
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(purpose) = self.event_purpose.as_deref() {
            if !purpose.is_empty() && r.event_purpose != purpose {
                return false;
            }
        }
        true
    }

    /// Matching reservations, in input order.
    pub fn apply<'a>(&self, reservations: &'a [Reservation]) -> Vec<&'a Reservation> {
        reservations.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Totals for one calendar month. Cancelled reservations are counted but
/// excluded from the amounts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub year: i32,
    pub month: u32,
    pub count: usize,
    pub cancelled: usize,
    pub total_amount: u64,
    pub received_amount: u64,
    pub pending_amount: u64,
}

pub fn summarize_month<'a, I>(reservations: I, year: i32, month: u32) -> PeriodSummary
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut summary = PeriodSummary {
        year,
        month,
        ..PeriodSummary::default()
    };
    for r in reservations {
        match r.resource_date {
            Some(d) if d.year() == year && d.month() == month => {}
            _ => continue,
        }
        summary.count += 1;
        if r.status.is_cancelled() {
            summary.cancelled += 1;
            continue;
        }
        let t = r.triple();
        summary.total_amount = summary.total_amount.saturating_add(t.total);
        summary.received_amount = summary.received_amount.saturating_add(t.received);
        summary.pending_amount = summary.pending_amount.saturating_add(t.pending);
    }
    summary
}
