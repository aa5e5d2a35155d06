//! Ledger audit.
//!
//! Pure reconcile of reservations against ledger entries. The atomic write
//! path keeps them in step; the audit exists for data written before it
//! (separate, non-atomic writes) and for stores edited by hand.
//!
//! Deterministic: findings are ordered by reservation id, then entry id.

use std::collections::BTreeMap;

use resv_schemas::{FinancialTriple, LedgerEntry, Reservation};
use serde::Serialize;

use crate::{ReservationError, ReservationService};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "finding", rename_all = "camelCase")]
pub enum LedgerFinding {
    /// Reservation with no ledger entry.
    #[serde(rename_all = "camelCase")]
    MissingEntry { reservation_id: String },
    /// Ledger entry whose reservation no longer exists.
    #[serde(rename_all = "camelCase")]
    OrphanedEntry {
        entry_id: String,
        reservation_id: String,
    },
    /// Entry triple differs from the reservation's derived triple.
    #[serde(rename_all = "camelCase")]
    TripleMismatch {
        reservation_id: String,
        entry_id: String,
        expected: FinancialTriple,
        found: FinancialTriple,
    },
    /// Reservation's stored `pendingAmount` differs from `total - received`.
    #[serde(rename_all = "camelCase")]
    StalePending {
        reservation_id: String,
        stored: u64,
        derived: u64,
    },
}

impl LedgerFinding {
    pub fn reservation_id(&self) -> &str {
        match self {
            Self::MissingEntry { reservation_id }
            | Self::OrphanedEntry { reservation_id, .. }
            | Self::TripleMismatch { reservation_id, .. }
            | Self::StalePending { reservation_id, .. } => reservation_id,
        }
    }

    /// Findings `repair_ledger` can fix (everything but orphans).
    pub fn is_repairable(&self) -> bool {
        !matches!(self, Self::OrphanedEntry { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAuditReport {
    pub reservations_checked: usize,
    pub entries_checked: usize,
    pub findings: Vec<LedgerFinding>,
}

impl LedgerAuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Reservation ids with at least one repairable finding, deduplicated.
    pub fn repairable_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .findings
            .iter()
            .filter(|f| f.is_repairable())
            .map(|f| f.reservation_id().to_string())
            .collect();
        ids.dedup();
        ids
    }
}

/// Compare every reservation's derived triple with its ledger entries.
pub fn audit_ledger(reservations: &[Reservation], entries: &[LedgerEntry]) -> LedgerAuditReport {
    let mut by_reservation: BTreeMap<&str, Vec<&LedgerEntry>> = BTreeMap::new();
    for entry in entries {
        by_reservation
            .entry(entry.reservation_id.as_str())
            .or_default()
            .push(entry);
    }
    for list in by_reservation.values_mut() {
        list.sort_by(|a, b| a.id.cmp(&b.id));
    }

    let mut sorted: Vec<&Reservation> = reservations.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut findings = Vec::new();
    for r in &sorted {
        let expected = r.triple();
        if r.pending_amount != expected.pending {
            findings.push(LedgerFinding::StalePending {
                reservation_id: r.id.clone(),
                stored: r.pending_amount,
                derived: expected.pending,
            });
        }
        match by_reservation.remove(r.id.as_str()) {
            None => findings.push(LedgerFinding::MissingEntry {
                reservation_id: r.id.clone(),
            }),
            Some(list) => {
                for entry in list {
                    let found = entry.stored_triple();
                    if found != expected {
                        findings.push(LedgerFinding::TripleMismatch {
                            reservation_id: r.id.clone(),
                            entry_id: entry.id.clone(),
                            expected,
                            found,
                        });
                    }
                }
            }
        }
    }

    // Whatever is left points at reservations that do not exist.
    for (reservation_id, list) in by_reservation {
        for entry in list {
            findings.push(LedgerFinding::OrphanedEntry {
                entry_id: entry.id.clone(),
                reservation_id: reservation_id.to_string(),
            });
        }
    }

    LedgerAuditReport {
        reservations_checked: reservations.len(),
        entries_checked: entries.len(),
        findings,
    }
}

impl ReservationService {
    /// Audit the whole store.
    pub async fn audit(&self) -> Result<LedgerAuditReport, ReservationError> {
        let reservations = self.list_reservations().await?;
        let entries = self.list_ledger_entries().await?;
        Ok(audit_ledger(&reservations, &entries))
    }
}
