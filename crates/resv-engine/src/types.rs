use chrono::{DateTime, NaiveDate, Utc};
use resv_interval::TimeWindow;
use resv_schemas::{
    FinancialTriple, LineItem, Reservation, ReservationKind, ReservationStatus,
};
use serde::{Deserialize, Serialize};

use crate::ReservationError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Who the reservation is for. Carried through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartyDetails {
    pub function_name: String,
    pub person_name: String,
    pub mobile: String,
    pub address: String,
    pub event_purpose: String,
    /// Distribution loans: date the items are due back.
    pub return_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDraft {
    pub name: String,
    pub quantity: u64,
    #[serde(default)]
    pub unit_price: u64,
}

impl LineItemDraft {
    pub fn new(name: impl Into<String>, quantity: u64, unit_price: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
        }
    }
}

/// A proposed reservation, as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationDraft {
    pub kind: ReservationKind,
    pub resource_date: NaiveDate,
    /// Required for bookings; ignored for distributions.
    pub window: Option<TimeWindow>,
    pub status: ReservationStatus,
    /// `None`: total is the sum of line totals.
    pub total_amount: Option<u64>,
    pub received_amount: u64,
    pub items: Vec<LineItemDraft>,
    pub party: PartyDetails,
}

impl ReservationDraft {
    pub fn booking(resource_date: NaiveDate, window: TimeWindow) -> Self {
        Self {
            kind: ReservationKind::Booking,
            resource_date,
            window: Some(window),
            status: ReservationStatus::Confirmed,
            total_amount: None,
            received_amount: 0,
            items: Vec::new(),
            party: PartyDetails::default(),
        }
    }

    pub fn distribution(resource_date: NaiveDate, items: Vec<LineItemDraft>) -> Self {
        Self {
            kind: ReservationKind::Distribution,
            resource_date,
            window: None,
            status: ReservationStatus::Confirmed,
            total_amount: None,
            received_amount: 0,
            items,
            party: PartyDetails::default(),
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total_amount = Some(total);
        self
    }

    pub fn with_received(mut self, received: u64) -> Self {
        self.received_amount = received;
        self
    }

    pub fn with_status(mut self, status: ReservationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_party(mut self, party: PartyDetails) -> Self {
        self.party = party;
        self
    }

    /// Validate and normalise. Never touches the store.
    pub(crate) fn prepare(&self) -> Result<PreparedDraft, ReservationError> {
        let window = match self.kind {
            ReservationKind::Booking => {
                if !self.items.is_empty() {
                    return Err(ReservationError::validation(
                        "line items are only recorded on distributions",
                    ));
                }
                Some(self.window.ok_or_else(|| {
                    ReservationError::validation("a booking requires a start and end time")
                })?)
            }
            ReservationKind::Distribution => None,
        };

        let mut items = Vec::with_capacity(self.items.len());
        for (i, item) in self.items.iter().enumerate() {
            let name = item.name.trim();
            if name.is_empty() {
                return Err(ReservationError::validation(format!(
                    "item {} has no name",
                    i + 1
                )));
            }
            if item.quantity == 0 {
                return Err(ReservationError::validation(format!(
                    "item {name:?} must have a quantity above zero"
                )));
            }
            items.push(LineItem::new(name, item.quantity, item.unit_price));
        }

        let items_total = items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.line_total));
        let total = self.total_amount.unwrap_or(items_total);
        if self.received_amount > total {
            return Err(ReservationError::InvalidAmount(format!(
                "received amount {} exceeds total amount {total}",
                self.received_amount
            )));
        }

        let mut party = self.party.clone();
        party.function_name = party.function_name.trim().to_string();
        party.person_name = party.person_name.trim().to_string();
        party.mobile = party.mobile.trim().to_string();
        party.address = party.address.trim().to_string();
        party.event_purpose = party.event_purpose.trim().to_string();

        Ok(PreparedDraft {
            kind: self.kind,
            resource_date: self.resource_date,
            window,
            status: self.status,
            triple: FinancialTriple::new(total, self.received_amount),
            items,
            party,
        })
    }
}

/// A draft that passed validation.
#[derive(Clone, Debug)]
pub(crate) struct PreparedDraft {
    pub kind: ReservationKind,
    pub resource_date: NaiveDate,
    pub window: Option<TimeWindow>,
    pub status: ReservationStatus,
    pub triple: FinancialTriple,
    pub items: Vec<LineItem>,
    pub party: PartyDetails,
}

impl PreparedDraft {
    pub fn item_names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.name.clone()).collect()
    }

    pub fn into_reservation(self, id: String, now: DateTime<Utc>) -> Reservation {
        let mut r = Reservation {
            id,
            kind: self.kind,
            resource_date: Some(self.resource_date),
            start_minutes: None,
            end_minutes: None,
            start_time: None,
            end_time: None,
            status: self.status,
            total_amount: 0,
            received_amount: 0,
            pending_amount: 0,
            items: Vec::new(),
            function_name: String::new(),
            person_name: String::new(),
            mobile: String::new(),
            address: String::new(),
            event_purpose: String::new(),
            return_date: None,
            revision: 1,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.apply_to(&mut r);
        r
    }

    /// Overwrite every draft-controlled field of `r`. Status, id, revision
    /// and timestamps are left alone.
    pub fn apply_to(self, r: &mut Reservation) {
        r.kind = self.kind;
        r.resource_date = Some(self.resource_date);
        set_window(r, self.window);
        r.set_triple(self.triple);
        r.items = self.items;
        r.function_name = self.party.function_name;
        r.person_name = self.party.person_name;
        r.mobile = self.party.mobile;
        r.address = self.party.address;
        r.event_purpose = self.party.event_purpose;
        r.return_date = self.party.return_date;
    }
}

/// Store offsets plus the 12-hour labels older readers expect.
pub(crate) fn set_window(r: &mut Reservation, window: Option<TimeWindow>) {
    r.start_minutes = window.map(|w| w.start());
    r.end_minutes = window.map(|w| w.end());
    r.start_time = window.map(|w| w.start_label());
    r.end_time = window.map(|w| w.end_label());
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Result of an accepted payment receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub reservation_id: String,
    pub received_amount: u64,
    pub pending_amount: u64,
    pub status: ReservationStatus,
}

/// What `repair_ledger` rewrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRepair {
    pub reservation_id: String,
    pub entries_rewritten: usize,
    pub entry_created: bool,
    pub triple: FinancialTriple,
}
