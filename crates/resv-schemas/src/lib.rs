//! resv-schemas
//!
//! Record shapes shared by every crate in the workspace: reservations (venue
//! bookings and distribution loans), their ledger entries, and catalog
//! entries. Field names are the camelCase names persisted in the document
//! store.
//!
//! Decoding is lenient (see [`lenient`]); encoding always writes canonical
//! field names.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub mod lenient;

/// Field map of a stored document (document id excluded).
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Collections and field names
// ---------------------------------------------------------------------------

pub const RESERVATIONS: &str = "reservations";
pub const LEDGER_ENTRIES: &str = "ledgerEntries";
pub const CATALOG_ENTRIES: &str = "catalogEntries";
/// One token document per date; its `revision` guards admission writes.
pub const RESERVATION_PARTITIONS: &str = "reservationPartitions";

pub mod field {
    pub const KIND: &str = "kind";
    pub const RESOURCE_DATE: &str = "resourceDate";
    pub const START_MINUTES: &str = "startMinutes";
    pub const STATUS: &str = "status";
    pub const RESERVATION_ID: &str = "reservationId";
    pub const REVISION: &str = "revision";
    pub const UPDATED_AT: &str = "updatedAt";

    /// Names a reservation's date may be stored under, canonical first.
    pub const RESOURCE_DATE_ALIASES: &[&str] = &[RESOURCE_DATE, "eventDate"];
    /// Names a ledger entry's reservation key may be stored under.
    pub const RESERVATION_ID_ALIASES: &[&str] = &[RESERVATION_ID, "bookingId", "distributionId"];
}

/// `(canonical, legacy names)` pairs for reservation documents.
const LEGACY_RESERVATION_FIELDS: &[(&str, &[&str])] = &[
    ("resourceDate", &["eventDate"]),
    ("totalAmount", &["totalPrice"]),
    ("receivedAmount", &["advanceAmount"]),
    ("pendingAmount", &["remainingAmount"]),
];

/// `(canonical, legacy names)` pairs for ledger entry documents.
const LEGACY_LEDGER_FIELDS: &[(&str, &[&str])] = &[
    ("reservationId", &["bookingId", "distributionId"]),
    ("kind", &["paymentType"]),
    ("resourceDate", &["eventDate"]),
    ("totalAmount", &["totalPrice"]),
    ("receivedAmount", &["advanceAmount"]),
    ("pendingAmount", &["remainingAmount"]),
];

const LEGACY_ITEM_FIELDS: &[(&str, &[&str])] =
    &[("name", &["itemName"]), ("quantity", &["quantityGiven"])];

const LEGACY_CATALOG_FIELDS: &[(&str, &[&str])] = &[("name", &["itemName"])];

/// Rewrite legacy field names to canonical ones. When both are present the
/// canonical value wins and the legacy key is dropped.
fn canonicalize(fields: &mut Fields, table: &[(&str, &[&str])]) {
    for (canonical, legacy) in table {
        for old in *legacy {
            if let Some(v) = fields.remove(*old) {
                if !fields.contains_key(*canonical) {
                    fields.insert((*canonical).to_string(), v);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A stored document could not be decoded into a record.
    Undecodable { id: String, reason: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecodable { id, reason } => {
                write!(f, "document {id} could not be decoded: {reason}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

fn decode<T: for<'de> Deserialize<'de>>(id: &str, fields: Fields) -> Result<T, SchemaError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| SchemaError::Undecodable {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(record: &T) -> Fields {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        // Records are structs of plain fields; they always encode as objects.
        _ => Fields::new(),
    }
}

// ---------------------------------------------------------------------------
// Kind / Status
// ---------------------------------------------------------------------------

/// Resource class of a reservation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationKind {
    /// Venue booking with a time window on its date.
    #[default]
    Booking,
    /// Equipment-distribution loan with line items and no time window.
    Distribution,
}

impl ReservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationKind::Booking => "booking",
            ReservationKind::Distribution => "distribution",
        }
    }

    /// Anything other than `"distribution"` decodes as a booking.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("distribution") {
            ReservationKind::Distribution
        } else {
            ReservationKind::Booking
        }
    }
}

impl<'de> Deserialize<'de> for ReservationKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(v.as_str().map(Self::parse_lenient).unwrap_or_default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ReservationStatus {
    #[default]
    Confirmed,
    Completed,
    /// Terminal. Cancelled reservations never take part in overlap checks.
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Completed => "Completed",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }

    /// Strict parse for caller input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Some(ReservationStatus::Confirmed),
            "completed" => Some(ReservationStatus::Completed),
            "cancelled" | "canceled" => Some(ReservationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled)
    }
}

impl<'de> Deserialize<'de> for ReservationStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        Ok(v.as_str().and_then(Self::parse).unwrap_or_default())
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Financial triple
// ---------------------------------------------------------------------------

/// `(total, received, pending)` with `pending = max(0, total - received)`.
///
/// The only constructor derives `pending`, so a triple built here always
/// satisfies the invariant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialTriple {
    pub total: u64,
    pub received: u64,
    pub pending: u64,
}

impl FinancialTriple {
    pub fn new(total: u64, received: u64) -> Self {
        Self {
            total,
            received,
            pending: total.saturating_sub(received),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One loaned item on a distribution record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub quantity: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub unit_price: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub line_total: u64,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u64, unit_price: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
            line_total: quantity.saturating_mul(unit_price),
        }
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// A venue booking or a distribution loan, with its financial triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Document id; not stored inside the field map.
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub kind: ReservationKind,
    /// `None` when the stored date is missing or unparseable. Such records
    /// stay visible (they sort after every dated record) but never hold a slot.
    #[serde(
        default,
        deserialize_with = "lenient::opt_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::opt_minutes")]
    pub start_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_minutes")]
    pub end_minutes: Option<u32>,
    /// 12-hour label kept for readers that predate minute offsets.
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub status: ReservationStatus,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub total_amount: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub received_amount: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub pending_amount: u64,
    #[serde(default, deserialize_with = "lenient::items")]
    pub items: Vec<LineItem>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub function_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub person_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub mobile: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub event_purpose: String,
    #[serde(default, deserialize_with = "lenient::opt_date")]
    pub return_date: Option<NaiveDate>,
    /// Bumped on every write; ledger updates are guarded by it.
    #[serde(default, deserialize_with = "lenient::amount")]
    pub revision: u64,
    /// Never written as null: legacy timestamps that fail to decode survive merges.
    #[serde(
        default,
        deserialize_with = "lenient::opt_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Decode a stored reservation document.
    pub fn from_fields(id: &str, fields: &Fields) -> Result<Self, SchemaError> {
        let mut fields = fields.clone();
        fields.remove("id");
        if !fields.contains_key(field::KIND) && fields.contains_key("distributionId") {
            fields.insert(field::KIND.to_string(), Value::from("distribution"));
        }
        canonicalize(&mut fields, LEGACY_RESERVATION_FIELDS);
        if let Some(Value::Array(rows)) = fields.get_mut("items") {
            for row in rows.iter_mut() {
                if let Value::Object(item) = row {
                    canonicalize(item, LEGACY_ITEM_FIELDS);
                }
            }
        }
        let mut reservation: Reservation = decode(id, fields)?;
        reservation.id = id.to_string();
        Ok(reservation)
    }

    pub fn to_fields(&self) -> Fields {
        encode(self)
    }

    /// Triple derived from total and received; the stored `pending_amount`
    /// is a mirror and is not trusted.
    pub fn triple(&self) -> FinancialTriple {
        FinancialTriple::new(self.total_amount, self.received_amount)
    }

    pub fn set_triple(&mut self, triple: FinancialTriple) {
        self.total_amount = triple.total;
        self.received_amount = triple.received;
        self.pending_amount = triple.pending;
    }

    pub fn is_booking(&self) -> bool {
        self.kind == ReservationKind::Booking
    }

    /// Sum of line totals.
    pub fn items_total(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.line_total))
    }
}

// ---------------------------------------------------------------------------
// Ledger entry
// ---------------------------------------------------------------------------

/// Secondary record mirroring one reservation's financial triple.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(skip)]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub reservation_id: String,
    #[serde(default)]
    pub kind: ReservationKind,
    #[serde(default, deserialize_with = "lenient::string")]
    pub person_name: String,
    #[serde(default, deserialize_with = "lenient::opt_date")]
    pub resource_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub total_amount: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub received_amount: u64,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub pending_amount: u64,
    #[serde(
        default,
        deserialize_with = "lenient::opt_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Fresh entry for a reservation; shares the reservation's id.
    pub fn for_reservation(reservation: &Reservation, now: DateTime<Utc>) -> Self {
        let mut entry = Self {
            id: reservation.id.clone(),
            reservation_id: reservation.id.clone(),
            kind: reservation.kind,
            person_name: reservation.person_name.clone(),
            resource_date: reservation.resource_date,
            total_amount: 0,
            received_amount: 0,
            pending_amount: 0,
            created_at: Some(now),
            updated_at: Some(now),
        };
        entry.set_triple(reservation.triple());
        entry
    }

    pub fn from_fields(id: &str, fields: &Fields) -> Result<Self, SchemaError> {
        let mut fields = fields.clone();
        fields.remove("id");
        canonicalize(&mut fields, LEGACY_LEDGER_FIELDS);
        let mut entry: LedgerEntry = decode(id, fields)?;
        entry.id = id.to_string();
        Ok(entry)
    }

    pub fn to_fields(&self) -> Fields {
        encode(self)
    }

    /// Triple exactly as stored (a mismatch with the reservation is what
    /// the ledger audit looks for, so nothing is re-derived here).
    pub fn stored_triple(&self) -> FinancialTriple {
        FinancialTriple {
            total: self.total_amount,
            received: self.received_amount,
            pending: self.pending_amount,
        }
    }

    pub fn set_triple(&mut self, triple: FinancialTriple) {
        self.total_amount = triple.total;
        self.received_amount = triple.received;
        self.pending_amount = triple.pending;
    }
}

// ---------------------------------------------------------------------------
// Catalog entry
// ---------------------------------------------------------------------------

/// Deduplicated free-text item name, keyed by slug.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(skip)]
    pub slug: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    pub fn from_fields(slug: &str, fields: &Fields) -> Result<Self, SchemaError> {
        let mut fields = fields.clone();
        canonicalize(&mut fields, LEGACY_CATALOG_FIELDS);
        let mut entry: CatalogEntry = decode(slug, fields)?;
        entry.slug = slug.to_string();
        Ok(entry)
    }

    pub fn to_fields(&self) -> Fields {
        encode(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
