//! Request and response types for the resv-daemon HTTP endpoints.
//!
//! Amounts arrive as signed integers so a negative value reaches the engine
//! and is rejected as `InvalidAmount` instead of failing JSON decoding.
//! Dates and clock times arrive as strings and are parsed by the handlers.

use resv_engine::PartyDetails;
use resv_schemas::{CatalogEntry, Reservation, ReservationKind};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable kind, e.g. `SlotConflict`.
    pub error: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Reservations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemRequest {
    pub name: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: i64,
}

/// Body of `POST /v1/reservations` and `PUT /v1/reservations/:id/distribution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    #[serde(default)]
    pub kind: ReservationKind,
    /// `YYYY-MM-DD`.
    pub resource_date: String,
    /// `HH:MM` or `hh:mm AM|PM`; bookings only.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<String>,
    /// Omitted: the sum of line totals.
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub received_amount: i64,
    #[serde(default)]
    pub items: Vec<LineItemRequest>,
    #[serde(flatten)]
    pub party: PartyDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    pub resource_date: String,
    pub start_time: String,
    pub end_time: String,
    /// Set when rescheduling, so the booking does not conflict with itself.
    pub exclude_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeResponse {
    pub admitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviseRequest {
    pub resource_date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

/// Query string of `GET /v1/reservations`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub kind: Option<String>,
    pub date: Option<String>,
    pub person_name: Option<String>,
    pub event_purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

/// A stored reservation with its document id.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    pub id: String,
    #[serde(flatten)]
    pub reservation: Reservation,
}

impl From<Reservation> for ReservationView {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id.clone(),
            reservation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationListResponse {
    pub count: usize,
    pub reservations: Vec<ReservationView>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntryView {
    pub slug: String,
    #[serde(flatten)]
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogListResponse {
    pub count: usize,
    pub entries: Vec<CatalogEntryView>,
}
