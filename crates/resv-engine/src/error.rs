use std::fmt;

use chrono::NaiveDate;
use resv_interval::{IntervalError, TimeWindow};
use resv_schemas::SchemaError;
use resv_store::StoreError;

/// Every caller-facing failure of the reservation engine.
///
/// Business-rule variants are final: retrying the same request cannot
/// succeed. Only [`ReservationError::StoreUnavailable`] is worth retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// Malformed or missing input, rejected before any store call.
    Validation(String),
    /// The proposed window overlaps a live booking on the same date.
    SlotConflict {
        date: NaiveDate,
        requested: TimeWindow,
        conflicting_id: String,
        occupied: (u32, u32),
    },
    /// An amount is zero/negative where a positive one is required, or
    /// received exceeds total.
    InvalidAmount(String),
    /// The reservation is already fully paid.
    NothingPending { id: String },
    AmountExceedsPending { amount: u64, pending: u64 },
    NotFound { id: String },
    /// Transport or backend failure, or optimistic retries exhausted.
    StoreUnavailable(String),
}

impl ReservationError {
    /// Stable machine-readable kind, used on the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::SlotConflict { .. } => "SlotConflict",
            Self::InvalidAmount(_) => "InvalidAmount",
            Self::NothingPending { .. } => "NothingPending",
            Self::AmountExceedsPending { .. } => "AmountExceedsPending",
            Self::NotFound { .. } => "NotFound",
            Self::StoreUnavailable(_) => "StoreUnavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}

impl fmt::Display for ReservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid request: {msg}"),
            Self::SlotConflict {
                date,
                requested,
                conflicting_id,
                occupied,
            } => write!(
                f,
                "slot {requested} on {date} overlaps reservation {conflicting_id} ({}–{})",
                resv_interval::to_24_hour(occupied.0),
                resv_interval::to_24_hour(occupied.1)
            ),
            Self::InvalidAmount(msg) => write!(f, "invalid amount: {msg}"),
            Self::NothingPending { id } => {
                write!(f, "reservation {id} has no pending amount")
            }
            Self::AmountExceedsPending { amount, pending } => {
                write!(f, "amount {amount} exceeds pending amount {pending}")
            }
            Self::NotFound { id } => write!(f, "reservation {id} not found"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ReservationError {}

impl From<StoreError> for ReservationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            // Conflicts only escape when the caller did not retry them.
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// A stored document that cannot be decoded will not decode on a retry
/// either, so it is reported as a final error.
impl From<SchemaError> for ReservationError {
    fn from(e: SchemaError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<IntervalError> for ReservationError {
    fn from(e: IntervalError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Convert a caller-supplied signed amount; negatives are `InvalidAmount`.
pub fn amount_from_input(field: &str, raw: i64) -> Result<u64, ReservationError> {
    u64::try_from(raw)
        .map_err(|_| ReservationError::InvalidAmount(format!("{field} must be >= 0, got {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outages_map_to_store_unavailable() {
        let e: ReservationError = StoreError::Unavailable("offline".into()).into();
        assert_eq!(e.kind(), "StoreUnavailable");
        assert!(e.is_retryable());
    }

    #[test]
    fn undecodable_documents_are_final() {
        let e: ReservationError = SchemaError::Undecodable {
            id: "r1".into(),
            reason: "expected a map".into(),
        }
        .into();
        assert_eq!(e.kind(), "Validation");
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("r1"));
    }

    #[test]
    fn business_errors_are_final() {
        let e = ReservationError::AmountExceedsPending {
            amount: 1500,
            pending: 1000,
        };
        assert!(!e.is_retryable());
        assert_eq!(e.to_string(), "amount 1500 exceeds pending amount 1000");
    }

    #[test]
    fn negative_input_amounts_are_rejected() {
        assert_eq!(amount_from_input("amount", 10), Ok(10));
        assert!(matches!(
            amount_from_input("amount", -1),
            Err(ReservationError::InvalidAmount(_))
        ));
    }
}
