use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use resv_catalog::CatalogSync;
use resv_schemas::{field, LedgerEntry, Reservation, LEDGER_ENTRIES, RESERVATIONS};
use resv_store::{Document, DocumentStore, Query, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::locks::KeyedLocks;
use crate::live_view::LiveView;
use crate::ReservationError;

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Stored form of `resourceDate`.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Engine tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Optimistic commits retried on a moved revision before giving up with
    /// `StoreUnavailable`.
    pub max_commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

/// Outcome of one optimistic commit attempt.
pub(crate) enum Attempt<T> {
    Committed(T),
    Conflict,
}

/// Fold a commit result into an [`Attempt`]: conflicts retry, outages fail.
pub(crate) fn settle<T>(
    result: Result<(), StoreError>,
    value: T,
) -> Result<Attempt<T>, ReservationError> {
    match result {
        Ok(()) => Ok(Attempt::Committed(value)),
        Err(e) if e.is_conflict() => {
            debug!(error = %e, "optimistic commit lost a race");
            Ok(Attempt::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}

/// Single entry point for reservation writes and reads.
///
/// Cheap to clone; clones share locks, store and catalog.
#[derive(Clone)]
pub struct ReservationService {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: EngineConfig,
    pub(crate) catalog: CatalogSync,
    /// Keyed by resource date (`YYYY-MM-DD`).
    pub(crate) partitions: Arc<KeyedLocks>,
    /// Keyed by reservation id.
    pub(crate) aggregates: Arc<KeyedLocks>,
}

impl ReservationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        Self {
            catalog: CatalogSync::new(store.clone()),
            store,
            config,
            partitions: Arc::new(KeyedLocks::new()),
            aggregates: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogSync {
        &self.catalog
    }

    /// A live view over this service's store.
    pub fn live_view(&self) -> LiveView {
        LiveView::new(self.store.clone())
    }

    /// Run `attempt` until it commits, a business error surfaces, or the
    /// attempt budget is spent.
    pub(crate) async fn retry_on_conflict<T, F, Fut>(
        &self,
        op: &'static str,
        mut attempt: F,
    ) -> Result<T, ReservationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, ReservationError>>,
    {
        let max = self.config.max_commit_attempts.max(1);
        for n in 1..=max {
            match attempt().await? {
                Attempt::Committed(value) => return Ok(value),
                Attempt::Conflict => debug!(op, attempt = n, "retrying after conflict"),
            }
        }
        warn!(op, attempts = max, "gave up after repeated write conflicts");
        Err(ReservationError::StoreUnavailable(format!(
            "{op}: write conflicted {max} times; retry later"
        )))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Current reservation document and its decoded record.
    pub(crate) async fn load(&self, id: &str) -> Result<(Document, Reservation), ReservationError> {
        let doc = self
            .store
            .get(RESERVATIONS, id)
            .await?
            .ok_or_else(|| ReservationError::not_found(id))?;
        let reservation = Reservation::from_fields(&doc.id, &doc.fields)?;
        Ok((doc, reservation))
    }

    pub async fn get_reservation(&self, id: &str) -> Result<Reservation, ReservationError> {
        Ok(self.load(id).await?.1)
    }

    /// Every ledger entry pointing at `reservation_id`, including entries
    /// keyed by a legacy field name.
    pub async fn ledger_entries_for(
        &self,
        reservation_id: &str,
    ) -> Result<Vec<LedgerEntry>, ReservationError> {
        let mut docs: Vec<Document> = Vec::new();
        for name in field::RESERVATION_ID_ALIASES {
            let q = Query::new().filter_eq(*name, reservation_id);
            for doc in self.store.query(LEDGER_ENTRIES, &q).await? {
                if !docs.iter().any(|d| d.id == doc.id) {
                    docs.push(doc);
                }
            }
        }
        Ok(decode_ledger(docs)
            .into_iter()
            .filter(|e| e.reservation_id == reservation_id)
            .collect())
    }

    /// Reservations whose (canonical) date is `date`.
    pub async fn reservations_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let key = date.format(DATE_FORMAT).to_string();
        let mut docs: Vec<Document> = Vec::new();
        for name in field::RESOURCE_DATE_ALIASES {
            let q = Query::new().filter_eq(*name, key.as_str());
            for doc in self.store.query(RESERVATIONS, &q).await? {
                if !docs.iter().any(|d| d.id == doc.id) {
                    docs.push(doc);
                }
            }
        }
        // A rescheduled legacy record keeps its stale `eventDate`.
        Ok(decode_reservations(docs)
            .into_iter()
            .filter(|r| r.resource_date == Some(date))
            .collect())
    }

    /// All decodable reservations, unordered.
    pub async fn list_reservations(&self) -> Result<Vec<Reservation>, ReservationError> {
        Ok(decode_reservations(
            self.store.query(RESERVATIONS, &Query::new()).await?,
        ))
    }

    pub async fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>, ReservationError> {
        Ok(decode_ledger(
            self.store.query(LEDGER_ENTRIES, &Query::new()).await?,
        ))
    }
}

pub(crate) fn decode_reservations(docs: Vec<Document>) -> Vec<Reservation> {
    docs.iter()
        .filter_map(|d| match Reservation::from_fields(&d.id, &d.fields) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(error = %e, "skipping undecodable reservation");
                None
            }
        })
        .collect()
}

pub(crate) fn decode_ledger(docs: Vec<Document>) -> Vec<LedgerEntry> {
    docs.iter()
        .filter_map(|d| match LedgerEntry::from_fields(&d.id, &d.fields) {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "skipping undecodable ledger entry");
                None
            }
        })
        .collect()
}
