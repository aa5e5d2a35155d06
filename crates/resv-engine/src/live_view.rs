//! Live view over the reservations collection.
//!
//! Each change notice for `reservations` triggers a full re-query; the
//! subscriber receives the complete, sorted snapshot (never a delta). A
//! lagged receiver also re-queries, since a snapshot subsumes every notice
//! it missed.
//!
//! The last snapshot is kept in a cache owned by the [`LiveView`]. It is
//! dropped when the last subscription ends, so a later `subscribe` starts
//! from a fresh read rather than stale data.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use resv_schemas::{Reservation, RESERVATIONS};
use resv_store::{DocumentStore, Query};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::admission::occupied_interval;
use crate::service::decode_reservations;
use crate::ReservationError;

pub type Snapshot = Arc<Vec<Reservation>>;

/// Display start offset: bookings by their window, distributions first.
fn start_key(r: &Reservation) -> Option<u32> {
    if r.is_booking() {
        Some(occupied_interval(r).0)
    } else {
        None
    }
}

/// `(date desc, start asc, id asc)`: a strict total order. Records without
/// a readable date sort after every dated record.
pub fn display_order(a: &Reservation, b: &Reservation) -> CmpOrdering {
    b.resource_date
        .cmp(&a.resource_date)
        .then_with(|| start_key(a).cmp(&start_key(b)))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_for_display(reservations: &mut [Reservation]) {
    reservations.sort_by(display_order);
}

#[derive(Default)]
struct SnapshotCache {
    latest: RwLock<Option<Snapshot>>,
    subscribers: AtomicUsize,
}

impl SnapshotCache {
    fn get(&self) -> Option<Snapshot> {
        self.latest.read().ok().and_then(|s| s.clone())
    }

    /// Store `snapshot` only if `live()` still holds under the write lock.
    /// `invalidate` takes the same lock, so a snapshot from a subscription
    /// that has just ended cannot refill an invalidated cache.
    fn set_if(&self, snapshot: Snapshot, live: impl Fn() -> bool) -> bool {
        match self.latest.write() {
            Ok(mut latest) if live() => {
                *latest = Some(snapshot);
                true
            }
            _ => false,
        }
    }

    fn invalidate(&self) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = None;
        }
    }
}

#[derive(Clone)]
pub struct LiveView {
    store: Arc<dyn DocumentStore>,
    cache: Arc<SnapshotCache>,
}

impl LiveView {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: Arc::new(SnapshotCache::default()),
        }
    }

    /// Last snapshot delivered to a live subscription, if any.
    pub fn cached(&self) -> Option<Snapshot> {
        self.cache.get()
    }

    /// One-shot sorted read. Refreshes the cache only while subscribed.
    pub async fn snapshot(&self) -> Result<Snapshot, ReservationError> {
        let snapshot = load_snapshot(self.store.as_ref()).await?;
        let cache = &self.cache;
        cache.set_if(snapshot.clone(), || {
            cache.subscribers.load(Ordering::SeqCst) > 0
        });
        Ok(snapshot)
    }

    /// Deliver a fresh snapshot now and after every change to the
    /// reservations collection, until the subscription is dropped or
    /// [`Subscription::unsubscribe`] is called.
    ///
    /// Query failures go to `on_error`; delivery continues with the next
    /// change.
    pub async fn subscribe<C, E>(
        &self,
        on_change: C,
        on_error: E,
    ) -> Result<Subscription, ReservationError>
    where
        C: Fn(Snapshot) + Send + Sync + 'static,
        E: Fn(ReservationError) + Send + Sync + 'static,
    {
        // Subscribe before the first read so no change slips between them.
        let mut feed = self.store.watch().await?;

        let active = Arc::new(AtomicBool::new(true));
        self.cache.subscribers.fetch_add(1, Ordering::SeqCst);

        let store = self.store.clone();
        let cache = self.cache.clone();
        let flag = active.clone();
        let task = tokio::spawn(async move {
            let deliver = |result: Result<Snapshot, ReservationError>| match result {
                Ok(snapshot) => {
                    if cache.set_if(snapshot.clone(), || flag.load(Ordering::SeqCst)) {
                        on_change(snapshot);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "live view refresh failed");
                    if flag.load(Ordering::SeqCst) {
                        on_error(e);
                    }
                }
            };

            deliver(load_snapshot(store.as_ref()).await);
            loop {
                match feed.recv().await {
                    Ok(notice) if notice.collection == RESERVATIONS => {
                        deliver(load_snapshot(store.as_ref()).await);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "live view lagged; re-querying");
                        deliver(load_snapshot(store.as_ref()).await);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription {
            active,
            task: Mutex::new(Some(task)),
            cache: self.cache.clone(),
        })
    }
}

async fn load_snapshot(store: &dyn DocumentStore) -> Result<Snapshot, ReservationError> {
    let docs = store.query(RESERVATIONS, &Query::new()).await?;
    let mut reservations = decode_reservations(docs);
    sort_for_display(&mut reservations);
    Ok(Arc::new(reservations))
}

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    active: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    cache: Arc<SnapshotCache>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop delivery and release the feed. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
        }
        if self.cache.subscribers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.cache.invalidate();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn r(id: &str, date: &str, start: Option<u32>, kind: &str) -> Reservation {
        let mut doc = json!({"resourceDate": date, "kind": kind});
        if let Some(start) = start {
            doc["startMinutes"] = json!(start);
            doc["endMinutes"] = json!(start + 60);
        }
        Reservation::from_fields(id, doc.as_object().unwrap()).unwrap()
    }

    #[test]
    fn display_order_is_date_desc_start_asc_id_asc() {
        let mut list = vec![
            r("c", "2025-12-10", Some(600), "booking"),
            r("a", "2025-12-11", Some(900), "booking"),
            r("b", "2025-12-10", Some(600), "booking"),
            r("d", "2025-12-10", Some(300), "booking"),
            r("e", "2025-12-10", None, "distribution"),
        ];
        sort_for_display(&mut list);
        let ids: Vec<&str> = list.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "e", "d", "b", "c"]);
    }

    #[test]
    fn undated_records_sort_last() {
        let undated =
            Reservation::from_fields("0", json!({"eventDate": ""}).as_object().unwrap()).unwrap();
        let mut list = vec![undated, r("b", "2020-01-01", Some(600), "booking")];
        sort_for_display(&mut list);
        let ids: Vec<&str> = list.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "0"]);
    }

    #[test]
    fn ended_subscription_cannot_refill_cache() {
        let cache = SnapshotCache::default();
        let active = AtomicBool::new(true);
        assert!(cache.set_if(Arc::new(Vec::new()), || active.load(Ordering::SeqCst)));
        assert!(cache.get().is_some());

        // unsubscribe: flag first, then invalidate.
        active.store(false, Ordering::SeqCst);
        cache.invalidate();
        let late = Arc::new(vec![r("a", "2025-12-10", Some(600), "booking")]);
        assert!(!cache.set_if(late, || active.load(Ordering::SeqCst)));
        assert!(cache.get().is_none());
    }

    #[test]
    fn legacy_labels_order_like_offsets() {
        let legacy = Reservation::from_fields(
            "z",
            json!({"resourceDate": "2025-12-10", "startTime": "09:00 AM", "endTime": "10:00 AM"})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        let mut list = vec![r("a", "2025-12-10", Some(600), "booking"), legacy];
        sort_for_display(&mut list);
        assert_eq!(list[0].id, "z");
    }
}
