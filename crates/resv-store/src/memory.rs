//! In-process document store.
//!
//! One mutex guards every collection, so a [`WriteBatch`] is atomic by
//! construction. Change notices go out after the lock is released.
//!
//! Fault injection (`set_offline`, `fail_writes_to`) lets tests exercise the
//! `Unavailable` paths without a network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use resv_schemas::Fields;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    ChangeFeed, ChangeNotice, Document, DocumentStore, Query, StoreError, WriteBatch, WriteMode,
    WriteOp,
};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type Collection = BTreeMap<String, Fields>;

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    failing_writes: HashSet<String>,
    offline: bool,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    bus: broadcast::Sender<ChangeNotice>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (bus, _rx) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner::default()),
            bus,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Every operation fails with `Unavailable` while offline.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.offline = offline;
        }
    }

    /// Batches touching `collection` fail with `Unavailable`.
    pub fn fail_writes_to(&self, collection: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_writes.insert(collection.to_string());
        }
    }

    pub fn restore_writes_to(&self, collection: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_writes.remove(collection);
        }
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.collections.get(collection).map_or(0, |c| c.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn ensure_online(inner: &Inner) -> Result<(), StoreError> {
    if inner.offline {
        Err(StoreError::Unavailable("memory store offline".to_string()))
    } else {
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.lock()?;
        ensure_online(&inner)?;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let inner = self.lock()?;
        ensure_online(&inner)?;
        let mut docs: Vec<Document> = inner
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        drop(inner);
        query.apply(&mut docs);
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let touched = batch.collections();
        {
            let mut inner = self.lock()?;
            ensure_online(&inner)?;

            if let Some(c) = touched.iter().find(|c| inner.failing_writes.contains(*c)) {
                return Err(StoreError::Unavailable(format!(
                    "writes to {c} are failing"
                )));
            }

            for pre in &batch.preconditions {
                let current = inner
                    .collections
                    .get(&pre.collection)
                    .and_then(|c| c.get(&pre.id))
                    .map(|fields| Document::new(pre.id.clone(), fields.clone()).revision());
                let holds = match (pre.expected_revision, current) {
                    (None, None) => true,
                    (Some(expected), Some(actual)) => expected == actual,
                    _ => false,
                };
                if !holds {
                    debug!(collection = %pre.collection, id = %pre.id, "precondition failed");
                    return Err(StoreError::PreconditionFailed {
                        collection: pre.collection.clone(),
                        id: pre.id.clone(),
                    });
                }
            }

            // Stage only the documents the batch touches (`None`: deleted), so
            // a failing op leaves nothing behind and untouched documents are
            // never copied.
            let mut staged: BTreeMap<(String, String), Option<Fields>> = BTreeMap::new();
            for op in batch.ops {
                match op {
                    WriteOp::Put {
                        collection,
                        id,
                        fields,
                        mode,
                    } => {
                        let key = (collection, id);
                        let current = match staged.get(&key) {
                            Some(doc) => doc.clone(),
                            None => inner
                                .collections
                                .get(&key.0)
                                .and_then(|c| c.get(&key.1))
                                .cloned(),
                        };
                        let next = match (mode, current) {
                            (WriteMode::Insert, Some(_)) => {
                                let (collection, id) = key;
                                return Err(StoreError::AlreadyExists { collection, id });
                            }
                            (WriteMode::Merge, Some(mut existing)) => {
                                existing.extend(fields);
                                existing
                            }
                            (_, None) => fields,
                        };
                        staged.insert(key, Some(next));
                    }
                    WriteOp::Delete { collection, id } => {
                        staged.insert((collection, id), None);
                    }
                }
            }

            for ((collection, id), doc) in staged {
                let coll = inner.collections.entry(collection).or_default();
                match doc {
                    Some(fields) => {
                        coll.insert(id, fields);
                    }
                    None => {
                        coll.remove(&id);
                    }
                }
            }
        }

        for collection in touched {
            // No receivers is fine.
            let _ = self.bus.send(ChangeNotice { collection });
        }
        Ok(())
    }

    async fn watch(&self) -> Result<ChangeFeed, StoreError> {
        let inner = self.lock()?;
        ensure_online(&inner)?;
        Ok(self.bus.subscribe())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
