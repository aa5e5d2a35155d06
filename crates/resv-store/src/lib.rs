//! resv-store
//!
//! Document-store boundary consumed by the reservation engine.
//!
//! The engine never talks to a database directly; it holds an
//! `Arc<dyn DocumentStore>`. Backends:
//! - [`MemoryStore`] (this crate): in-process, used by tests and the
//!   `memory` backend of the daemon.
//! - `resv_db::PgStore`: PostgreSQL, jsonb documents.
//!
//! Every method is a suspension point and independently fallible. No method
//! retries internally.

mod memory;
mod types;

pub use memory::MemoryStore;
pub use types::{
    compare_values, ChangeNotice, Direction, Document, Filter, OrderBy, Precondition, Query,
    StoreError, WriteBatch, WriteMode, WriteOp,
};

use resv_schemas::Fields;
use tokio::sync::broadcast;

/// Receiver half of a collection change feed.
pub type ChangeFeed = broadcast::Receiver<ChangeNotice>;

/// Document store contract.
///
/// Object-safe so callers can hold `Arc<dyn DocumentStore>`; `Send + Sync`
/// so it can cross task boundaries.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs (`"memory"`, `"postgres"`).
    fn backend(&self) -> &'static str;

    /// Store-assigned document id.
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Documents matching `query.filters`, ordered by `query.order` then id.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Check every precondition, then apply every op, atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Change notices for all collections; filter on `collection`.
    async fn watch(&self) -> Result<ChangeFeed, StoreError>;

    async fn put(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().put(collection, id, fields, mode))
            .await
    }

    /// Idempotent: deleting an absent document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.commit(WriteBatch::new().delete(collection, id)).await
    }
}
