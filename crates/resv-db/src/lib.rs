//! resv-db
//!
//! PostgreSQL backend for [`resv_store::DocumentStore`].
//!
//! Documents live in one table, `documents(collection, id, body jsonb)`.
//! - `commit` runs a single transaction: preconditions are checked with
//!   `SELECT … FOR UPDATE`, merges use `jsonb ||` (shallow, top-level).
//! - A row trigger issues `pg_notify('resv_documents', collection)`; `watch`
//!   forwards those notifications from a `PgListener` task onto a broadcast
//!   channel.
//!
//! Uses sqlx `query()` + binds only (no compile-time checked macros), so the
//! crate builds without a database.

use anyhow::{Context, Result};
use resv_schemas::lenient;
use resv_store::{
    ChangeFeed, ChangeNotice, Document, DocumentStore, Query, StoreError, WriteBatch, WriteMode,
    WriteOp,
};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub const ENV_DB_URL: &str = "RESV_DATABASE_URL";

/// `pg_notify` channel written by the `documents_changed` trigger.
pub const NOTIFY_CHANNEL: &str = "resv_documents";

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Connect to Postgres using the URL held in env var `url_env`.
pub async fn connect_from_env(url_env: &str) -> Result<PgPool> {
    let url = std::env::var(url_env).with_context(|| format!("missing env var {url_env}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_documents_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='documents'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_documents_table: exists,
    })
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

pub struct PgStore {
    pool: PgPool,
    bus: broadcast::Sender<ChangeNotice>,
    listener_started: Mutex<bool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_channel_capacity(pool, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(pool: PgPool, capacity: usize) -> Self {
        let (bus, _rx) = broadcast::channel(capacity.max(1));
        Self {
            pool,
            bus,
            listener_started: Mutex::new(false),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn check_precondition(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: &str,
        expected: Option<u64>,
    ) -> Result<(), StoreError> {
        // `for update` locks nothing when the row is absent. The advisory
        // lock serialises every transaction guarding the same (collection, id)
        // until commit, so an "absent" check cannot pass twice.
        sqlx::query("select pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(collection)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(unavailable)?;

        let row = sqlx::query(
            "select body from documents where collection = $1 and id = $2 for update",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(unavailable)?;

        let current = match row {
            Some(row) => {
                let body: Value = row.try_get("body").map_err(unavailable)?;
                Some(
                    body.get(resv_schemas::field::REVISION)
                        .map(lenient::amount_from_value)
                        .unwrap_or(0),
                )
            }
            None => None,
        };

        let holds = match (expected, current) {
            (None, None) => true,
            (Some(e), Some(c)) => e == c,
            _ => false,
        };
        if holds {
            Ok(())
        } else {
            Err(StoreError::PreconditionFailed {
                collection: collection.to_string(),
                id: id.to_string(),
            })
        }
    }

    async fn apply_op(tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Put {
                collection,
                id,
                fields,
                mode: WriteMode::Insert,
            } => {
                let done = sqlx::query(
                    r#"
                    insert into documents (collection, id, body)
                    values ($1, $2, $3)
                    on conflict (collection, id) do nothing
                    "#,
                )
                .bind(&collection)
                .bind(&id)
                .bind(Value::Object(fields))
                .execute(&mut **tx)
                .await
                .map_err(unavailable)?;
                if done.rows_affected() == 0 {
                    return Err(StoreError::AlreadyExists { collection, id });
                }
            }
            WriteOp::Put {
                collection,
                id,
                fields,
                mode: WriteMode::Merge,
            } => {
                sqlx::query(
                    r#"
                    insert into documents (collection, id, body)
                    values ($1, $2, $3)
                    on conflict (collection, id)
                    do update set body = documents.body || excluded.body,
                                  updated_at_utc = now()
                    "#,
                )
                .bind(&collection)
                .bind(&id)
                .bind(Value::Object(fields))
                .execute(&mut **tx)
                .await
                .map_err(unavailable)?;
            }
            WriteOp::Delete { collection, id } => {
                sqlx::query("delete from documents where collection = $1 and id = $2")
                    .bind(&collection)
                    .bind(&id)
                    .execute(&mut **tx)
                    .await
                    .map_err(unavailable)?;
            }
        }
        Ok(())
    }

    async fn start_listener(&self) -> Result<(), StoreError> {
        let mut started = self.listener_started.lock().await;
        if *started {
            return Ok(());
        }

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(unavailable)?;
        listener.listen(NOTIFY_CHANNEL).await.map_err(unavailable)?;

        let bus = self.bus.clone();
        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let _ = bus.send(ChangeNotice {
                            collection: notification.payload().to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "document change listener error; retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!(channel = NOTIFY_CHANNEL, "document change listener started");
        *started = true;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("select body from documents where collection = $1 and id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => {
                let body: Value = row.try_get("body").map_err(unavailable)?;
                Ok(Some(Document::new(id, into_fields(body))))
            }
            None => Ok(None),
        }
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let mut sql = String::from("select id, body from documents where collection = $1");
        for i in 0..query.filters.len() {
            let field_param = 2 + i * 2;
            sql.push_str(&format!(
                " and (body -> ${}::text) = ${}::jsonb",
                field_param,
                field_param + 1
            ));
        }

        let mut q = sqlx::query(&sql).bind(collection);
        for f in &query.filters {
            q = q.bind(f.field.as_str()).bind(f.value.clone());
        }

        let rows = q.fetch_all(&self.pool).await.map_err(unavailable)?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(unavailable)?;
            let body: Value = row.try_get("body").map_err(unavailable)?;
            docs.push(Document::new(id, into_fields(body)));
        }

        // Ordering is shared with every other backend.
        query.apply(&mut docs);
        Ok(docs)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        for pre in &batch.preconditions {
            Self::check_precondition(&mut tx, &pre.collection, &pre.id, pre.expected_revision)
                .await?;
        }
        for op in batch.ops {
            Self::apply_op(&mut tx, op).await?;
        }

        tx.commit().await.map_err(unavailable)
    }

    async fn watch(&self) -> Result<ChangeFeed, StoreError> {
        self.start_listener().await?;
        Ok(self.bus.subscribe())
    }
}

fn into_fields(body: Value) -> resv_schemas::Fields {
    match body {
        Value::Object(map) => map,
        _ => resv_schemas::Fields::new(),
    }
}
