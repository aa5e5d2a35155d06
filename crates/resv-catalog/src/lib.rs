//! resv-catalog
//!
//! Deduplicated item-name catalog for distribution records.
//!
//! Names are keyed by a slug: accents stripped, lowercased, non-alphanumeric
//! runs collapsed to `-`. Names with nothing Latin-mappable (e.g. Devanagari)
//! fall back to `item-<base36 hash>`, so every name gets a stable non-empty key.
//!
//! Catalog writes are a non-critical side effect: [`CatalogSync::sync_names`]
//! logs failures and never returns them.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use resv_schemas::{CatalogEntry, CATALOG_ENTRIES};
use resv_store::{Direction, DocumentStore, Query, StoreError, WriteMode};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

/// `hash = (hash * 31 + unit) mod 2^32` over UTF-16 code units.
///
/// UTF-16 units keep keys identical to the ones already stored by earlier
/// clients; for text in the Basic Multilingual Plane a unit is the code point.
pub fn polynomial_hash(s: &str) -> u32 {
    s.encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

/// Lowercase base-36 rendering (`0-9a-z`).
pub fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Deterministic, total: the same name always yields the same non-empty slug.
pub fn normalize_to_slug(name: &str) -> String {
    let normalized = name.trim().to_lowercase();

    let mut slug = String::with_capacity(normalized.len());
    let mut separator_pending = false;
    for c in normalized
        .nfkd()
        .filter(|c| !('\u{300}'..='\u{36f}').contains(c))
    {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if separator_pending && !slug.is_empty() {
                slug.push('-');
            }
            separator_pending = false;
            slug.push(c);
        } else {
            separator_pending = true;
        }
    }

    if slug.is_empty() {
        format!("item-{}", to_base36(polynomial_hash(&normalized)))
    } else {
        slug
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Outcome of a best-effort sync pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub upserted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct CatalogSync {
    store: Arc<dyn DocumentStore>,
}

impl CatalogSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Merge-write `{name, updatedAt}` under the name's slug.
    ///
    /// Idempotent: repeating it only refreshes `updatedAt`. Blank names are
    /// skipped (`Ok(None)`).
    pub async fn upsert(&self, name: &str) -> Result<Option<CatalogEntry>, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let entry = CatalogEntry {
            slug: normalize_to_slug(name),
            name: name.to_string(),
            updated_at: Some(Utc::now()),
        };
        self.store
            .put(CATALOG_ENTRIES, &entry.slug, entry.to_fields(), WriteMode::Merge)
            .await?;
        Ok(Some(entry))
    }

    /// Upsert every distinct name; failures are logged and swallowed.
    pub async fn sync_names<I, S>(&self, names: I) -> SyncOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !distinct.iter().any(|n| n == name) {
                distinct.push(name.to_string());
            }
        }

        let results = join_all(distinct.iter().map(|n| self.upsert(n))).await;

        let mut outcome = SyncOutcome::default();
        for (name, result) in distinct.into_iter().zip(results) {
            match result {
                Ok(Some(entry)) => {
                    debug!(slug = %entry.slug, "catalog entry refreshed");
                    outcome.upserted.push(entry.slug);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(item = %name, error = %e, "item catalog sync skipped");
                    outcome.failed.push(name);
                }
            }
        }
        outcome
    }

    /// All catalog entries, by name.
    pub async fn list(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        let docs = self
            .store
            .query(CATALOG_ENTRIES, &Query::new().order_by("name", Direction::Asc))
            .await?;
        Ok(docs
            .iter()
            .filter_map(|d| CatalogEntry::from_fields(&d.id, &d.fields).ok())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
