//! Storage abstraction for Estate Harness.
//!
//! The [`ListingStore`] trait covers the listing operations the upsert engine
//! and the lookup commands need. The SQLite backend lives in the
//! `estate-harness` crate; [`memory::InMemoryStore`] backs tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{ListingRecord, Portal};

/// A persisted listing with its storage-side columns.
#[derive(Debug, Clone, Serialize)]
pub struct StoredListing {
    pub id: i64,
    #[serde(flatten)]
    pub listing: ListingRecord,
    pub views: i64,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds, bumped on every update.
    pub updated_at: i64,
}

/// Abstract listing storage.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_listing_id`](ListingStore::find_listing_id) | Resolve a natural key to a row id |
/// | [`insert_listing`](ListingStore::insert_listing) | Create a row, returning its id |
/// | [`update_listing`](ListingStore::update_listing) | Overwrite canonical fields of a row |
/// | [`get_listing`](ListingStore::get_listing) | Fetch a full row by natural key |
/// | [`count_listings`](ListingStore::count_listings) | Total rows |
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find_listing_id(&self, code: &str, portal: Portal) -> Result<Option<i64>>;

    async fn insert_listing(&self, record: &ListingRecord) -> Result<i64>;

    /// Overwrite every canonical field of row `id` and bump `updated_at`.
    ///
    /// `views` and `created_at` are preserved. Fails if the row is gone.
    async fn update_listing(&self, id: i64, record: &ListingRecord) -> Result<()>;

    async fn get_listing(&self, code: &str, portal: Portal) -> Result<Option<StoredListing>>;

    async fn count_listings(&self) -> Result<i64>;
}

/// Format Unix seconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_ts_iso(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
