//! Client linking: attach each listing to the client account that owns it.
//!
//! A listing's source code doubles as a client reference. The lookup is an
//! exact, case-sensitive match against client accounts only; no match leaves
//! the listing unowned.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ImportError;
use crate::models::ListingRecord;

/// Lookup of client accounts by their reference code.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Id of the client account whose reference equals `reference`.
    ///
    /// When several accounts share a reference, the lowest id wins.
    async fn find_client_by_reference(&self, reference: &str) -> Result<Option<i64>>;
}

/// Set `owner_id` on every record, in place.
///
/// Returns how many records were linked. Records with a blank code are left
/// alone. A directory failure aborts the whole run.
pub async fn link_clients(
    records: &mut [ListingRecord],
    directory: &dyn AccountDirectory,
) -> Result<usize, ImportError> {
    let mut linked = 0;
    for record in records.iter_mut() {
        if record.code.trim().is_empty() {
            continue;
        }
        record.owner_id = directory
            .find_client_by_reference(&record.code)
            .await
            .map_err(|e| ImportError::Storage(format!("{:#}", e)))?;
        if record.owner_id.is_some() {
            linked += 1;
        }
    }
    tracing::debug!(linked, total = records.len(), "client linking done");
    Ok(linked)
}
