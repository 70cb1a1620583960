//! Upsert engine: write mapped listings by natural key.
//!
//! Records are processed one at a time, in order. A record that already
//! exists under `(code, portal)` is updated in place; anything else is
//! inserted. One record failing never stops the others: the failure is
//! logged, added to the report, and the loop moves on.

use anyhow::{bail, Result};

use crate::models::{ImportReport, ListingRecord, RecordFailure};
use crate::store::ListingStore;

enum Outcome {
    Inserted,
    Updated,
}

async fn upsert_one(store: &dyn ListingStore, record: &ListingRecord) -> Result<Outcome> {
    if record.code.trim().is_empty() {
        bail!("listing has no source code");
    }
    match store.find_listing_id(&record.code, record.portal).await? {
        Some(id) => {
            store.update_listing(id, record).await?;
            Ok(Outcome::Updated)
        }
        None => {
            store.insert_listing(record).await?;
            Ok(Outcome::Inserted)
        }
    }
}

/// Insert or update every record, collecting per-record failures.
pub async fn upsert_listings(store: &dyn ListingStore, records: &[ListingRecord]) -> ImportReport {
    let mut report = ImportReport::new(records.len());

    for record in records {
        match upsert_one(store, record).await {
            Ok(Outcome::Inserted) => report.inserted += 1,
            Ok(Outcome::Updated) => report.updated += 1,
            Err(e) => {
                tracing::warn!(
                    portal = %record.portal,
                    code = %record.code,
                    error = %format!("{:#}", e),
                    "listing upsert failed"
                );
                report.failures.push(RecordFailure {
                    code: record.code.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    report
}
