//! SQLite implementation of the core storage traits.
//!
//! One [`SqliteStore`] wraps the shared pool and serves as both the
//! [`ListingStore`] for the upsert engine and the [`AccountDirectory`] for
//! client linking. Each call is a single statement, so SQLite's
//! per-statement atomicity is the only locking involved.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use estate_harness_core::link::AccountDirectory;
use estate_harness_core::store::{ListingStore, StoredListing};
use estate_harness_core::{ImportReport, ListingRecord, Portal};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one `import_logs` row for a completed feed run.
    pub async fn record_import_log(
        &self,
        portal: Portal,
        url: &str,
        report: &ImportReport,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO import_logs (portal, url, total, inserted, updated, errors, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(portal.as_str())
        .bind(url)
        .bind(report.total as i64)
        .bind(report.inserted as i64)
        .bind(report.updated as i64)
        .bind(report.error_count() as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to write import log")?;

        Ok(result.last_insert_rowid())
    }
}

const LISTING_COLUMNS: &str = "id, source_code, source_portal, title, description, price, \
    property_type, city, neighborhood, address, total_area, bedrooms, bathrooms, \
    parking_spaces, main_photo, extra_photos_json, raw_json, owner_id, views, created_at, updated_at";

fn row_to_listing(row: &SqliteRow) -> Result<StoredListing> {
    let portal: String = row.get("source_portal");
    let extra_photos_json: String = row.get("extra_photos_json");
    let raw_json: String = row.get("raw_json");

    Ok(StoredListing {
        id: row.get("id"),
        listing: ListingRecord {
            code: row.get("source_code"),
            portal: portal.parse()?,
            title: row.get("title"),
            description: row.get("description"),
            price: row.get("price"),
            property_type: row.get("property_type"),
            city: row.get("city"),
            neighborhood: row.get("neighborhood"),
            address: row.get("address"),
            total_area: row.get("total_area"),
            bedrooms: row.get("bedrooms"),
            bathrooms: row.get("bathrooms"),
            parking_spaces: row.get("parking_spaces"),
            main_photo: row.get("main_photo"),
            extra_photos: serde_json::from_str(&extra_photos_json).unwrap_or_default(),
            raw: serde_json::from_str(&raw_json).unwrap_or(serde_json::Value::Null),
            owner_id: row.get("owner_id"),
        },
        views: row.get("views"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn find_listing_id(&self, code: &str, portal: Portal) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM listings WHERE source_code = ? AND source_portal = ?",
        )
        .bind(code)
        .bind(portal.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn insert_listing(&self, record: &ListingRecord) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO listings (source_code, source_portal, title, description, price,
                property_type, city, neighborhood, address, total_area, bedrooms, bathrooms,
                parking_spaces, main_photo, extra_photos_json, raw_json, owner_id, views,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&record.code)
        .bind(record.portal.as_str())
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.price)
        .bind(&record.property_type)
        .bind(&record.city)
        .bind(&record.neighborhood)
        .bind(&record.address)
        .bind(record.total_area)
        .bind(record.bedrooms)
        .bind(record.bathrooms)
        .bind(record.parking_spaces)
        .bind(&record.main_photo)
        .bind(serde_json::to_string(&record.extra_photos)?)
        .bind(serde_json::to_string(&record.raw)?)
        .bind(record.owner_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_listing(&self, id: i64, record: &ListingRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE listings SET
                title = ?, description = ?, price = ?, property_type = ?, city = ?,
                neighborhood = ?, address = ?, total_area = ?, bedrooms = ?, bathrooms = ?,
                parking_spaces = ?, main_photo = ?, extra_photos_json = ?, raw_json = ?,
                owner_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.price)
        .bind(&record.property_type)
        .bind(&record.city)
        .bind(&record.neighborhood)
        .bind(&record.address)
        .bind(record.total_area)
        .bind(record.bedrooms)
        .bind(record.bathrooms)
        .bind(record.parking_spaces)
        .bind(&record.main_photo)
        .bind(serde_json::to_string(&record.extra_photos)?)
        .bind(serde_json::to_string(&record.raw)?)
        .bind(record.owner_id)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("listing {} no longer exists", id);
        }
        Ok(())
    }

    async fn get_listing(&self, code: &str, portal: Portal) -> Result<Option<StoredListing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE source_code = ? AND source_portal = ?",
            LISTING_COLUMNS
        ))
        .bind(code)
        .bind(portal.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_listing).transpose()
    }

    async fn count_listings(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AccountDirectory for SqliteStore {
    async fn find_client_by_reference(&self, reference: &str) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM users WHERE client_reference = ? AND role = 'client' ORDER BY id LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }
}
