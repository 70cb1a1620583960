//! Listing lookup by natural key.
//!
//! Backs the `estate get <portal> <code>` command.

use anyhow::Result;

use estate_harness_core::store::{format_ts_iso, ListingStore, StoredListing};
use estate_harness_core::Portal;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn get_listing(config: &Config, portal: Portal, code: &str) -> Result<StoredListing> {
    let pool = db::connect(config).await?;
    let listing = SqliteStore::new(pool.clone()).get_listing(code, portal).await;
    pool.close().await;

    listing?.ok_or_else(|| anyhow::anyhow!("listing not found: {} {}", portal, code))
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// CLI entry point: prints the listing to stdout.
pub async fn run_get(config: &Config, portal: Portal, code: &str) -> Result<()> {
    let stored = get_listing(config, portal, code).await?;
    let l = &stored.listing;

    println!("--- Listing ---");
    println!("id:             {}", stored.id);
    println!("code:           {}", l.code);
    println!("portal:         {}", l.portal);
    println!("title:          {}", l.title);
    println!("type:           {}", l.property_type);
    println!("price:          {:.2}", l.price);
    println!("city:           {}", l.city);
    println!("neighborhood:   {}", l.neighborhood);
    println!("address:        {}", l.address);
    println!("area:           {}", show(l.total_area));
    println!("bedrooms:       {}", show(l.bedrooms));
    println!("bathrooms:      {}", show(l.bathrooms));
    println!("parking:        {}", show(l.parking_spaces));
    println!("owner_id:       {}", show(l.owner_id));
    println!("main_photo:     {}", l.main_photo);
    println!("photos:         {}", l.extra_photos.len());
    println!("views:          {}", stored.views);
    println!("created_at:     {}", format_ts_iso(stored.created_at));
    println!("updated_at:     {}", format_ts_iso(stored.updated_at));
    println!();

    if !l.description.is_empty() {
        println!("--- Description ---");
        println!("{}", l.description);
        println!();
    }

    Ok(())
}
