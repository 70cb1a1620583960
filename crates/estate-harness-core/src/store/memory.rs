//! In-memory [`ListingStore`] and [`AccountDirectory`] for tests.
//!
//! Rows live in `Vec`s behind `std::sync::RwLock`; ids are assigned
//! sequentially from 1, like SQLite rowids.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::link::AccountDirectory;
use crate::models::{ListingRecord, Portal, Role};

use super::{ListingStore, StoredListing};

struct Account {
    id: i64,
    role: Role,
    reference: Option<String>,
}

/// In-memory store for tests and embedding.
pub struct InMemoryStore {
    listings: RwLock<Vec<StoredListing>>,
    accounts: RwLock<Vec<Account>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            listings: RwLock::new(Vec::new()),
            accounts: RwLock::new(Vec::new()),
        }
    }

    /// Register an account and return its id.
    pub fn add_account(&self, role: Role, reference: Option<&str>) -> i64 {
        let mut accounts = write(&self.accounts);
        let id = accounts.len() as i64 + 1;
        accounts.push(Account {
            id,
            role,
            reference: reference.map(str::to_string),
        });
        id
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn find_listing_id(&self, code: &str, portal: Portal) -> Result<Option<i64>> {
        Ok(read(&self.listings)
            .iter()
            .find(|s| s.listing.code == code && s.listing.portal == portal)
            .map(|s| s.id))
    }

    async fn insert_listing(&self, record: &ListingRecord) -> Result<i64> {
        let mut listings = write(&self.listings);
        if listings
            .iter()
            .any(|s| s.listing.code == record.code && s.listing.portal == record.portal)
        {
            bail!(
                "UNIQUE constraint failed: listings.source_code, listings.source_portal ({}, {})",
                record.code,
                record.portal
            );
        }
        let id = listings.len() as i64 + 1;
        let ts = now();
        listings.push(StoredListing {
            id,
            listing: record.clone(),
            views: 0,
            created_at: ts,
            updated_at: ts,
        });
        Ok(id)
    }

    async fn update_listing(&self, id: i64, record: &ListingRecord) -> Result<()> {
        let mut listings = write(&self.listings);
        let Some(row) = listings.iter_mut().find(|s| s.id == id) else {
            bail!("listing {} no longer exists", id);
        };
        row.listing = record.clone();
        row.updated_at = now();
        Ok(())
    }

    async fn get_listing(&self, code: &str, portal: Portal) -> Result<Option<StoredListing>> {
        Ok(read(&self.listings)
            .iter()
            .find(|s| s.listing.code == code && s.listing.portal == portal)
            .cloned())
    }

    async fn count_listings(&self) -> Result<i64> {
        Ok(read(&self.listings).len() as i64)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryStore {
    async fn find_client_by_reference(&self, reference: &str) -> Result<Option<i64>> {
        Ok(read(&self.accounts)
            .iter()
            .filter(|a| a.role == Role::Client && a.reference.as_deref() == Some(reference))
            .map(|a| a.id)
            .min())
    }
}
