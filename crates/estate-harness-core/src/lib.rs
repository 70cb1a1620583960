//! # Estate Harness Core
//!
//! The I/O-free half of Estate Harness: the feed tree parser, the two portal
//! field mappers, client linking, the store traits, and the upsert engine.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Storage and
//! account lookup are reached only through the [`store::ListingStore`] and
//! [`link::AccountDirectory`] traits, so the whole pipeline can be exercised
//! against [`store::memory::InMemoryStore`].
//!
//! ```text
//! raw XML ─▶ feed::parse_feed ─▶ mapper::detect_format ─▶ FeedMapper::map
//!                                                             │
//!        ImportReport ◀─ upsert::upsert_listings ◀─ link::link_clients
//! ```

pub mod error;
pub mod feed;
pub mod fields;
pub mod link;
pub mod mapper;
pub mod models;
pub mod store;
pub mod upsert;

pub use error::ImportError;
pub use models::{ImportReport, ListingRecord, Portal, RecordFailure, Role};
