//! # Estate Harness
//!
//! Imports property listings from real-estate portal XML feeds into SQLite.
//!
//! Feeds arrive as file uploads, as URLs posted to the API, or from a
//! scheduled sweep over configured remote feeds. Each one is parsed, mapped
//! to canonical listings, linked to the owning client account, and upserted
//! by `(source_code, source_portal)`. The pure pipeline lives in
//! [`estate_harness_core`]; this crate adds storage, transport, scheduling,
//! the HTTP API and the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ upload / URL │──▶│ Importer             │──▶│  SQLite  │
//! │ cron sweep   │   │ parse→map→link→upsert│   │ listings │
//! └──────────────┘   └──────────────────────┘   └──────────┘
//!                               ▲
//!              ┌────────────────┴───────┐
//!         ┌──────────┐            ┌──────────┐
//!         │   CLI    │            │   HTTP   │
//!         │ (estate) │            │  (axum)  │
//!         └──────────┘            └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! estate init
//! estate user add --name Admin --email admin@example.com --password secret --role master
//! estate import file ./feed.xml
//! estate serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite listing store and account directory |
//! | [`users`] | Accounts and password hashing |
//! | [`auth`] | Signed session tokens |
//! | [`import`] | Import orchestration |
//! | [`schedule`] | Scheduled feed sweep |
//! | [`server`] | HTTP API |
//! | [`get`] | Listing lookup |
//! | [`logging`] | Tracing setup |

pub mod auth;
pub mod config;
pub mod db;
pub mod get;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod schedule;
pub mod server;
pub mod sqlite_store;
pub mod users;
