//! Import orchestration.
//!
//! [`Importer`] drives one feed through the whole pipeline:
//!
//! ```text
//! fetch / stage ─▶ parse ─▶ detect or pick mapper ─▶ map ─▶ link ─▶ upsert ─▶ report
//! ```
//!
//! Run-level failures (bad XML, unknown format, fetch errors, a failing
//! account lookup) abort before anything is written and surface as
//! [`ImportError`]. Per-listing failures only show up in the report.
//!
//! The same importer backs the HTTP endpoints, the scheduled sweep and the
//! `estate import` commands.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use estate_harness_core::feed::{decode_feed, parse_feed};
use estate_harness_core::link::{link_clients, AccountDirectory};
use estate_harness_core::mapper::{detect_format, mapper_for};
use estate_harness_core::store::ListingStore;
use estate_harness_core::upsert::upsert_listings;
use estate_harness_core::{ImportError, ImportReport, Portal};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Pipeline position of a run, attached to its log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Idle,
    Fetching,
    Parsing,
    Mapping,
    Linking,
    Upserting,
    Reporting,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Idle => "idle",
            ImportStage::Fetching => "fetching",
            ImportStage::Parsing => "parsing",
            ImportStage::Mapping => "mapping",
            ImportStage::Linking => "linking",
            ImportStage::Upserting => "upserting",
            ImportStage::Reporting => "reporting",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: ImportStage) {
    tracing::debug!(stage = %stage, "import stage");
}

/// An uploaded feed file on disk, removed when dropped.
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "staged upload removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove staged upload")
            }
        }
    }
}

pub struct Importer {
    listings: Arc<dyn ListingStore>,
    accounts: Arc<dyn AccountDirectory>,
    http: reqwest::Client,
}

impl Importer {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        accounts: Arc<dyn AccountDirectory>,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .user_agent(concat!("estate-harness/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            listings,
            accounts,
            http,
        })
    }

    /// Importer over one SQLite store, using the configured fetch timeout.
    pub fn for_store(store: SqliteStore, config: &Config) -> Result<Self> {
        let store = Arc::new(store);
        Self::new(
            store.clone(),
            store,
            Duration::from_secs(config.import.fetch_timeout_secs),
        )
    }

    /// Run raw feed text through the pipeline.
    ///
    /// With `declared` set, that portal's mapper is used as is; otherwise the
    /// format is detected from the tree.
    pub async fn import_feed(
        &self,
        raw: &str,
        declared: Option<Portal>,
    ) -> Result<ImportReport, ImportError> {
        enter(ImportStage::Parsing);
        let tree = parse_feed(raw)?;

        enter(ImportStage::Mapping);
        let mapper = match declared {
            Some(portal) => mapper_for(portal),
            None => detect_format(&tree)?,
        };
        let mut records = mapper.map(&tree);
        tracing::info!(portal = %mapper.portal(), listings = records.len(), "feed mapped");

        enter(ImportStage::Linking);
        link_clients(&mut records, self.accounts.as_ref()).await?;

        enter(ImportStage::Upserting);
        let report = upsert_listings(self.listings.as_ref(), &records).await;

        enter(ImportStage::Reporting);
        tracing::info!(
            portal = %mapper.portal(),
            total = report.total,
            inserted = report.inserted,
            updated = report.updated,
            errors = report.error_count(),
            "import finished"
        );
        enter(ImportStage::Idle);
        Ok(report)
    }

    /// Import a staged upload, deleting the file whatever the outcome.
    pub async fn import_upload(&self, staged: StagedUpload) -> Result<ImportReport, ImportError> {
        let bytes = tokio::fs::read(staged.path())
            .await
            .map_err(|e| ImportError::Staging(format!("{}: {}", staged.path().display(), e)))?;
        self.import_feed(&decode_feed(&bytes), None).await
    }

    /// Fetch `url` and import it with the mapper of `portal`.
    pub async fn import_url(&self, url: &str, portal: Portal) -> Result<ImportReport, ImportError> {
        let raw = self.fetch(url).await?;
        self.import_feed(&raw, Some(portal)).await
    }

    /// One GET, no retries. Non-success statuses are transport errors. The
    /// body is decoded with the charset its XML declaration names.
    pub async fn fetch(&self, url: &str) -> Result<String, ImportError> {
        enter(ImportStage::Fetching);
        tracing::info!(url, "fetching feed");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ImportError::Transport(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImportError::Transport(e.to_string()))?;
        Ok(decode_feed(&bytes))
    }
}

fn print_report(report: &ImportReport) {
    println!("  total: {}", report.total);
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    println!("  errors: {}", report.error_count());
    for failure in &report.failures {
        println!("    {}: {}", failure.code, failure.error);
    }
}

/// `estate import file`: the file is read, never deleted.
pub async fn run_import_file(config: &Config, path: &Path, portal: Option<Portal>) -> Result<()> {
    let pool = db::connect(config).await?;
    let importer = Importer::for_store(SqliteStore::new(pool.clone()), config)?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let report = importer.import_feed(&decode_feed(&bytes), portal).await?;

    println!("import {}", path.display());
    print_report(&report);
    println!("ok");

    pool.close().await;
    Ok(())
}

/// `estate import url`.
pub async fn run_import_url(config: &Config, url: &str, portal: Portal) -> Result<()> {
    let pool = db::connect(config).await?;
    let importer = Importer::for_store(SqliteStore::new(pool.clone()), config)?;

    let report = importer.import_url(url, portal).await?;

    println!("import {} ({})", url, portal);
    print_report(&report);
    println!("ok");

    pool.close().await;
    Ok(())
}
