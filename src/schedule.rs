//! Scheduled sweep over the configured remote feeds.
//!
//! A sweep visits every active `[[feeds]]` entry in order, importing each
//! through the shared [`Importer`] with a pause between feeds. Every feed
//! that completes gets one `import_logs` row. A feed that fails is logged and
//! skipped; the sweep carries on with the next one.
//!
//! Sweeps are not serialized against each other or against HTTP-triggered
//! imports.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{Config, FeedSource};
use crate::db;
use crate::import::Importer;
use crate::sqlite_store::SqliteStore;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct FeedSweep {
    importer: Arc<Importer>,
    store: SqliteStore,
    feeds: Vec<FeedSource>,
    delay: Duration,
}

impl FeedSweep {
    pub fn new(
        importer: Arc<Importer>,
        store: SqliteStore,
        feeds: Vec<FeedSource>,
        delay: Duration,
    ) -> Self {
        Self {
            importer,
            store,
            feeds,
            delay,
        }
    }

    pub fn from_config(importer: Arc<Importer>, store: SqliteStore, config: &Config) -> Self {
        Self::new(
            importer,
            store,
            config.feeds.clone(),
            Duration::from_secs(config.import.feed_delay_secs),
        )
    }

    pub async fn run_once(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let mut first = true;

        for feed in &self.feeds {
            if !feed.active {
                tracing::debug!(url = %feed.url, "feed inactive, skipping");
                summary.skipped += 1;
                continue;
            }
            if !first && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            first = false;

            match self.importer.import_url(&feed.url, feed.portal).await {
                Ok(report) => {
                    summary.completed += 1;
                    if let Err(e) = self
                        .store
                        .record_import_log(feed.portal, &feed.url, &report)
                        .await
                    {
                        tracing::warn!(url = %feed.url, error = %format!("{:#}", e), "import log not written");
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(url = %feed.url, portal = %feed.portal, error = %e, "scheduled import failed");
                }
            }
        }

        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            "feed sweep finished"
        );
        summary
    }
}

/// Register the sweep on `cron` and start the scheduler.
///
/// The returned scheduler must be kept alive for the job to keep firing.
pub async fn start_scheduler(sweep: Arc<FeedSweep>, cron: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let sweep = sweep.clone();
        Box::pin(async move {
            tracing::info!("scheduled feed sweep triggered");
            sweep.run_once().await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {}", cron))?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    tracing::info!(cron, "feed sweep scheduled");
    Ok(sched)
}

/// `estate import sweep`: run every active feed once, now.
pub async fn run_sweep(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let importer = Arc::new(Importer::for_store(store.clone(), config)?);
    let sweep = FeedSweep::from_config(importer, store, config);

    let summary = sweep.run_once().await;

    println!("sweep");
    println!("  completed: {}", summary.completed);
    println!("  failed: {}", summary.failed);
    println!("  skipped: {}", summary.skipped);
    println!("ok");

    pool.close().await;
    Ok(())
}
