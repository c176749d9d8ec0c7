//! Listing ingest: fetch new upstream entries and store the unseen ones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use coffee_core::result::AppResult;
use coffee_entity::author::AuthorMatcher;

use crate::context::WorkerContext;
use crate::pool::WorkerPool;
use crate::scheduler::ScheduledJob;
use crate::source::ListingSource;
use crate::task::WorkerTask;

/// What one ingest run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Latest listing date stored before the run.
    pub watermark: Option<NaiveDate>,
    /// Entries returned by the source.
    pub fetched: usize,
    /// Entries already stored.
    pub skipped_existing: usize,
    /// Rows written.
    pub inserted: usize,
    /// Rows written that have at least one local author.
    pub local_author_papers: usize,
}

/// Fetch-and-store, executed inside a pool worker.
#[derive(Debug, Clone)]
pub struct IngestTask {
    source: Arc<dyn ListingSource>,
}

impl IngestTask {
    /// Create an ingest task reading from `source`.
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl WorkerTask for IngestTask {
    type Output = IngestReport;

    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<IngestReport> {
        let watermark = ctx.listings()?.latest_date().await?;

        let mut entries = self.source.fetch_since(watermark).await?;
        let fetched = entries.len();
        if let Some(watermark) = watermark {
            entries.retain(|e| e.utcdate >= watermark);
        }

        let local = ctx.authors()?.list().await?;
        let matcher = AuthorMatcher::new(local.iter().map(|a| a.author.as_str()));
        for entry in &mut entries {
            entry.local_authors = entry.local_authors || matcher.any_local(&entry.authors);
        }

        let summary = ctx.listings()?.insert_new(&entries).await?;

        Ok(IngestReport {
            watermark,
            fetched,
            skipped_existing: fetched - summary.inserted,
            inserted: summary.inserted,
            local_author_papers: summary.inserted_local,
        })
    }
}

/// Scheduler-facing ingest: submits an [`IngestTask`] and waits for it.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pool: WorkerPool,
    source: Arc<dyn ListingSource>,
}

impl IngestJob {
    /// Create an ingest job running on `pool`.
    pub fn new(pool: WorkerPool, source: Arc<dyn ListingSource>) -> Self {
        Self { pool, source }
    }

    /// Run one ingest on the pool.
    pub async fn run(&self) -> AppResult<IngestReport> {
        let report = self.pool.run(IngestTask::new(Arc::clone(&self.source))).await?;
        info!(
            source = self.source.name(),
            watermark = ?report.watermark,
            fetched = report.fetched,
            inserted = report.inserted,
            skipped = report.skipped_existing,
            local = report.local_author_papers,
            "Listing ingest finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl ScheduledJob for IngestJob {
    fn name(&self) -> &str {
        "listing-ingest"
    }

    async fn fire(&self) -> AppResult<()> {
        self.run().await.map(|_| ())
    }
}
