//! Read tasks for stored listings.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use coffee_core::result::AppResult;
use coffee_entity::listing::{ArchiveDay, ListingGroups};

use crate::context::WorkerContext;
use crate::task::WorkerTask;

/// Papers listed on one date, grouped for the voting page.
#[derive(Debug, Clone, Serialize)]
pub struct DayListings {
    /// The date shown; `None` when nothing has been ingested yet.
    pub utcdate: Option<NaiveDate>,
    #[serde(flatten)]
    pub groups: ListingGroups,
}

/// Load the listings of a date, or of the latest stored date.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListingsForDateTask {
    /// `None` selects the latest stored date.
    pub date: Option<NaiveDate>,
    /// Keep cross-listed papers.
    pub include_crosslists: bool,
}

#[async_trait]
impl WorkerTask for ListingsForDateTask {
    type Output = DayListings;

    fn name(&self) -> &'static str {
        "listings-for-date"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<DayListings> {
        let mut repo = ctx.listings()?;
        let utcdate = match self.date {
            Some(date) => Some(date),
            None => repo.latest_date().await?,
        };
        let rows = match utcdate {
            Some(date) => repo.find_by_date(date).await?,
            None => Vec::new(),
        };
        Ok(DayListings {
            utcdate,
            groups: ListingGroups::from_day(rows, self.include_crosslists),
        })
    }
}

/// Per-date listing counts, newest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveIndexTask;

#[async_trait]
impl WorkerTask for ArchiveIndexTask {
    type Output = Vec<ArchiveDay>;

    fn name(&self) -> &'static str {
        "archive-index"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<Vec<ArchiveDay>> {
        ctx.listings()?.archive_index().await
    }
}
