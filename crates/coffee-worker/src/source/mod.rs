//! Upstream listing sources.

pub mod arxiv;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

use coffee_core::result::AppResult;
use coffee_entity::listing::NewListing;

pub use arxiv::{ArxivClient, parse_feed};

/// Where new listings come from.
#[async_trait]
pub trait ListingSource: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Entries listed on or after `watermark`, or everything available
    /// when there is no watermark yet.
    async fn fetch_since(&self, watermark: Option<NaiveDate>) -> AppResult<Vec<NewListing>>;
}
