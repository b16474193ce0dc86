//! Crawlers: what to fetch, and running a fetch

mod definition;
mod orchestrator;
mod registry;
mod summary;

pub use definition::{
    CrawlerDefinition, CrawlerPriority, Schedule, SelectionMode, DEFAULT_LOOKBACK_DAYS,
};
pub use orchestrator::{Orchestrator, RunOptions};
pub use registry::CrawlerSet;
pub use summary::{EntryOutcome, RunState, RunSummary};

use thiserror::Error;

use crate::dirlisting::ListingError;
use crate::store::StoreError;

/// Run-level failures. Per-entry problems never surface here.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("crawler {0} has no URL")]
    MissingUrl(String),

    #[error("crawler {crawler} has an invalid filename filter: {source}")]
    InvalidFilter {
        crawler: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown crawler: {0}")]
    UnknownCrawler(String),

    #[error("directory listing failed: {0}")]
    Listing(#[from] ListingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
