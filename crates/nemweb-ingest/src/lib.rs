//! NEMWEB Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Discovers files published on NEMWEB directory listings, parses the
//! multi-table MMS format into typed records and stores them idempotently,
//! tracking per-crawler history so runs can be repeated and gaps backfilled.
//!
//! # Components
//!
//! - [`filename`]: metadata from AEMO filenames
//! - [`dirlisting`]: listing pages to entries
//! - [`parser`]: record-tagged CSV (plain, zipped, nested zips) to tables
//! - [`schema`]: per-table validation, typed decoding and upsert keys
//! - [`gaps`]: expected-interval grid minus recorded history
//! - [`store`]: record sink, crawl history and crawler metadata
//! - [`crawler`]: crawler definitions and the run orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nemweb_ingest::config::IngestConfig;
//! use nemweb_ingest::crawler::{CrawlerSet, Orchestrator, RunOptions};
//! use nemweb_ingest::http::ReqwestTransport;
//! use nemweb_ingest::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let transport = Arc::new(ReqwestTransport::new(&config)?);
//!     let orchestrator = Orchestrator::with_store(transport, Arc::new(MemoryStore::new()), config);
//!
//!     let crawlers = CrawlerSet::nemweb_defaults();
//!     for crawler in crawlers.by_priority() {
//!         let summary = orchestrator.run(crawler, RunOptions::default()).await?;
//!         println!("{}: {:?}", summary.crawler, summary.state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod dirlisting;
pub mod filename;
pub mod gaps;
pub mod http;
pub mod parser;
pub mod schema;
pub mod store;

pub use config::IngestConfig;
pub use crawler::{CrawlError, CrawlerDefinition, CrawlerSet, Orchestrator, RunOptions, RunSummary};
pub use dirlisting::{DirListing, DirlistingClient, DirlistingEntry};
pub use filename::AemoFilename;
pub use parser::{ParsedFile, TableSet};
pub use schema::SchemaRegistry;
