//! Persistence interfaces
//!
//! Three narrow seams, each implemented by [`MemoryStore`] and [`PgStore`]:
//!
//! - [`RecordSink`]: idempotent upsert of typed rows keyed on a conflict key
//! - [`CrawlHistoryStore`]: which intervals a crawler has ingested
//! - [`CrawlerMetadataStore`]: per-crawler watermark, advanced conditionally

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use thiserror::Error;

/// A typed row ready for storage, keyed by column name
pub type Row = Map<String, Value>;

#[allow(clippy::expect_used)]
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("identifier pattern compiles"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("row is missing conflict key column {0}")]
    MissingKey(String),
}

/// One ingested interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CrawlHistoryEntry {
    pub crawler_name: String,
    #[sqlx(rename = "interval_start")]
    pub interval: NaiveDateTime,
    pub records: i64,
}

/// Per-crawler progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CrawlerMetadata {
    pub crawler_name: String,
    /// Watermark: newest modified time accounted for. Only ever advances.
    pub last_crawled: Option<NaiveDateTime>,
    /// When the last successful run finished
    pub last_processed: Option<DateTime<Utc>>,
    /// Newest file the server listed on the last successful run
    pub server_latest: Option<NaiveDateTime>,
}

/// A completed run's proposed metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataUpdate {
    pub crawler_name: String,
    pub last_crawled: NaiveDateTime,
    pub server_latest: Option<NaiveDateTime>,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert rows, or overwrite `update_fields` where the conflict key
    /// already exists. Returns rows written.
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
        update_fields: &[&str],
    ) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CrawlHistoryStore: Send + Sync {
    async fn record_history(
        &self,
        crawler_name: &str,
        interval: NaiveDateTime,
        records: u64,
    ) -> Result<(), StoreError>;

    /// Intervals recorded for `crawler_name` within `[from, to]`
    async fn covered_intervals(
        &self,
        crawler_name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<BTreeSet<NaiveDateTime>, StoreError>;
}

#[async_trait]
pub trait CrawlerMetadataStore: Send + Sync {
    async fn get_metadata(&self, crawler_name: &str) -> Result<Option<CrawlerMetadata>, StoreError>;

    /// Single conditional write: `last_crawled` becomes the newer of the
    /// stored and proposed values. Returns the stored state afterwards.
    async fn advance(&self, update: &MetadataUpdate) -> Result<CrawlerMetadata, StoreError>;
}

/// Reject anything that is not a plain lowercase SQL identifier
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Conflict-key values of a row, as a comparable key
pub fn conflict_values(row: &Row, conflict_key: &[&str]) -> Result<Vec<String>, StoreError> {
    conflict_key
        .iter()
        .map(|column| {
            row.get(*column)
                .map(Value::to_string)
                .ok_or_else(|| StoreError::MissingKey(column.to_string()))
        })
        .collect()
}

/// Collapse rows sharing a conflict key, keeping the last one
///
/// A single `INSERT .. ON CONFLICT DO UPDATE` cannot touch the same row
/// twice, and merged table sets routinely carry repeats.
pub fn dedupe_rows(rows: &[Row], conflict_key: &[&str]) -> Result<Vec<Row>, StoreError> {
    let mut positions: HashMap<Vec<String>, usize> = HashMap::with_capacity(rows.len());
    let mut deduped: Vec<Row> = Vec::with_capacity(rows.len());

    for row in rows {
        let key = conflict_values(row, conflict_key)?;
        match positions.get(&key) {
            Some(&i) => deduped[i] = row.clone(),
            None => {
                positions.insert(key, deduped.len());
                deduped.push(row.clone());
            },
        }
    }

    Ok(deduped)
}
