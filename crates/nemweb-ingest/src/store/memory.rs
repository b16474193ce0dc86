use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::{
    conflict_values, CrawlHistoryEntry, CrawlHistoryStore, CrawlerMetadata, CrawlerMetadataStore,
    MetadataUpdate, RecordSink, Row, StoreError,
};

type TableRows = BTreeMap<Vec<String>, Row>;

/// In-process store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, TableRows>>,
    history: RwLock<HashMap<String, BTreeMap<NaiveDateTime, u64>>>,
    metadata: RwLock<HashMap<String, CrawlerMetadata>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows held for `table`, ordered by conflict key
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }

    pub async fn history(&self, crawler_name: &str) -> Vec<CrawlHistoryEntry> {
        self.history
            .read()
            .await
            .get(crawler_name)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(interval, records)| CrawlHistoryEntry {
                        crawler_name: crawler_name.to_string(),
                        interval: *interval,
                        records: *records as i64,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Seed metadata directly, bypassing the advance rule
    pub async fn set_metadata(&self, metadata: CrawlerMetadata) {
        self.metadata
            .write()
            .await
            .insert(metadata.crawler_name.clone(), metadata);
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
        update_fields: &[&str],
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.to_string()).or_default();
        let mut written = 0u64;

        for row in rows {
            let key = conflict_values(row, conflict_key)?;
            match stored.get_mut(&key) {
                Some(existing) => {
                    if update_fields.is_empty() {
                        continue;
                    }
                    for field in update_fields {
                        if let Some(value) = row.get(*field) {
                            existing.insert(field.to_string(), value.clone());
                        }
                    }
                    written += 1;
                },
                None => {
                    stored.insert(key, row.clone());
                    written += 1;
                },
            }
        }

        Ok(written)
    }
}

#[async_trait]
impl CrawlHistoryStore for MemoryStore {
    async fn record_history(
        &self,
        crawler_name: &str,
        interval: NaiveDateTime,
        records: u64,
    ) -> Result<(), StoreError> {
        self.history
            .write()
            .await
            .entry(crawler_name.to_string())
            .or_default()
            .insert(interval, records);
        Ok(())
    }

    async fn covered_intervals(
        &self,
        crawler_name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<BTreeSet<NaiveDateTime>, StoreError> {
        if from > to {
            return Ok(BTreeSet::new());
        }

        Ok(self
            .history
            .read()
            .await
            .get(crawler_name)
            .map(|entries| entries.range(from..=to).map(|(ts, _)| *ts).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CrawlerMetadataStore for MemoryStore {
    async fn get_metadata(&self, crawler_name: &str) -> Result<Option<CrawlerMetadata>, StoreError> {
        Ok(self.metadata.read().await.get(crawler_name).cloned())
    }

    async fn advance(&self, update: &MetadataUpdate) -> Result<CrawlerMetadata, StoreError> {
        let mut metadata = self.metadata.write().await;
        let entry = metadata
            .entry(update.crawler_name.clone())
            .or_insert_with(|| CrawlerMetadata {
                crawler_name: update.crawler_name.clone(),
                last_crawled: None,
                last_processed: None,
                server_latest: None,
            });

        entry.last_crawled = entry.last_crawled.max(Some(update.last_crawled));
        entry.last_processed = Some(update.processed_at);
        if update.server_latest.is_some() {
            entry.server_latest = update.server_latest;
        }

        Ok(entry.clone())
    }
}
