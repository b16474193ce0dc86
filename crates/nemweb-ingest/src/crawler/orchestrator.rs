//! Crawler run orchestration
//!
//! One run walks `Idle -> ListingFetched -> EntriesSelected -> Processing`
//! and ends `Completed` or `PartiallyFailed`. Entries are processed over a
//! bounded `buffer_unordered` pool; a failing entry is logged and counted
//! but never stops its siblings. The watermark advances only when every
//! selected entry was processed.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::definition::{CrawlerDefinition, SelectionMode};
use super::summary::{EntryOutcome, RunState, RunSummary};
use super::CrawlError;
use crate::config::IngestConfig;
use crate::dirlisting::{DirListing, DirlistingClient, DirlistingEntry};
use crate::gaps::missing_intervals;
use crate::http::HttpTransport;
use crate::parser::{parse_bytes, parse_path, ParsedFile, TableSet};
use crate::schema::SchemaRegistry;
use crate::store::{
    CrawlHistoryStore, CrawlerMetadataStore, MetadataUpdate, RecordSink, Row,
};

const FALLBACK_DOWNLOAD_NAME: &str = "download";

/// Per-run overrides
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker pool width; the configured default when unset
    pub concurrency: Option<usize>,
    /// Replaces the crawler's configured selection mode
    pub mode: Option<SelectionMode>,
    /// Stops new submissions; in-flight entries drain
    pub cancel: CancellationToken,
    /// Clock override
    pub now: Option<DateTime<Utc>>,
}

impl RunOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_mode(mut self, mode: SelectionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// What one entry contributed
struct EntryResult {
    interval: Option<NaiveDateTime>,
    records: usize,
    inserted: u64,
}

/// Runs crawler definitions against a transport and a set of stores
pub struct Orchestrator {
    transport: Arc<dyn HttpTransport>,
    listing: DirlistingClient,
    registry: Arc<SchemaRegistry>,
    sink: Arc<dyn RecordSink>,
    history: Arc<dyn CrawlHistoryStore>,
    metadata: Arc<dyn CrawlerMetadataStore>,
    config: IngestConfig,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        sink: Arc<dyn RecordSink>,
        history: Arc<dyn CrawlHistoryStore>,
        metadata: Arc<dyn CrawlerMetadataStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            listing: DirlistingClient::new(transport.clone()),
            transport,
            registry: Arc::new(SchemaRegistry::with_defaults()),
            sink,
            history,
            metadata,
            config,
        }
    }

    /// Use one store for rows, history and metadata
    pub fn with_store<S>(transport: Arc<dyn HttpTransport>, store: Arc<S>, config: IngestConfig) -> Self
    where
        S: RecordSink + CrawlHistoryStore + CrawlerMetadataStore + 'static,
    {
        Self::new(transport, store.clone(), store.clone(), store, config)
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Execute one run of `crawler`
    ///
    /// Only configuration problems, a failed listing fetch and store
    /// failures outside entry processing are errors. Entry failures are
    /// reported in the summary.
    pub async fn run(
        &self,
        crawler: &CrawlerDefinition,
        options: RunOptions,
    ) -> Result<RunSummary, CrawlError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl", crawler = %crawler.name, run_id = %run_id);
        self.run_inner(run_id, crawler, options).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        crawler: &CrawlerDefinition,
        options: RunOptions,
    ) -> Result<RunSummary, CrawlError> {
        let started = Instant::now();
        let now = options.now.unwrap_or_else(Utc::now);
        let mode = options.mode.unwrap_or_else(|| crawler.selection_mode());
        let concurrency = options
            .concurrency
            .unwrap_or(self.config.concurrency)
            .max(1);

        let mut summary = RunSummary::new(run_id, &crawler.name, mode);

        let url = crawler.resolve_url(now)?;
        let filter = crawler.filter_regex()?;
        info!(url = %url, mode = %mode, concurrency, "Starting crawl");

        let mut listing = self.listing.fetch(&url).await?;
        if let Some(pattern) = &filter {
            listing.apply_filter(pattern);
        }
        summary.listed = listing.len();
        summary.server_latest = listing.server_latest();
        transition(&mut summary, RunState::ListingFetched);

        let selected = self.select_entries(crawler, &listing, mode, now).await?;
        summary.candidates = selected.len();
        transition(&mut summary, RunState::EntriesSelected);

        if selected.is_empty() {
            summary.watermark = self.current_watermark(&crawler.name).await?;
            summary.duration = started.elapsed();
            transition(&mut summary, RunState::Completed);
            info!("No entries selected");
            return Ok(summary);
        }

        transition(&mut summary, RunState::Processing);
        let cancel = options.cancel.clone();
        let outcomes: Vec<EntryOutcome> = stream::iter(selected.iter())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|entry| self.process_entry(crawler, entry))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        summary.cancelled = selected.len() - outcomes.len();
        for outcome in &outcomes {
            match outcome {
                EntryOutcome::Processed { inserted, .. } => {
                    summary.processed += 1;
                    summary.inserted += inserted;
                },
                EntryOutcome::Failed { .. } => summary.errors += 1,
            }
        }
        summary.outcomes = outcomes;

        if summary.errors == 0 && summary.cancelled == 0 {
            summary.watermark = self
                .advance_watermark(crawler, &selected, summary.server_latest)
                .await?;
            transition(&mut summary, RunState::Completed);
        } else {
            warn!(
                errors = summary.errors,
                cancelled = summary.cancelled,
                "Run incomplete, watermark left unchanged"
            );
            summary.watermark = self.current_watermark(&crawler.name).await?;
            transition(&mut summary, RunState::PartiallyFailed);
        }

        summary.duration = started.elapsed();
        info!(
            state = ?summary.state,
            candidates = summary.candidates,
            processed = summary.processed,
            inserted = summary.inserted,
            errors = summary.errors,
            duration_ms = summary.duration.as_millis() as u64,
            "Crawl finished"
        );

        Ok(summary)
    }

    /// Choose which listed files to process
    async fn select_entries(
        &self,
        crawler: &CrawlerDefinition,
        listing: &DirListing,
        mode: SelectionMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<DirlistingEntry>, CrawlError> {
        let files = listing.files().cloned();

        let selected: Vec<DirlistingEntry> = match mode {
            SelectionMode::Latest { lookback_days } => {
                let missing: HashSet<NaiveDateTime> = missing_intervals(
                    self.history.as_ref(),
                    &crawler.name,
                    crawler.bucket_size,
                    crawler.network,
                    lookback_days,
                    crawler.network.to_local(now),
                )
                .await?
                .into_iter()
                .collect();

                files
                    .filter(|entry| {
                        entry
                            .aemo_interval
                            .map(|ts| crawler.bucket_size.floor(ts, crawler.network))
                            .is_some_and(|ts| missing.contains(&ts))
                    })
                    .collect()
            },
            SelectionMode::Limit(n) => {
                let mut files: Vec<DirlistingEntry> = files.collect();
                files.sort_by(|a, b| b.modified.cmp(&a.modified));
                files.truncate(n);
                files
            },
            SelectionMode::Full => files.collect(),
        };

        debug!(mode = %mode, selected = selected.len(), "Selected entries");
        Ok(selected)
    }

    /// Process one entry, converting any failure into an outcome
    async fn process_entry(
        &self,
        crawler: &CrawlerDefinition,
        entry: &DirlistingEntry,
    ) -> EntryOutcome {
        match self.fetch_parse_store(crawler, entry).await {
            Ok(result) => {
                debug!(
                    url = %entry.link,
                    records = result.records,
                    inserted = result.inserted,
                    "Entry processed"
                );
                EntryOutcome::Processed {
                    url: entry.link.clone(),
                    interval: result.interval,
                    records: result.records,
                    inserted: result.inserted,
                }
            },
            Err(e) => {
                error!(url = %entry.link, error = %format!("{e:#}"), "Entry failed");
                EntryOutcome::Failed {
                    url: entry.link.clone(),
                    error: format!("{e:#}"),
                }
            },
        }
    }

    async fn fetch_parse_store(
        &self,
        crawler: &CrawlerDefinition,
        entry: &DirlistingEntry,
    ) -> anyhow::Result<EntryResult> {
        let large = entry
            .size_bytes
            .is_some_and(|size| size > self.config.large_file_threshold_bytes);

        let parsed = if crawler.bulk_insert || large {
            self.download_and_parse(entry).await?
        } else {
            let response = self
                .transport
                .get(&entry.link)
                .await
                .with_context(|| format!("Failed to fetch {}", entry.link))?;
            parse_bytes(&response.body, &entry.name, &self.registry)
                .with_context(|| format!("Failed to parse {}", entry.name))?
        };

        if parsed.stats.rejected_rows > 0 {
            warn!(
                url = %entry.link,
                rejected = parsed.stats.rejected_rows,
                "Rows rejected while parsing"
            );
        }

        let inserted = self.store_tables(&parsed.tables).await?;
        let records = parsed.stats.records;

        let interval = entry
            .aemo_interval
            .map(|ts| crawler.bucket_size.floor(ts, crawler.network));
        if let Some(interval) = interval {
            self.history
                .record_history(&crawler.name, interval, records as u64)
                .await
                .context("Failed to record crawl history")?;
        }

        Ok(EntryResult {
            interval,
            records,
            inserted,
        })
    }

    /// Stream a large file to a private temp dir and parse it from disk
    ///
    /// The directory is removed when `dir` drops, on every exit path.
    async fn download_and_parse(&self, entry: &DirlistingEntry) -> anyhow::Result<ParsedFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nemweb-");
        let dir = match &self.config.temp_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .context("Failed to create temp directory")?;

        let path = dir.path().join(download_file_name(&entry.name));

        let bytes = self
            .transport
            .download_to(&entry.link, &path)
            .await
            .with_context(|| format!("Failed to download {}", entry.link))?;
        debug!(url = %entry.link, bytes, path = %path.display(), "Downloaded to disk");

        let registry = self.registry.clone();
        let parse_target = path.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_path(&parse_target, &registry))
            .await
            .context("Parse task failed")?
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        drop(dir);
        Ok(parsed)
    }

    /// Upsert every table that has a schema; others pass through unstored
    async fn store_tables(&self, tables: &TableSet) -> anyhow::Result<u64> {
        let batch_size = self.config.upsert_batch_size.max(1);
        let mut inserted = 0u64;

        for table in tables.tables() {
            let Some(schema) = table.schema() else {
                debug!(table = %table.key(), records = table.records.len(), "No schema, not stored");
                continue;
            };

            let rows: Vec<Row> = table
                .records
                .iter()
                .filter_map(|record| schema.to_row(record).ok())
                .collect();

            for chunk in rows.chunks(batch_size) {
                inserted += self
                    .sink
                    .upsert(
                        schema.target_table(),
                        chunk,
                        schema.conflict_key(),
                        schema.update_fields(),
                    )
                    .await
                    .with_context(|| format!("Failed to store {}", schema.target_table()))?;
            }
        }

        Ok(inserted)
    }

    async fn current_watermark(&self, crawler_name: &str) -> Result<Option<NaiveDateTime>, CrawlError> {
        Ok(self
            .metadata
            .get_metadata(crawler_name)
            .await?
            .and_then(|m| m.last_crawled))
    }

    /// Advance `last_crawled` to the newest selected entry, never backwards
    async fn advance_watermark(
        &self,
        crawler: &CrawlerDefinition,
        selected: &[DirlistingEntry],
        server_latest: Option<NaiveDateTime>,
    ) -> Result<Option<NaiveDateTime>, CrawlError> {
        let Some(candidate) = selected
            .iter()
            .filter_map(|e| e.modified.or(e.aemo_interval))
            .max()
        else {
            return self.current_watermark(&crawler.name).await;
        };

        let previous = self.current_watermark(&crawler.name).await?;
        if previous.is_some_and(|prev| candidate < prev) {
            warn!(
                previous = ?previous,
                candidate = %candidate,
                "Watermark would move backwards; keeping the stored value"
            );
        }

        let stored = self
            .metadata
            .advance(&MetadataUpdate {
                crawler_name: crawler.name.clone(),
                last_crawled: candidate,
                server_latest,
                processed_at: Utc::now(),
            })
            .await?;

        Ok(stored.last_crawled)
    }
}

/// File name used inside a download's temp dir
///
/// Listing text is untrusted; anything other than a single plain path
/// component falls back to a fixed name. The parser sniffs content, so the
/// name only matters for logs.
fn download_file_name(name: &str) -> &str {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => part.to_str().unwrap_or(FALLBACK_DOWNLOAD_NAME),
        _ => FALLBACK_DOWNLOAD_NAME,
    }
}

fn transition(summary: &mut RunSummary, next: RunState) {
    debug!(from = ?summary.state, to = ?next, "Run state");
    summary.state = next;
}
