//! Declarative crawler configuration

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use nemweb_common::{BucketSize, Network};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::CrawlError;

/// Lookback used by "latest" selection when a crawler sets no backfill window
pub const DEFAULT_LOOKBACK_DAYS: u32 = 1;

/// Run ordering; higher priority crawlers run first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlerPriority {
    High,
    Medium,
    Low,
}

/// How often a crawler should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Every scheduler tick
    Live,
    Minutes(u32),
    Hourly,
    Daily,
}

impl Schedule {
    pub fn period(self) -> TimeDelta {
        match self {
            Schedule::Live => TimeDelta::zero(),
            Schedule::Minutes(n) => TimeDelta::minutes(i64::from(n)),
            Schedule::Hourly => TimeDelta::hours(1),
            Schedule::Daily => TimeDelta::days(1),
        }
    }

    /// Whether a crawler last processed at `last_processed` should run at `now`
    pub fn is_due(self, last_processed: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_processed {
            None => true,
            Some(last) => now - last >= self.period(),
        }
    }
}

/// Which listed entries a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Entries whose interval is missing from history within the lookback
    Latest { lookback_days: u32 },
    /// The `n` most recently modified entries
    Limit(usize),
    /// Everything listed
    Full,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SelectionMode::Latest { lookback_days } => format!("latest({lookback_days}d)"),
            SelectionMode::Limit(n) => format!("limit({n})"),
            SelectionMode::Full => "full".to_string(),
        };
        f.pad(&label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerDefinition {
    /// Unique name, also the key for history and metadata
    pub name: String,
    /// Listing URL; may contain `{year}`, `{month}` and `{day}`
    pub url: Option<String>,
    pub network: Network,
    /// Regex applied to entry names after listing
    pub filename_filter: Option<String>,
    pub bucket_size: BucketSize,
    pub backfill_days: Option<u32>,
    pub priority: CrawlerPriority,
    pub schedule: Schedule,
    /// Always take the download-to-disk path
    pub bulk_insert: bool,
    pub latest: bool,
    pub limit: Option<usize>,
}

impl CrawlerDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>, network: Network) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            network,
            filename_filter: None,
            bucket_size: BucketSize::Interval,
            backfill_days: None,
            priority: CrawlerPriority::Medium,
            schedule: Schedule::Live,
            bulk_insert: false,
            latest: false,
            limit: None,
        }
    }

    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filename_filter = Some(pattern.into());
        self
    }

    pub fn with_bucket(mut self, bucket: BucketSize) -> Self {
        self.bucket_size = bucket;
        self
    }

    pub fn with_backfill_days(mut self, days: u32) -> Self {
        self.backfill_days = Some(days);
        self
    }

    pub fn with_priority(mut self, priority: CrawlerPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_bulk_insert(mut self) -> Self {
        self.bulk_insert = true;
        self
    }

    pub fn with_latest(mut self) -> Self {
        self.latest = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Configured selection mode. `latest` wins over `limit`.
    pub fn selection_mode(&self) -> SelectionMode {
        if self.latest {
            SelectionMode::Latest {
                lookback_days: self.backfill_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            }
        } else if let Some(n) = self.limit {
            SelectionMode::Limit(n)
        } else {
            SelectionMode::Full
        }
    }

    /// Listing URL with date placeholders rendered in network time
    pub fn resolve_url(&self, now: DateTime<Utc>) -> Result<String, CrawlError> {
        let template = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CrawlError::MissingUrl(self.name.clone()))?;

        let local = self.network.to_local(now);
        Ok(template
            .replace("{year}", &local.year().to_string())
            .replace("{month}", &format!("{:02}", local.month()))
            .replace("{day}", &format!("{:02}", local.day())))
    }

    pub fn filter_regex(&self) -> Result<Option<Regex>, CrawlError> {
        self.filename_filter
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| CrawlError::InvalidFilter {
                    crawler: self.name.clone(),
                    source,
                })
            })
            .transpose()
    }
}
