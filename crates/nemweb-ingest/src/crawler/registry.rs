//! The static set of NEMWEB crawlers

use chrono::{DateTime, Utc};
use nemweb_common::{BucketSize, Network};
use std::collections::HashMap;

use super::definition::{CrawlerDefinition, CrawlerPriority, Schedule};
use crate::store::CrawlerMetadata;

const NEMWEB_CURRENT: &str = "https://nemweb.com.au/Reports/Current";
const NEMWEB_ARCHIVE: &str = "https://nemweb.com.au/Reports/Archive";

#[derive(Debug, Clone, Default)]
pub struct CrawlerSet {
    crawlers: Vec<CrawlerDefinition>,
}

impl CrawlerSet {
    pub fn new(crawlers: Vec<CrawlerDefinition>) -> Self {
        Self { crawlers }
    }

    pub fn nemweb_defaults() -> Self {
        Self::new(vec![
            CrawlerDefinition::new(
                "au.nemweb.current.dispatch_scada",
                format!("{NEMWEB_CURRENT}/Dispatch_SCADA/"),
                Network::Nem,
            )
            .with_latest()
            .with_priority(CrawlerPriority::High),
            CrawlerDefinition::new(
                "au.nemweb.current.dispatch_is",
                format!("{NEMWEB_CURRENT}/DispatchIS_Reports/"),
                Network::Nem,
            )
            .with_latest()
            .with_priority(CrawlerPriority::High),
            CrawlerDefinition::new(
                "au.nemweb.current.trading_is",
                format!("{NEMWEB_CURRENT}/TradingIS_Reports/"),
                Network::Nem,
            )
            .with_latest()
            .with_priority(CrawlerPriority::High),
            CrawlerDefinition::new(
                "au.nemweb.current.rooftop_actual",
                format!("{NEMWEB_CURRENT}/ROOFTOP_PV/ACTUAL/"),
                Network::AemoRooftop,
            )
            .with_filter(r"(?i)^PUBLIC_ROOFTOP_PV_ACTUAL_MEASUREMENT_")
            .with_latest()
            .with_priority(CrawlerPriority::Medium)
            .with_schedule(Schedule::Minutes(30)),
            CrawlerDefinition::new(
                "au.nemweb.archive.dispatch_scada",
                format!("{NEMWEB_ARCHIVE}/Dispatch_SCADA/"),
                Network::Nem,
            )
            .with_bucket(BucketSize::Day)
            .with_backfill_days(14)
            .with_latest()
            .with_bulk_insert()
            .with_priority(CrawlerPriority::Low)
            .with_schedule(Schedule::Daily),
        ])
    }

    pub fn len(&self) -> usize {
        self.crawlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crawlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrawlerDefinition> {
        self.crawlers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CrawlerDefinition> {
        self.crawlers.iter().find(|c| c.name == name)
    }

    /// Highest priority first; stable within a priority
    pub fn by_priority(&self) -> Vec<&CrawlerDefinition> {
        let mut crawlers: Vec<&CrawlerDefinition> = self.crawlers.iter().collect();
        crawlers.sort_by_key(|c| c.priority);
        crawlers
    }

    /// Crawlers whose schedule has elapsed, highest priority first
    pub fn due(
        &self,
        metadata: &HashMap<String, CrawlerMetadata>,
        now: DateTime<Utc>,
    ) -> Vec<&CrawlerDefinition> {
        self.by_priority()
            .into_iter()
            .filter(|c| {
                let last = metadata.get(&c.name).and_then(|m| m.last_processed);
                c.schedule.is_due(last, now)
            })
            .collect()
    }
}
