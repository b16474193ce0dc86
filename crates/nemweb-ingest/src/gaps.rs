//! Gap detection over crawl history
//!
//! The expected grid runs from "now" floored to the crawler's bucket back
//! over the lookback window. Anything on the grid the history store has not
//! recorded is a gap. Gaps come back most recent first, so backfill works
//! from the present backwards.

use chrono::{NaiveDateTime, TimeDelta};
use nemweb_common::{BucketSize, Network};
use std::collections::BTreeSet;
use tracing::debug;

use crate::store::{CrawlHistoryStore, StoreError};

/// Grid points covering the lookback window, newest first
pub fn interval_grid(
    bucket: BucketSize,
    network: Network,
    now: NaiveDateTime,
    lookback_days: u32,
) -> Vec<NaiveDateTime> {
    let newest = bucket.floor(now, network);
    let Some(window_start) = newest.checked_sub_signed(TimeDelta::days(i64::from(lookback_days)))
    else {
        return vec![newest];
    };

    let mut grid = Vec::new();
    let mut point = Some(newest);
    while let Some(ts) = point {
        if ts < window_start {
            break;
        }
        grid.push(ts);
        point = bucket.step_back(ts, network);
    }
    grid
}

/// Grid intervals with no recorded history, newest first
pub async fn missing_intervals(
    history: &dyn CrawlHistoryStore,
    crawler_name: &str,
    bucket: BucketSize,
    network: Network,
    lookback_days: u32,
    now: NaiveDateTime,
) -> Result<Vec<NaiveDateTime>, StoreError> {
    let grid = interval_grid(bucket, network, now, lookback_days);
    let (Some(&newest), Some(&oldest)) = (grid.first(), grid.last()) else {
        return Ok(Vec::new());
    };

    let covered: BTreeSet<NaiveDateTime> = history
        .covered_intervals(crawler_name, oldest, newest)
        .await?;

    let missing: Vec<NaiveDateTime> = grid
        .into_iter()
        .filter(|ts| !covered.contains(ts))
        .collect();

    debug!(
        crawler = %crawler_name,
        bucket = %bucket,
        expected = covered.len() + missing.len(),
        covered = covered.len(),
        missing = missing.len(),
        "Computed missing intervals"
    );

    Ok(missing)
}
