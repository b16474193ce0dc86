//! Publication granularity of crawled files
//!
//! A crawler's bucket size defines the grid its crawl history is indexed on.
//! Sub-daily buckets are fixed durations; weeks start on Monday and months and
//! years step by calendar.

use chrono::{Datelike, Months, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::NemwebError;
use crate::network::Network;

/// Granularity a crawler's source files are published at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BucketSize {
    /// The network's raw interval (5 minutes on the NEM)
    #[default]
    Interval,
    HalfHour,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl BucketSize {
    /// Fixed width in minutes for sub-daily buckets
    fn fixed_minutes(self, network: Network) -> Option<i64> {
        match self {
            BucketSize::Interval => Some(network.interval().num_minutes().max(1)),
            BucketSize::HalfHour => Some(30),
            BucketSize::Hour => Some(60),
            _ => None,
        }
    }

    /// Floor a timestamp onto this bucket's grid
    pub fn floor(self, ts: NaiveDateTime, network: Network) -> NaiveDateTime {
        let midnight = ts.date().and_time(NaiveTime::MIN);

        if let Some(step) = self.fixed_minutes(network) {
            let minutes = (ts - midnight).num_minutes();
            return midnight + TimeDelta::minutes(minutes - minutes % step);
        }

        match self {
            BucketSize::Week => {
                midnight - TimeDelta::days(ts.weekday().num_days_from_monday() as i64)
            },
            BucketSize::Month => ts
                .date()
                .with_day(1)
                .map_or(midnight, |d| d.and_time(NaiveTime::MIN)),
            BucketSize::Year => ts
                .date()
                .with_ordinal(1)
                .map_or(midnight, |d| d.and_time(NaiveTime::MIN)),
            _ => midnight,
        }
    }

    /// The grid point one bucket before `ts`. `ts` is expected to be aligned.
    pub fn step_back(self, ts: NaiveDateTime, network: Network) -> Option<NaiveDateTime> {
        if let Some(step) = self.fixed_minutes(network) {
            return ts.checked_sub_signed(TimeDelta::minutes(step));
        }

        match self {
            BucketSize::Day => ts.checked_sub_signed(TimeDelta::days(1)),
            BucketSize::Week => ts.checked_sub_signed(TimeDelta::weeks(1)),
            BucketSize::Month => ts.checked_sub_months(Months::new(1)),
            BucketSize::Year => ts.checked_sub_months(Months::new(12)),
            _ => None,
        }
    }

    pub fn is_aligned(self, ts: NaiveDateTime, network: Network) -> bool {
        self.floor(ts, network) == ts
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketSize::Interval => "interval",
            BucketSize::HalfHour => "half_hour",
            BucketSize::Hour => "hour",
            BucketSize::Day => "day",
            BucketSize::Week => "week",
            BucketSize::Month => "month",
            BucketSize::Year => "year",
        }
    }
}

impl std::str::FromStr for BucketSize {
    type Err = NemwebError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interval" => Ok(BucketSize::Interval),
            "half_hour" | "30m" => Ok(BucketSize::HalfHour),
            "hour" | "1h" => Ok(BucketSize::Hour),
            "day" | "1d" => Ok(BucketSize::Day),
            "week" | "7d" => Ok(BucketSize::Week),
            "month" | "1m" => Ok(BucketSize::Month),
            "year" | "1y" => Ok(BucketSize::Year),
            _ => Err(NemwebError::UnknownBucketSize(s.to_string())),
        }
    }
}

impl std::fmt::Display for BucketSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}
