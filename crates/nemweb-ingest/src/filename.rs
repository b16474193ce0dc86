//! AEMO filename metadata
//!
//! NEMWEB publishes files as `<REPORT_NAME>_<DATE>[_<SEQUENCE>].<zip|csv>`,
//! e.g. `PUBLIC_DISPATCHSCADA_202206130025_0000000365048508.zip`. The date
//! token is the interval (or trading day) the file covers, in network market
//! time.
//!
//! Parsing is strict: callers that iterate over listings treat a
//! [`FilenameError`] as "not an AEMO data file" and skip the entry.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use nemweb_common::{BucketSize, Network};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

#[allow(clippy::expect_used)]
static AEMO_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<base>.+?)_(?P<date>\d{6,14})(?:_(?P<seq>\d{8,16}))?\.(?P<ext>zip|csv)$")
        .expect("AEMO filename pattern compiles")
});

/// Date token layouts, tried in order
const DATE_FORMATS: [(&str, usize); 3] = [("%Y%m%d", 8), ("%Y%m%d%H%M", 12), ("%Y%m%d%H%M%S", 14)];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("filename does not match the AEMO convention: {0}")]
    Parse(String),

    #[error("unrecognised date token {token} in {filename}")]
    DateParse { filename: String, token: String },
}

/// Metadata recovered from an AEMO filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AemoFilename {
    pub base_name: String,
    pub date_token: String,
    pub sequence_token: Option<String>,
    /// Extension as written on the server (case preserved)
    pub extension: String,
    /// The date token resolved to naive market time
    pub timestamp: NaiveDateTime,
}

impl AemoFilename {
    /// Parse a filename (or the last segment of a path / URL)
    pub fn parse(name: &str) -> Result<Self, FilenameError> {
        let name = name.rsplit('/').next().unwrap_or(name);

        let captures = AEMO_FILENAME
            .captures(name)
            .ok_or_else(|| FilenameError::Parse(name.to_string()))?;

        let date_token = captures["date"].to_string();
        let timestamp = parse_date_token(&date_token).ok_or_else(|| FilenameError::DateParse {
            filename: name.to_string(),
            token: date_token.clone(),
        })?;

        Ok(Self {
            base_name: captures["base"].to_string(),
            date_token,
            sequence_token: captures.name("seq").map(|m| m.as_str().to_string()),
            extension: captures["ext"].to_string(),
            timestamp,
        })
    }

    /// Resolve the timestamp in a network's market timezone
    pub fn timestamp_in(&self, network: Network) -> DateTime<FixedOffset> {
        network.localize(self.timestamp)
    }

    /// Day-stamped files are daily aggregates; anything with a time of day
    /// is a per-interval file.
    pub fn inferred_bucket(&self) -> BucketSize {
        if self.date_token.len() == 8 {
            BucketSize::Day
        } else {
            BucketSize::Interval
        }
    }

    pub fn is_zip(&self) -> bool {
        self.extension.eq_ignore_ascii_case("zip")
    }

    /// Rebuild the filename from its parts
    pub fn to_filename(&self) -> String {
        match &self.sequence_token {
            Some(seq) => format!("{}_{}_{}.{}", self.base_name, self.date_token, seq, self.extension),
            None => format!("{}_{}.{}", self.base_name, self.date_token, self.extension),
        }
    }
}

/// Resolve an AEMO date token. The first layout that parses wins.
pub fn parse_date_token(token: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .filter(|(_, len)| token.len() == *len)
        .find_map(|(format, len)| {
            if *len == 8 {
                NaiveDate::parse_from_str(token, format)
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            } else {
                NaiveDateTime::parse_from_str(token, format).ok()
            }
        })
}

/// Convenience for listing filters: the covered timestamp, if any
pub fn interval_timestamp(name: &str) -> Option<NaiveDateTime> {
    AemoFilename::parse(name).ok().map(|f| f.timestamp)
}
