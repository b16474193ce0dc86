//! Ingestion configuration
//!
//! Loaded from `NEMWEB_*` environment variables (and a `.env` file when
//! present).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of entries processed concurrently in one run.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Files larger than this are downloaded to disk and stream-parsed.
pub const DEFAULT_LARGE_FILE_THRESHOLD_BYTES: u64 = 100_000;

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default number of attempts per HTTP request.
pub const DEFAULT_HTTP_MAX_RETRIES: u32 = 3;

/// Default number of records per upsert statement.
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 5_000;

pub const DEFAULT_USER_AGENT: &str = "nemweb-ingest/0.1";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Worker pool width per run
    pub concurrency: usize,
    pub large_file_threshold_bytes: u64,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub user_agent: String,
    /// Parent directory for per-download temp dirs (system temp if unset)
    pub temp_dir: Option<PathBuf>,
    pub upsert_batch_size: usize,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            large_file_threshold_bytes: DEFAULT_LARGE_FILE_THRESHOLD_BYTES,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            http_max_retries: DEFAULT_HTTP_MAX_RETRIES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            temp_dir: None,
            upsert_batch_size: DEFAULT_UPSERT_BATCH_SIZE,
            database_url: None,
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            concurrency: env_parse("NEMWEB_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            large_file_threshold_bytes: env_parse("NEMWEB_LARGE_FILE_THRESHOLD_BYTES")?
                .unwrap_or(defaults.large_file_threshold_bytes),
            http_timeout_secs: env_parse("NEMWEB_HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout_secs),
            http_max_retries: env_parse("NEMWEB_HTTP_MAX_RETRIES")?
                .unwrap_or(defaults.http_max_retries),
            user_agent: std::env::var("NEMWEB_USER_AGENT").unwrap_or(defaults.user_agent),
            temp_dir: std::env::var("NEMWEB_TEMP_DIR").ok().map(PathBuf::from),
            upsert_batch_size: env_parse("NEMWEB_UPSERT_BATCH_SIZE")?
                .unwrap_or(defaults.upsert_batch_size),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("NEMWEB_CONCURRENCY must be greater than 0");
        }
        if self.upsert_batch_size == 0 {
            anyhow::bail!("NEMWEB_UPSERT_BATCH_SIZE must be greater than 0");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("NEMWEB_HTTP_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

/// Read and parse an optional variable; a set but malformed value is an error
fn env_parse<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    parse_value(key, std::env::var(key).ok().as_deref())
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: Option<&str>) -> anyhow::Result<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{key} has invalid value {value:?}")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.large_file_threshold_bytes, 100_000);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let err = parse_value::<usize>("NEMWEB_CONCURRENCY", Some("ten")).unwrap_err();
        assert!(err.to_string().contains("NEMWEB_CONCURRENCY"));
        assert!(parse_value::<u32>("NEMWEB_HTTP_MAX_RETRIES", Some("-1")).is_err());

        assert_eq!(parse_value::<usize>("NEMWEB_CONCURRENCY", Some(" 4 ")).unwrap(), Some(4));
        assert_eq!(parse_value::<usize>("NEMWEB_CONCURRENCY", Some("")).unwrap(), None);
        assert_eq!(parse_value::<usize>("NEMWEB_CONCURRENCY", None).unwrap(), None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = IngestConfig {
            concurrency: 0,
            ..IngestConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
