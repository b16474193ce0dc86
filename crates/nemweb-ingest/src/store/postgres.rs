//! Postgres-backed stores
//!
//! Rows are shipped as one JSON array per statement and expanded server side
//! with `jsonb_populate_recordset`, so a batch is a single round trip
//! regardless of table shape.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{
    dedupe_rows, validate_identifier, CrawlHistoryEntry, CrawlHistoryStore, CrawlerMetadata,
    CrawlerMetadataStore, MetadataUpdate, RecordSink, Row, StoreError,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to database");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Most recent history rows for a crawler
    pub async fn history(
        &self,
        crawler_name: &str,
        limit: i64,
    ) -> Result<Vec<CrawlHistoryEntry>, StoreError> {
        let entries = sqlx::query_as::<_, CrawlHistoryEntry>(
            "SELECT crawler_name, interval_start, records FROM crawl_history \
             WHERE crawler_name = $1 ORDER BY interval_start DESC LIMIT $2",
        )
        .bind(crawler_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

/// Build the upsert statement for a batch
fn upsert_sql(
    table: &str,
    columns: &[&str],
    conflict_key: &[&str],
    update_fields: &[&str],
) -> Result<String, StoreError> {
    validate_identifier(table)?;
    for column in columns.iter().chain(conflict_key).chain(update_fields) {
        validate_identifier(column)?;
    }

    let column_list = columns.join(", ");
    let on_conflict = if update_fields.is_empty() {
        String::from("DO NOTHING")
    } else {
        let assignments: Vec<String> = update_fields
            .iter()
            .map(|f| format!("{f} = EXCLUDED.{f}"))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    Ok(format!(
        "INSERT INTO {table} ({column_list}) \
         SELECT {column_list} FROM jsonb_populate_recordset(NULL::{table}, $1) \
         ON CONFLICT ({}) {on_conflict}",
        conflict_key.join(", ")
    ))
}

#[async_trait]
impl RecordSink for PgStore {
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_key: &[&str],
        update_fields: &[&str],
    ) -> Result<u64, StoreError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };

        let rows = dedupe_rows(rows, conflict_key)?;
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        let sql = upsert_sql(table, &columns, conflict_key, update_fields)?;

        let result = sqlx::query(&sql)
            .bind(Json(&rows))
            .execute(&self.pool)
            .await?;

        debug!(table, rows = rows.len(), written = result.rows_affected(), "Upserted");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CrawlHistoryStore for PgStore {
    async fn record_history(
        &self,
        crawler_name: &str,
        interval: NaiveDateTime,
        records: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO crawl_history (crawler_name, interval_start, records, inserted_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (crawler_name, interval_start) \
             DO UPDATE SET records = EXCLUDED.records, inserted_at = now()",
        )
        .bind(crawler_name)
        .bind(interval)
        .bind(i64::try_from(records).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn covered_intervals(
        &self,
        crawler_name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<BTreeSet<NaiveDateTime>, StoreError> {
        let intervals = sqlx::query_scalar::<_, NaiveDateTime>(
            "SELECT interval_start FROM crawl_history \
             WHERE crawler_name = $1 AND interval_start >= $2 AND interval_start <= $3",
        )
        .bind(crawler_name)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(intervals.into_iter().collect())
    }
}

#[async_trait]
impl CrawlerMetadataStore for PgStore {
    async fn get_metadata(&self, crawler_name: &str) -> Result<Option<CrawlerMetadata>, StoreError> {
        let metadata = sqlx::query_as::<_, CrawlerMetadata>(
            "SELECT crawler_name, last_crawled, last_processed, server_latest \
             FROM crawler_meta WHERE crawler_name = $1",
        )
        .bind(crawler_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metadata)
    }

    async fn advance(&self, update: &MetadataUpdate) -> Result<CrawlerMetadata, StoreError> {
        let metadata = sqlx::query_as::<_, CrawlerMetadata>(
            "INSERT INTO crawler_meta (crawler_name, last_crawled, last_processed, server_latest) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (crawler_name) DO UPDATE SET \
                 last_crawled = GREATEST(crawler_meta.last_crawled, EXCLUDED.last_crawled), \
                 last_processed = EXCLUDED.last_processed, \
                 server_latest = COALESCE(EXCLUDED.server_latest, crawler_meta.server_latest) \
             RETURNING crawler_name, last_crawled, last_processed, server_latest",
        )
        .bind(&update.crawler_name)
        .bind(update.last_crawled)
        .bind(update.processed_at)
        .bind(update.server_latest)
        .fetch_one(&self.pool)
        .await?;
        Ok(metadata)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sql_shape() {
        let sql = upsert_sql(
            "dispatch_unit_scada",
            &["settlementdate", "duid", "scadavalue"],
            &["settlementdate", "duid"],
            &["scadavalue"],
        )
        .unwrap();

        assert!(sql.starts_with(
            "INSERT INTO dispatch_unit_scada (settlementdate, duid, scadavalue) SELECT"
        ));
        assert!(sql.contains("jsonb_populate_recordset(NULL::dispatch_unit_scada, $1)"));
        assert!(sql.ends_with(
            "ON CONFLICT (settlementdate, duid) DO UPDATE SET scadavalue = EXCLUDED.scadavalue"
        ));
    }

    #[test]
    fn test_upsert_sql_without_updates() {
        let sql = upsert_sql("t", &["a"], &["a"], &[]).unwrap();
        assert!(sql.ends_with("ON CONFLICT (a) DO NOTHING"));
    }

    #[test]
    fn test_upsert_sql_rejects_bad_identifiers() {
        assert!(upsert_sql("t; drop", &["a"], &["a"], &[]).is_err());
        assert!(upsert_sql("t", &["a\"b"], &["a"], &[]).is_err());
    }
}
