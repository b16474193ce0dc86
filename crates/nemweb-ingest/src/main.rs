//! NEMWEB Ingest - crawl and parse NEMWEB market data

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nemweb_common::logging::{init_logging, LogConfig, LogLevel};
use nemweb_ingest::crawler::{
    CrawlerDefinition, CrawlerSet, Orchestrator, RunOptions, SelectionMode, DEFAULT_LOOKBACK_DAYS,
};
use nemweb_ingest::dirlisting::DirlistingClient;
use nemweb_ingest::http::ReqwestTransport;
use nemweb_ingest::parser::parse_path;
use nemweb_ingest::store::{MemoryStore, PgStore};
use nemweb_ingest::{CrawlError, IngestConfig, SchemaRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "nemweb-ingest")]
#[command(author, version, about = "NEMWEB market data ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the configured crawlers
    Crawlers,

    /// Print a directory listing
    List {
        url: String,
    },

    /// Parse a local file and summarise its tables
    Parse {
        path: PathBuf,
    },

    /// Apply database migrations
    Migrate,

    /// Run one crawler
    Crawl(CrawlArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Crawler name, see `crawlers`
    name: String,

    #[command(flatten)]
    mode: ModeArgs,

    /// Lookback window for --latest
    #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
    lookback_days: u32,

    /// Worker pool width
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Keep results in memory instead of writing to DATABASE_URL
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct ModeArgs {
    /// Process the N most recently modified files
    #[arg(long)]
    limit: Option<usize>,

    /// Process every listed file
    #[arg(long)]
    full: bool,

    /// Process files for intervals missing from history
    #[arg(long)]
    latest: bool,
}

impl ModeArgs {
    fn selection_mode(&self, lookback_days: u32) -> Option<SelectionMode> {
        if self.latest {
            Some(SelectionMode::Latest { lookback_days })
        } else if let Some(n) = self.limit {
            Some(SelectionMode::Limit(n))
        } else if self.full {
            Some(SelectionMode::Full)
        } else {
            None
        }
    }
}

/// One row of the `crawlers` table
fn crawler_line(crawler: &CrawlerDefinition) -> String {
    format!(
        "{:<40} {:<8} {:<10} {:<14} {}",
        crawler.name,
        format!("{:?}", crawler.priority),
        crawler.bucket_size,
        crawler.selection_mode(),
        crawler.url.as_deref().unwrap_or("-")
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_level(log_level)
        .with_file_prefix("nemweb-ingest");
    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Crawlers => {
            for crawler in CrawlerSet::nemweb_defaults().by_priority() {
                println!("{}", crawler_line(crawler));
            }
        },
        Command::List { url } => {
            let transport = Arc::new(ReqwestTransport::new(&config)?);
            let listing = DirlistingClient::new(transport).fetch(&url).await?;
            for entry in &listing.entries {
                println!(
                    "{:<9} {:>10} {:<19} {:<19} {}",
                    if entry.is_directory() { "dir" } else { "file" },
                    entry.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
                    entry.modified.map(|m| m.to_string()).unwrap_or_default(),
                    entry.aemo_interval.map(|i| i.to_string()).unwrap_or_default(),
                    entry.name
                );
            }
            info!(entries = listing.len(), "Listing fetched");
        },
        Command::Parse { path } => {
            let registry = SchemaRegistry::with_defaults();
            let parsed = parse_path(&path, &registry)
                .with_context(|| format!("Failed to parse {}", path.display()))?;

            for report in &parsed.reports {
                println!("report {} {:?}", report.report_type, report.created);
            }
            for table in parsed.tables.tables() {
                println!(
                    "{:<40} fields={:<4} records={:<8} typed={}",
                    table.key(),
                    table.definition.field_count(),
                    table.records.len(),
                    table.schema().is_some()
                );
            }
            println!("{:?}", parsed.stats);
        },
        Command::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await?;
        },
        Command::Crawl(args) => crawl(args, config).await?,
    }

    Ok(())
}

async fn connect(config: &IngestConfig) -> Result<PgStore> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    Ok(PgStore::connect(url, config.database_max_connections).await?)
}

async fn crawl(args: CrawlArgs, config: IngestConfig) -> Result<()> {
    let crawlers = CrawlerSet::nemweb_defaults();
    let crawler = crawlers
        .get(&args.name)
        .ok_or_else(|| CrawlError::UnknownCrawler(args.name.clone()))?;

    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let orchestrator = if args.dry_run {
        Orchestrator::with_store(transport, Arc::new(MemoryStore::new()), config)
    } else {
        let store = connect(&config).await?;
        store.migrate().await?;
        Orchestrator::with_store(transport, Arc::new(store), config)
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, draining in-flight entries");
            on_signal.cancel();
        }
    });

    let mut options = RunOptions::default().with_cancel(cancel);
    if let Some(concurrency) = args.concurrency {
        options = options.with_concurrency(concurrency);
    }
    if let Some(mode) = args.mode.selection_mode(args.lookback_days) {
        options = options.with_mode(mode);
    }

    let summary = orchestrator.run(crawler, options).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
