//! Multi-table MMS file parser
//!
//! ```rust,ignore
//! let registry = SchemaRegistry::with_defaults();
//! let parsed = parse_bytes(&body, "PUBLIC_DISPATCHSCADA_202206130025_0000000365048508.zip", &registry)?;
//! for table in parsed.tables.tables() {
//!     println!("{} -> {} records", table.key(), table.records.len());
//! }
//! ```

mod reader;
mod source;
mod table;

pub use reader::{MmsReader, ParseStats, ParsedReport};
pub use source::{is_zip, MAX_ARCHIVE_DEPTH};
pub use table::{table_key, Table, TableDefinition, TableRecord, TableSet};

use std::path::Path;
use thiserror::Error;

use crate::schema::SchemaRegistry;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive {0} is nested too deeply")]
    ArchiveDepth(String),
}

/// Everything one parsing session produced
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub tables: TableSet,
    pub stats: ParseStats,
    pub reports: Vec<ParsedReport>,
}

impl ParsedFile {
    fn collect(tables: TableSet, reader: MmsReader<'_>) -> Self {
        let (stats, reports) = reader.into_parts();
        Self {
            tables,
            stats,
            reports,
        }
    }
}

/// Parse text content into a fresh table set
pub fn parse_str(content: &str, registry: &SchemaRegistry) -> Result<ParsedFile, ParseError> {
    let mut tables = TableSet::new();
    let mut reader = MmsReader::new(registry);
    reader.read_str(content, &mut tables)?;
    Ok(ParsedFile::collect(tables, reader))
}

/// Parse an in-memory file (plain or zipped) into a fresh table set
pub fn parse_bytes(
    bytes: &[u8],
    name: &str,
    registry: &SchemaRegistry,
) -> Result<ParsedFile, ParseError> {
    let mut tables = TableSet::new();
    let mut reader = MmsReader::new(registry);
    reader.read_bytes(bytes, name, &mut tables)?;
    Ok(ParsedFile::collect(tables, reader))
}

/// Stream-parse a file on disk (plain or zipped) into a fresh table set
pub fn parse_path(path: &Path, registry: &SchemaRegistry) -> Result<ParsedFile, ParseError> {
    let mut tables = TableSet::new();
    let mut reader = MmsReader::new(registry);
    reader.read_path(path, &mut tables)?;
    Ok(ParsedFile::collect(tables, reader))
}
