//! Record-tagged MMS reader
//!
//! Every line starts with a tag: `C` (comment / report boundary), `I` (table
//! definition) or `D` (data for the most recently defined table). The reader
//! is a single-pass state machine; line order within a file matters and
//! is preserved.
//!
//! Malformed input is recovered at the smallest granularity: a bad row is
//! skipped and logged, the rest of the file still parses. Only I/O failures
//! abort.

use chrono::NaiveDateTime;
use std::io::Read;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, warn};

use super::table::{table_key, TableDefinition, TableRecord, TableSet};
use super::ParseError;
use crate::schema::SchemaRegistry;

const END_OF_REPORT: &str = "END OF REPORT";

/// Counters for one parsing session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Rows read, all tags
    pub lines: usize,
    /// `I` rows accepted
    pub tables: usize,
    /// Records added to the table set
    pub records: usize,
    /// `D` rows dropped (no active table, field-count mismatch, invalid)
    pub rejected_rows: usize,
    /// Rows with an unknown tag or an unusable `I` row
    pub skipped_lines: usize,
}

impl AddAssign for ParseStats {
    fn add_assign(&mut self, other: Self) {
        self.lines += other.lines;
        self.tables += other.tables;
        self.records += other.records;
        self.rejected_rows += other.rejected_rows;
        self.skipped_lines += other.skipped_lines;
    }
}

/// Report metadata from a file's leading `C` row
///
/// `C,NEMP.WORLD,DISPATCHSCADA,AEMO,PUBLIC,2022/06/13,00:25:14,0000000365048508,DISPATCHSCADA,0000000365048502`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub report_type: String,
    pub report_subtype: Option<String>,
    pub created: Option<NaiveDateTime>,
}

impl ParsedReport {
    fn from_header(row: &[String]) -> Option<Self> {
        let report_type = row.get(2).map(|s| s.trim()).filter(|s| !s.is_empty())?;

        let created = match (row.get(5), row.get(6)) {
            (Some(date), Some(time)) => NaiveDateTime::parse_from_str(
                &format!("{} {}", date.trim(), time.trim()),
                "%Y/%m/%d %H:%M:%S",
            )
            .ok(),
            _ => None,
        };

        Some(Self {
            report_type: report_type.to_string(),
            report_subtype: row
                .get(8)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            created,
        })
    }
}

#[derive(Debug, Clone)]
enum ParserState {
    NoTable,
    InTable { key: String, fields: Arc<[String]> },
}

/// Parsing session over one or more files
///
/// Tables accumulate into the caller's [`TableSet`]; a table defined again in
/// a later file continues the existing one.
pub struct MmsReader<'r> {
    registry: &'r SchemaRegistry,
    state: ParserState,
    stats: ParseStats,
    reports: Vec<ParsedReport>,
    source: String,
}

impl<'r> MmsReader<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            state: ParserState::NoTable,
            stats: ParseStats::default(),
            reports: Vec::new(),
            source: String::new(),
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn reports(&self) -> &[ParsedReport] {
        &self.reports
    }

    pub fn into_parts(self) -> (ParseStats, Vec<ParsedReport>) {
        (self.stats, self.reports)
    }

    /// Name used in log lines for the file being read
    pub(crate) fn set_source(&mut self, name: &str) {
        self.source = name.to_string();
    }

    /// Read one file's rows into `tables`
    pub fn read<R: Read>(&mut self, input: R, tables: &mut TableSet) -> Result<(), ParseError> {
        self.state = ParserState::NoTable;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut first = true;
        for result in reader.byte_records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!(source = %self.source, error = %e, "Skipping unreadable row");
                    self.stats.skipped_lines += 1;
                    continue;
                },
            };

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let row: Vec<String> = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();

            self.process_row(&row, line, first, tables);
            first = false;
        }

        debug!(
            source = %self.source,
            lines = self.stats.lines,
            records = self.stats.records,
            "Finished reading"
        );
        Ok(())
    }

    fn process_row(&mut self, row: &[String], line: u64, first: bool, tables: &mut TableSet) {
        self.stats.lines += 1;

        let tag = row.first().map(|s| s.trim()).unwrap_or_default();
        match tag {
            "I" | "i" => self.define_table(row, line, tables),
            "D" | "d" => self.push_record(row, line, tables),
            "C" | "c" => self.comment(row, first),
            _ => {
                warn!(source = %self.source, line, tag, "Skipping row with unknown record type");
                self.stats.skipped_lines += 1;
            },
        }
    }

    fn comment(&mut self, row: &[String], first: bool) {
        self.state = ParserState::NoTable;

        if row
            .get(1)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case(END_OF_REPORT))
        {
            debug!(source = %self.source, "End of report");
            return;
        }

        if first {
            if let Some(report) = ParsedReport::from_header(row) {
                debug!(
                    source = %self.source,
                    report_type = %report.report_type,
                    "Report header"
                );
                self.reports.push(report);
            }
        }
    }

    fn define_table(&mut self, row: &[String], line: u64, tables: &mut TableSet) {
        let namespace = row.get(1).map(|s| s.trim()).unwrap_or_default();
        let name = row.get(2).map(|s| s.trim()).unwrap_or_default();

        let fields: Vec<String> = row
            .iter()
            .skip(4)
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        if namespace.is_empty() || name.is_empty() || fields.is_empty() {
            warn!(source = %self.source, line, "Skipping incomplete table definition");
            self.stats.skipped_lines += 1;
            self.state = ParserState::NoTable;
            return;
        }

        let key = table_key(namespace, name);
        let fields: Arc<[String]> = fields.into();

        match tables.get_mut(&key) {
            Some(existing) => {
                if existing.definition.fields != fields {
                    debug!(
                        source = %self.source,
                        table = %key,
                        "Table redefined with a different field list"
                    );
                    existing.definition.fields = fields.clone();
                }
            },
            None => {
                let mut definition = TableDefinition::new(namespace, name, fields.clone());
                definition.schema = self.registry.get(&key);
                debug!(
                    source = %self.source,
                    table = %key,
                    fields = fields.len(),
                    typed = definition.schema.is_some(),
                    "Table defined"
                );
                tables.ensure_table(definition);
            },
        }

        self.stats.tables += 1;
        self.state = ParserState::InTable { key, fields };
    }

    fn push_record(&mut self, row: &[String], line: u64, tables: &mut TableSet) {
        let ParserState::InTable { key, fields } = &self.state else {
            warn!(source = %self.source, line, "Rejecting data row before any table definition");
            self.stats.rejected_rows += 1;
            return;
        };

        let values: Vec<String> = row.iter().skip(4).cloned().collect();
        let value_count = values.len();

        let Some(record) = TableRecord::new(fields.clone(), values) else {
            warn!(
                source = %self.source,
                line,
                table = %key,
                expected = fields.len(),
                found = value_count,
                "Rejecting data row with mismatched field count"
            );
            self.stats.rejected_rows += 1;
            return;
        };

        let Some(table) = tables.get_mut(key) else {
            self.stats.rejected_rows += 1;
            return;
        };

        if let Some(schema) = table.schema() {
            let errors = schema.validate(&record);
            if !errors.is_empty() {
                for error in &errors {
                    warn!(
                        source = %self.source,
                        line,
                        table = %key,
                        field = %error.field,
                        value = %error.value,
                        reason = %error.reason,
                        "Rejecting invalid record"
                    );
                }
                self.stats.rejected_rows += 1;
                return;
            }
        }

        table.records.push(record);
        self.stats.records += 1;
    }
}
