//! Per-table schemas
//!
//! A [`SchemaRegistry`] maps `namespace_tablename` to a [`TableSchema`],
//! which validates raw parser records, converts them to typed rows and
//! describes how they are upserted (target table, conflict key, fields to
//! overwrite). Tables without a registered schema are passed through
//! untyped; that is a normal outcome, not an error.

mod tables;

pub use tables::{
    builtin_schemas, DispatchInterconnectorRes, DispatchPrice, DispatchRegionSum,
    DispatchUnitScada, RooftopActual, TradingPrice,
};

use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::parser::TableRecord;

/// Timestamp layout used throughout MMS data files
pub const AEMO_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Layout timestamps are converted to for typed rows and storage
pub const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Integer,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    /// Convert one raw value. Blank and absent values become `null`
    /// unless the field is required.
    pub fn convert(&self, raw: Option<&str>) -> Result<Value, FieldError> {
        let value = raw.map(str::trim).unwrap_or_default();

        if value.is_empty() {
            if self.required {
                return Err(self.error(value, "required value is missing"));
            }
            return Ok(Value::Null);
        }

        match self.kind {
            FieldKind::Text => Ok(Value::String(value.to_string())),
            FieldKind::Decimal => value
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.error(value, "not a decimal")),
            FieldKind::Integer => value
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| self.error(value, "not an integer")),
            FieldKind::Timestamp => parse_aemo_timestamp(value)
                .map(|ts| Value::String(ts.format(ISO_TIMESTAMP_FORMAT).to_string()))
                .ok_or_else(|| self.error(value, "not a YYYY/MM/DD HH:MM:SS timestamp")),
        }
    }

    fn error(&self, value: &str, reason: &str) -> FieldError {
        FieldError {
            field: self.name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub fn parse_aemo_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), AEMO_TIMESTAMP_FORMAT).ok()
}

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field {field} = {value:?}: {reason}")]
pub struct FieldError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema {table}: {column} is not a declared field")]
    UnknownColumn { table: String, column: String },

    #[error("schema {0} declares no conflict key")]
    MissingConflictKey(String),
}

/// Typed view of one MMS table
pub trait TableSchema: Send + Sync + fmt::Debug {
    /// `namespace_tablename`, lowercase
    fn table_key(&self) -> &str;

    fn fields(&self) -> &[FieldSpec];

    /// Natural key used for idempotent upserts
    fn conflict_key(&self) -> &[&'static str];

    /// Fields overwritten when a conflicting row already exists
    fn update_fields(&self) -> &[&'static str];

    /// Storage table name
    fn target_table(&self) -> &str;

    /// Every field error in `record`; empty means valid
    fn validate(&self, record: &TableRecord) -> Vec<FieldError> {
        self.fields()
            .iter()
            .filter_map(|spec| spec.convert(record.get(spec.name)).err())
            .collect()
    }

    /// Convert to a typed JSON row holding only the declared fields
    fn to_row(&self, record: &TableRecord) -> Result<Map<String, Value>, FieldError> {
        self.fields()
            .iter()
            .map(|spec| Ok((spec.name.to_string(), spec.convert(record.get(spec.name))?)))
            .collect()
    }

    /// Check the key lists refer to declared fields
    fn check(&self) -> Result<(), SchemaError> {
        if self.conflict_key().is_empty() {
            return Err(SchemaError::MissingConflictKey(self.table_key().to_string()));
        }

        for column in self.conflict_key().iter().chain(self.update_fields()) {
            if !self.fields().iter().any(|f| f.name == *column) {
                return Err(SchemaError::UnknownColumn {
                    table: self.table_key().to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A schema declared with static tables
#[derive(Debug, Clone)]
pub struct StaticSchema {
    pub key: &'static str,
    pub target: &'static str,
    pub fields: &'static [FieldSpec],
    pub conflict_key: &'static [&'static str],
    pub update_fields: &'static [&'static str],
}

impl TableSchema for StaticSchema {
    fn table_key(&self) -> &str {
        self.key
    }

    fn fields(&self) -> &[FieldSpec] {
        self.fields
    }

    fn conflict_key(&self) -> &[&'static str] {
        self.conflict_key
    }

    fn update_fields(&self) -> &[&'static str] {
        self.update_fields
    }

    fn target_table(&self) -> &str {
        self.target
    }
}

/// Lookup from table key to schema
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<dyn TableSchema>>,
}

impl SchemaRegistry {
    /// An empty registry; every table passes through untyped
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in NEMWEB tables
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for schema in builtin_schemas() {
            // Built-ins are covered by tests; a failure here is a coding error
            if let Err(e) = registry.register(schema) {
                tracing::error!(error = %e, "Invalid built-in schema");
            }
        }
        registry
    }

    /// Add or replace a schema
    pub fn register(&mut self, schema: Arc<dyn TableSchema>) -> Result<(), SchemaError> {
        schema.check()?;
        self.schemas
            .insert(schema.table_key().to_lowercase(), schema);
        Ok(())
    }

    pub fn get(&self, table_key: &str) -> Option<Arc<dyn TableSchema>> {
        self.schemas.get(&table_key.to_lowercase()).cloned()
    }

    pub fn contains(&self, table_key: &str) -> bool {
        self.schemas.contains_key(&table_key.to_lowercase())
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> TableRecord {
        let fields: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        TableRecord::new(fields.into(), values).unwrap()
    }

    #[test]
    fn test_defaults_registered() {
        let registry = SchemaRegistry::with_defaults();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains("DISPATCH_UNIT_SCADA"));
        assert!(registry.get("dispatch_price").is_some());
        assert!(registry.get("dispatch_case_solution").is_none());
    }

    #[test]
    fn test_field_conversion() {
        let ts = FieldSpec::required("settlementdate", FieldKind::Timestamp);
        assert_eq!(
            ts.convert(Some("2022/06/13 00:25:00")).unwrap(),
            Value::String("2022-06-13T00:25:00".into())
        );
        assert!(ts.convert(Some("13/06/2022")).is_err());
        assert!(ts.convert(None).is_err());

        let optional = FieldSpec::optional("eep", FieldKind::Decimal);
        assert_eq!(optional.convert(Some("  ")).unwrap(), Value::Null);
        assert_eq!(optional.convert(Some("1.5")).unwrap(), serde_json::json!(1.5));
        assert!(optional.convert(Some("abc")).is_err());

        let integer = FieldSpec::required("runno", FieldKind::Integer);
        assert_eq!(integer.convert(Some("1")).unwrap(), serde_json::json!(1));
        assert!(integer.convert(Some("1.5")).is_err());
    }

    #[test]
    fn test_validate_reports_each_bad_field() {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.get("dispatch_unit_scada").unwrap();

        let bad = record(&[
            ("settlementdate", "yesterday"),
            ("duid", "BW01"),
            ("scadavalue", "n/a"),
        ]);
        let errors = schema.validate(&bad);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "settlementdate");
        assert_eq!(errors[1].field, "scadavalue");
    }

    #[test]
    fn test_to_row_keeps_declared_fields_only() {
        let registry = SchemaRegistry::with_defaults();
        let schema = registry.get("dispatch_unit_scada").unwrap();
        let row = schema
            .to_row(&record(&[
                ("settlementdate", "2022/06/13 00:25:00"),
                ("duid", "BW01"),
                ("scadavalue", "660.5"),
                ("lastchanged", "2022/06/13 00:20:00"),
            ]))
            .unwrap();

        assert_eq!(row.len(), 3);
        assert_eq!(row["duid"], "BW01");
    }

    #[test]
    fn test_check_rejects_undeclared_key() {
        static FIELDS: [FieldSpec; 1] = [FieldSpec::required("a", FieldKind::Text)];
        let schema = StaticSchema {
            key: "x_y",
            target: "x_y",
            fields: &FIELDS,
            conflict_key: &["b"],
            update_fields: &[],
        };
        assert!(matches!(schema.check(), Err(SchemaError::UnknownColumn { .. })));

        let mut registry = SchemaRegistry::new();
        assert!(registry.register(Arc::new(schema)).is_err());
        assert!(registry.is_empty());
    }
}
