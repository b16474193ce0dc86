//! Tables produced by the MMS parser

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::{FieldError, TableSchema};

/// Structure of one table, from its `I` row
///
/// Identity is `(namespace, name)`; both are stored lowercase so lookups
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub namespace: String,
    pub name: String,
    /// Ordered, trimmed, lowercase field names
    pub fields: Arc<[String]>,
    pub schema: Option<Arc<dyn TableSchema>>,
}

impl TableDefinition {
    pub fn new(namespace: &str, name: &str, fields: impl Into<Arc<[String]>>) -> Self {
        Self {
            namespace: namespace.trim().to_lowercase(),
            name: name.trim().to_lowercase(),
            fields: fields.into(),
            schema: None,
        }
    }

    /// `namespace_tablename`, the key tables are indexed and registered by
    pub fn key(&self) -> String {
        table_key(&self.namespace, &self.name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

pub fn table_key(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace.trim(), name.trim()).to_lowercase()
}

/// One `D` row zipped against its table's fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    fields: Arc<[String]>,
    values: Vec<String>,
}

impl TableRecord {
    /// Zip values against fields. Lengths must match.
    pub fn new(fields: Arc<[String]>, values: Vec<String>) -> Option<Self> {
        (fields.len() == values.len()).then_some(Self { fields, values })
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .position(|f| f.eq_ignore_ascii_case(field))
            .map(|i| self.values[i].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw string mapping, keyed by lowercase field name
    pub fn to_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Raw values as a JSON object of strings
    pub fn to_json(&self) -> Map<String, Value> {
        self.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    /// Promote to a typed record via `schema`'s conversions
    pub fn decode<T: DeserializeOwned>(&self, schema: &dyn TableSchema) -> Result<T, FieldError> {
        let row = schema.to_row(self)?;
        serde_json::from_value(Value::Object(row)).map_err(|e| FieldError {
            field: String::from("*"),
            value: String::new(),
            reason: e.to_string(),
        })
    }
}

/// A table definition and the records accumulated for it
#[derive(Debug, Clone)]
pub struct Table {
    pub definition: TableDefinition,
    pub records: Vec<TableRecord>,
}

impl Table {
    pub fn key(&self) -> String {
        self.definition.key()
    }

    pub fn schema(&self) -> Option<&Arc<dyn TableSchema>> {
        self.definition.schema.as_ref()
    }

    /// Promote records to typed rows through the attached schema
    ///
    /// Without a schema there is no typed form and nothing is returned.
    pub fn decode<T: DeserializeOwned>(&self) -> Vec<Result<T, FieldError>> {
        let Some(schema) = self.schema() else {
            return Vec::new();
        };

        self.records
            .iter()
            .map(|record| record.decode(schema.as_ref()))
            .collect()
    }
}

/// Ordered collection of tables from one parsing session
///
/// Tables are keyed by `namespace_tablename`. Merging appends records;
/// duplicates are resolved downstream by the upsert conflict key.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<Table>,
    index: HashMap<String, usize>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Table> {
        self.index.get(&key.to_lowercase()).map(|&i| &self.tables[i])
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Table> {
        match self.index.get(&key.to_lowercase()) {
            Some(&i) => Some(&mut self.tables[i]),
            None => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(&key.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(Table::key).collect()
    }

    pub fn total_records(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }

    /// Insert a table definition, or return the existing table with that key
    pub fn ensure_table(&mut self, definition: TableDefinition) -> &mut Table {
        let key = definition.key();
        let idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.tables.push(Table {
                    definition,
                    records: Vec::new(),
                });
                let i = self.tables.len() - 1;
                self.index.insert(key, i);
                i
            },
        };
        &mut self.tables[idx]
    }

    /// Append another set's tables onto this one
    pub fn merge(&mut self, other: TableSet) {
        for table in other.tables {
            let Table {
                definition,
                records,
            } = table;
            self.ensure_table(definition).records.extend(records);
        }
    }

    pub fn into_tables(self) -> Vec<Table> {
        self.tables
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|s| s.to_string()).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_record_rejects_length_mismatch() {
        let f = fields(&["a", "b", "c"]);
        assert!(TableRecord::new(f.clone(), vec!["1".into(), "2".into()]).is_none());
        assert!(TableRecord::new(f, vec!["1".into(), "2".into(), "3".into()]).is_some());
    }

    #[test]
    fn test_record_lookup_is_case_insensitive() {
        let record = TableRecord::new(fields(&["duid"]), vec!["BW01".into()]).unwrap();
        assert_eq!(record.get("DUID"), Some("BW01"));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_merge_appends_records() {
        let def = TableDefinition::new("DISPATCH", "UNIT_SCADA", vec!["duid".to_string()]);
        let mut left = TableSet::new();
        left.ensure_table(def.clone())
            .records
            .push(TableRecord::new(def.fields.clone(), vec!["A".into()]).unwrap());

        let mut right = TableSet::new();
        right
            .ensure_table(def.clone())
            .records
            .push(TableRecord::new(def.fields.clone(), vec!["A".into()]).unwrap());

        left.merge(right);
        assert_eq!(left.len(), 1);
        assert_eq!(left.get("DISPATCH_UNIT_SCADA").unwrap().records.len(), 2);
    }
}
