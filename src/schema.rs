//! Catalog coordinates and table schema.
//!
//! These types are immutable once a channel opens; reopening is required to
//! pick up a schema change.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifies a database/schema/name triple in the service's catalog. Used
/// for tables, pipes, and channels alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaObjectCoords {
    pub database: String,
    pub schema: String,
    pub name: String,
}

impl SchemaObjectCoords {
    pub fn new(database: impl Into<String>, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
        }
    }
}

/// A pipe's catalog coordinates (database, schema, pipe name). Channels are
/// opened against a pipe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipeCoords {
    pub database: String,
    pub schema: String,
    pub pipe: String,
}

impl PipeCoords {
    pub fn new(database: impl Into<String>, schema: impl Into<String>, pipe: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            pipe: pipe.into(),
        }
    }
}

/// The service's column-semantic types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Number,
    Boolean,
    Varchar,
    Binary,
    Variant,
    Date,
    Time,
    TimestampNtz,
    TimestampLtz,
    TimestampTz,
}

/// A single column's type and optional shape constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub length: Option<u32>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            precision: None,
            scale: None,
            length: None,
        }
    }

    pub fn with_precision_scale(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Scale clamped into [0, 9] (TIME/TIMESTAMP_*).
    pub fn clamped_timestamp_scale(&self) -> u8 {
        self.scale.unwrap_or(9).min(9)
    }
}

/// The target table's coordinates plus its column mapping. Immutable for the
/// lifetime of a channel; keys match producer row keys case-sensitively.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: SchemaObjectCoords,
    columns: HashMap<String, ColumnSpec>,
}

impl TableSchema {
    pub fn new(table: SchemaObjectCoords, columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        Self {
            table,
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.get(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.values()
    }
}
