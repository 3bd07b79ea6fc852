//! Value and row-set types for bulkload
//!
//! - [`Value`]: one cell, covering the PostgreSQL types the loader transfers
//! - [`Row`]: a result row returned by catalog queries
//! - [`Record`]: a named-column input record (ordered)
//! - [`RowSource`]: the caller-facing input shapes
//! - [`RowSet`]: the canonical, validated row set every load path consumes

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// SQL value type that can hold any transferable database value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data (BYTEA)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the value as PostgreSQL text input.
    ///
    /// Returns `None` for NULL. The rendering is what PostgreSQL accepts as
    /// the external text representation of the matching column type, which
    /// makes it usable both for COPY payloads and for string coercion.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
            Self::Int16(n) => Some(n.to_string()),
            Self::Int32(n) => Some(n.to_string()),
            Self::Int64(n) => Some(n.to_string()),
            Self::Float32(n) => Some(float_text(*n)),
            Self::Float64(n) => Some(float_text(*n)),
            Self::Decimal(d) => Some(d.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::Bytes(b) => {
                let mut out = String::with_capacity(2 + b.len() * 2);
                out.push_str("\\x");
                for byte in b {
                    out.push_str(&format!("{:02x}", byte));
                }
                Some(out)
            }
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::DateTimeTz(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Json(j) => Some(j.to_string()),
        }
    }
}

/// Shortest text that round-trips at the value's own precision
fn float_text<F: Copy + Into<f64> + ToString>(n: F) -> String {
    let wide: f64 = n.into();
    if wide.is_nan() {
        "NaN".to_string()
    } else if wide == f64::INFINITY {
        "Infinity".to_string()
    } else if wide == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }
}

/// A named-column input record.
///
/// Keeps insertion order, so a set of records produces a deterministic
/// column list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing value of the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`Record::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get a field by exact name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Field names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Input accepted by every load path.
///
/// Normalized exactly once into a [`RowSet`] by [`RowSet::from_source`].
#[derive(Debug, Clone)]
pub enum RowSource {
    /// Positional tuples with an optional column list.
    ///
    /// Without a column list the tuples are loaded in the target table's
    /// natural column order, which only the append path supports.
    Rows {
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Value>>,
    },
    /// Named records. The column list is the union of field names in
    /// first-seen order; missing fields load as NULL.
    Records(Vec<Record>),
}

impl RowSource {
    /// Positional tuples in the target's natural column order
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        Self::Rows {
            columns: None,
            rows,
        }
    }

    /// Positional tuples with an explicit column list
    pub fn rows_with_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self::Rows {
            columns: Some(columns.into_iter().map(Into::into).collect()),
            rows,
        }
    }

    /// Named records
    pub fn records(records: Vec<Record>) -> Self {
        Self::Records(records)
    }

    /// Number of input rows
    pub fn len(&self) -> usize {
        match self {
            Self::Rows { rows, .. } => rows.len(),
            Self::Records(records) => records.len(),
        }
    }

    /// Whether there is nothing to load
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<RowSet> for RowSource {
    fn from(set: RowSet) -> Self {
        let columns = if set.columns.is_empty() {
            None
        } else {
            Some(set.columns)
        };
        Self::Rows {
            columns,
            rows: set.rows,
        }
    }
}

/// Canonical row set: an ordered column list and rows of matching arity.
///
/// An empty column list means "target's natural column order".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Build a row set, checking that every row matches the column arity
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let arity = if columns.is_empty() {
            rows.first().map(Vec::len).unwrap_or(0)
        } else {
            columns.len()
        };

        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != arity) {
            return Err(Error::schema(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                arity
            )));
        }

        for (i, col) in columns.iter().enumerate() {
            if columns[..i].contains(col) {
                return Err(Error::schema(format!("duplicate column '{}'", col)));
            }
        }

        Ok(Self { columns, rows })
    }

    /// Normalize any [`RowSource`] into a row set
    pub fn from_source(source: RowSource) -> Result<Self> {
        match source {
            RowSource::Rows { columns, rows } => Self::new(columns.unwrap_or_default(), rows),
            RowSource::Records(records) => {
                let mut columns: Vec<String> = Vec::new();
                for record in &records {
                    for name in record.names() {
                        if !columns.iter().any(|c| c == name) {
                            columns.push(name.to_string());
                        }
                    }
                }

                let rows = records
                    .iter()
                    .map(|record| {
                        columns
                            .iter()
                            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();

                Self::new(columns, rows)
            }
        }
    }

    /// Column list (empty when loading in natural order)
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the row set carries an explicit column list
    #[inline]
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// All rows
    #[inline]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in the column list
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Ensure every name in `required` is part of the column list
    pub fn require_columns(&self, required: &[String], table: &str) -> Result<()> {
        match required.iter().find(|c| self.column_index(c).is_none()) {
            Some(missing) => Err(Error::column_not_found(table, missing.clone())),
            None => Ok(()),
        }
    }

    /// Split into column list and rows
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}
