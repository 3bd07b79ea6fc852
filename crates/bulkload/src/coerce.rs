//! Catalog-driven value coercion
//!
//! Loosely typed input (typically strings from spreadsheets or forms) is
//! rewritten so every value matches what the target column accepts:
//!
//! | Category | Result |
//! |---|---|
//! | Text | string rendering of any non-null value |
//! | Temporal | `%Y-%m-%d %H:%M:%S`, plus `%z` for zoned columns; unparsable → NULL |
//! | Numeric | `Decimal` after separator normalization, or the literal itself when it exceeds `Decimal`'s range; unparsable → NULL |
//! | Integer | `Int64`; a non-integral value is an error |
//! | Other | untouched |
//!
//! [`Coercer`] is the pure part and needs no database. [`TypeCoercion`]
//! fetches the catalog first.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::catalog::{fetch_columns, CatalogColumn, ColumnCategory};
use crate::connection::{close_quietly, ConnectionFactory};
use crate::dialect::TargetTable;
use crate::error::{Error, Result};
use crate::loader::NoOpReason;
use crate::types::{RowSet, RowSource, Value};

/// Strings treated as NULL in every column once any column is coerced
pub const NULL_SENTINELS: &[&str] = &["nan", "NaN", "NaT", "null", "None", "<NA>"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const ZONED_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%:z"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

const ZONED_TIME_FORMATS: &[&str] = &["%H:%M:%S%.f%#z", "%H:%M%#z"];

/// Date that bare times are placed on
const EPOCH: &str = "1970-01-01";

/// Thousands and decimal separators of numeric text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    /// Grouping separator, removed before parsing
    pub thousands_separator: char,
    /// Decimal separator, translated to `.` before parsing
    pub decimal_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            thousands_separator: ',',
            decimal_separator: '.',
        }
    }
}

impl NumberFormat {
    /// `1.234,5` style
    pub fn european() -> Self {
        Self {
            thousands_separator: '.',
            decimal_separator: ',',
        }
    }

    fn normalize(&self, text: &str) -> String {
        text.chars()
            .filter(|c| *c != self.thousands_separator && !c.is_whitespace())
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect()
    }
}

fn validate_number_format(format: &NumberFormat) -> std::result::Result<(), ValidationError> {
    if format.thousands_separator == format.decimal_separator {
        return Err(ValidationError::new("ambiguous_number_format")
            .with_message("thousands and decimal separators must differ".into()));
    }
    Ok(())
}

/// Options for [`Coercer`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CoercionOptions {
    /// Separators used by numeric text
    #[serde(default)]
    #[validate(custom(function = "validate_number_format"))]
    pub number_format: NumberFormat,
    /// Drop input columns the target does not have
    #[serde(default)]
    pub matched_columns_only: bool,
}

impl CoercionOptions {
    /// Set the number format
    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = format;
        self
    }

    /// Keep only columns present in the target
    pub fn with_matched_columns_only(mut self, enabled: bool) -> Self {
        self.matched_columns_only = enabled;
        self
    }

    /// Validate option rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid coercion options: {}", e)))
    }
}

/// Result of a coercion pass
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// At least one column was coerced
    Transformed(RowSet),
    /// Nothing was coerced; the row set is returned as-is
    Unchanged(RowSet, NoOpReason),
}

impl Coerced {
    /// The resulting row set
    pub fn rows(&self) -> &RowSet {
        match self {
            Self::Transformed(set) | Self::Unchanged(set, _) => set,
        }
    }

    /// Take the resulting row set
    pub fn into_rows(self) -> RowSet {
        match self {
            Self::Transformed(set) | Self::Unchanged(set, _) => set,
        }
    }

    /// Whether any column was coerced
    pub fn is_transformed(&self) -> bool {
        matches!(self, Self::Transformed(_))
    }
}

/// Pure coercion against a known catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct Coercer;

impl Coercer {
    /// Coerce `set` to the column types in `catalog`.
    ///
    /// Input column names are lower-cased first. Only catalog columns that
    /// appear in the input are coerced. When at least one column matches,
    /// [`NULL_SENTINELS`] also become NULL in the unmatched columns; with no
    /// match the values are left as they are.
    pub fn apply(set: RowSet, catalog: &[CatalogColumn], options: &CoercionOptions) -> Result<Coerced> {
        options.check()?;

        if set.is_empty() {
            return Ok(Coerced::Unchanged(set, NoOpReason::EmptyInput));
        }
        if !set.has_columns() {
            return Err(Error::schema("coercion requires an explicit column list"));
        }

        let (columns, mut rows) = set.into_parts();
        let columns: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();

        let matched: Vec<(usize, &CatalogColumn)> = catalog
            .iter()
            .filter_map(|col| {
                let name = col.name.to_lowercase();
                columns.iter().position(|c| *c == name).map(|idx| (idx, col))
            })
            .collect();

        if matched.is_empty() {
            return Ok(Coerced::Unchanged(
                RowSet::new(columns, rows)?,
                NoOpReason::NoMatchingColumns,
            ));
        }

        for (idx, col) in &matched {
            let category = col.category();
            for (row_idx, row) in rows.iter_mut().enumerate() {
                let value = std::mem::replace(&mut row[*idx], Value::Null);
                row[*idx] = coerce_value(value, category, &options.number_format).map_err(|e| {
                    Error::type_conversion(format!("column '{}', row {}: {}", col.name, row_idx, e))
                })?;
            }
        }

        let coerced: Vec<usize> = matched.iter().map(|(idx, _)| *idx).collect();
        for row in rows.iter_mut() {
            for (idx, value) in row.iter_mut().enumerate() {
                if coerced.contains(&idx) {
                    continue;
                }
                if matches!(value, Value::String(s) if is_null_sentinel(s)) {
                    *value = Value::Null;
                }
            }
        }

        let set = if options.matched_columns_only {
            let names: Vec<String> = coerced.iter().map(|i| columns[*i].clone()).collect();
            let projected: Vec<Vec<Value>> = rows
                .into_iter()
                .map(|mut row| {
                    coerced
                        .iter()
                        .map(|i| std::mem::replace(&mut row[*i], Value::Null))
                        .collect::<Vec<_>>()
                })
                .collect();
            RowSet::new(names, projected)?
        } else {
            RowSet::new(columns, rows)?
        };

        Ok(Coerced::Transformed(set))
    }
}

fn is_null_sentinel(text: &str) -> bool {
    NULL_SENTINELS.contains(&text.trim())
}

/// Coerce one value; `Err` carries a message without column context
fn coerce_value(
    value: Value,
    category: ColumnCategory,
    format: &NumberFormat,
) -> std::result::Result<Value, String> {
    if let Value::String(s) = &value {
        if is_null_sentinel(s) {
            return Ok(Value::Null);
        }
    }

    match category {
        ColumnCategory::Text => Ok(value.to_text().map(Value::String).unwrap_or(Value::Null)),
        ColumnCategory::Temporal { with_zone } => Ok(coerce_temporal(&value, with_zone)),
        ColumnCategory::Numeric { integer } => coerce_numeric(&value, integer, format),
        ColumnCategory::Other => Ok(value),
    }
}

enum Moment {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

fn parse_temporal(value: &Value) -> Option<Moment> {
    match value {
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Moment::Naive),
        Value::DateTime(dt) => Some(Moment::Naive(*dt)),
        Value::DateTimeTz(dt) => Some(Moment::Zoned(dt.fixed_offset())),
        // bare times land on the epoch date; `time` columns drop it again
        Value::Time(t) => Some(Moment::Naive(NaiveDateTime::new(epoch(), *t))),
        Value::String(s) => parse_temporal_text(s.trim()),
        _ => None,
    }
}

fn parse_temporal_text(s: &str) -> Option<Moment> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Moment::Zoned(dt));
    }
    for fmt in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(Moment::Zoned(dt));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Moment::Naive(dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(Moment::Naive);
        }
    }
    parse_time_text(s)
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Time-of-day text, placed on [`EPOCH`]
fn parse_time_text(s: &str) -> Option<Moment> {
    for fmt in TIME_FORMATS {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Some(Moment::Naive(NaiveDateTime::new(epoch(), t)));
        }
    }
    let dated = format!("{} {}", EPOCH, s);
    for fmt in ZONED_TIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&dated, &format!("%Y-%m-%d {}", fmt)) {
            return Some(Moment::Zoned(dt));
        }
    }
    None
}

fn coerce_temporal(value: &Value, with_zone: bool) -> Value {
    let rendered = match (parse_temporal(value), with_zone) {
        (None, _) => return Value::Null,
        (Some(Moment::Naive(dt)), false) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        (Some(Moment::Zoned(dt)), false) => dt.naive_local().format("%Y-%m-%d %H:%M:%S").to_string(),
        (Some(Moment::Naive(dt)), true) => dt
            .and_utc()
            .format("%Y-%m-%d %H:%M:%S%z")
            .to_string(),
        (Some(Moment::Zoned(dt)), true) => dt.format("%Y-%m-%d %H:%M:%S%z").to_string(),
    };
    Value::String(rendered)
}

/// A parsed number
enum Number {
    Exact(Decimal),
    /// Outside `Decimal`'s 96-bit range; `keep` is the value passed on
    /// (the normalized literal for text, the float itself otherwise)
    Wide { value: f64, keep: Value },
}

fn wide_float(n: f64, keep: Value) -> Option<Number> {
    if n.is_nan() {
        return None;
    }
    Some(Number::Wide { value: n, keep })
}

fn parse_number(value: &Value, format: &NumberFormat) -> Option<Number> {
    match value {
        Value::Int16(n) => Some(Number::Exact(Decimal::from(*n))),
        Value::Int32(n) => Some(Number::Exact(Decimal::from(*n))),
        Value::Int64(n) => Some(Number::Exact(Decimal::from(*n))),
        Value::Float32(n) => match Decimal::from_f32(*n) {
            Some(d) => Some(Number::Exact(d)),
            None => wide_float(f64::from(*n), Value::Float32(*n)),
        },
        Value::Float64(n) => match Decimal::from_f64(*n) {
            Some(d) => Some(Number::Exact(d)),
            None => wide_float(*n, Value::Float64(*n)),
        },
        Value::Decimal(d) => Some(Number::Exact(*d)),
        Value::String(s) => {
            let text = format.normalize(s);
            if text.is_empty() {
                return None;
            }
            if let Ok(d) = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)) {
                return Some(Number::Exact(d));
            }
            let n = text.parse::<f64>().ok()?;
            wide_float(n, Value::String(text))
        }
        _ => None,
    }
}

fn coerce_numeric(
    value: &Value,
    integer: bool,
    format: &NumberFormat,
) -> std::result::Result<Value, String> {
    let number = match parse_number(value, format) {
        Some(number) => number,
        None => return Ok(Value::Null),
    };

    match (number, integer) {
        (Number::Exact(d), false) => Ok(Value::Decimal(d)),
        (Number::Wide { keep, .. }, false) => Ok(keep),
        (Number::Exact(d), true) => {
            if !d.fract().is_zero() {
                return Err(format!("{} is not an integer", d));
            }
            d.trunc()
                .to_i64()
                .map(Value::Int64)
                .ok_or_else(|| format!("{} is out of range for a 64-bit integer", d))
        }
        (Number::Wide { value, .. }, true) if value.fract() != 0.0 => {
            Err(format!("{} is not an integer", value))
        }
        (Number::Wide { value, .. }, true) => {
            Err(format!("{} is out of range for a 64-bit integer", value))
        }
    }
}

/// Catalog lookup followed by [`Coercer::apply`]
#[derive(Clone)]
pub struct TypeCoercion {
    factory: Arc<dyn ConnectionFactory>,
}

impl TypeCoercion {
    /// Create a coercion pass that reads the catalog through `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Coerce `source` to the column types of `target`.
    ///
    /// Empty input returns without contacting the database. The catalog
    /// session is closed before coercion starts.
    pub async fn coerce(
        &self,
        source: RowSource,
        target: &TargetTable,
        options: &CoercionOptions,
    ) -> Result<Coerced> {
        let set = RowSet::from_source(source)?;
        if set.is_empty() {
            info!(table = %target, "nothing to coerce");
            return Ok(Coerced::Unchanged(set, NoOpReason::EmptyInput));
        }

        options.check()?;
        target.validate()?;

        let conn = self.factory.connect().await?;
        let catalog = fetch_columns(conn.as_ref(), target).await;
        close_quietly(conn.as_ref()).await;
        let catalog = catalog?;

        let coerced = Coercer::apply(set, &catalog, options)?;
        match &coerced {
            Coerced::Transformed(rows) => {
                info!(table = %target, columns = rows.columns().len(), rows = rows.len(), "coerced rows");
            }
            Coerced::Unchanged(_, reason) => {
                warn!(table = %target, ?reason, "no input column matches the target");
            }
        }
        Ok(coerced)
    }
}
