//! Target column discovery through `information_schema`

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::dialect::{TargetTable, CATALOG_COLUMNS_SQL};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Coercion category of a catalog column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnCategory {
    /// Character types; values are rendered as strings
    Text,
    /// Date, time and timestamp types
    Temporal {
        /// `... with time zone`
        with_zone: bool,
    },
    /// Exact and floating point numbers
    Numeric {
        /// `smallint`, `integer` or `bigint`
        integer: bool,
    },
    /// Anything else; values pass through untouched
    Other,
}

impl ColumnCategory {
    /// Classify an `information_schema.columns.data_type` value
    pub fn classify(data_type: &str) -> Self {
        let t = data_type.trim().to_ascii_lowercase();
        match t.as_str() {
            "text" | "character varying" | "character" | "name" | "citext" => Self::Text,
            "date" => Self::Temporal { with_zone: false },
            "smallint" | "integer" | "bigint" => Self::Numeric { integer: true },
            "numeric" | "decimal" | "real" | "double precision" => Self::Numeric { integer: false },
            _ if t.starts_with("timestamp") || t.starts_with("time ") || t == "time" => {
                Self::Temporal {
                    with_zone: t.contains("with time zone"),
                }
            }
            _ if t.contains("char") => Self::Text,
            _ => Self::Other,
        }
    }
}

/// One column of a target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    /// Column name as stored in the catalog
    pub name: String,
    /// `data_type` as reported by `information_schema`
    pub data_type: String,
}

impl CatalogColumn {
    /// Create a catalog column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Coercion category of the column type
    pub fn category(&self) -> ColumnCategory {
        ColumnCategory::classify(&self.data_type)
    }
}

fn text_field(row: &Row, name: &str) -> Result<String> {
    row.get_by_name(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::schema(format!("catalog row has no text field '{}'", name)))
}

/// Fetch the target's columns in ordinal order.
///
/// Schema and table names are lower-cased before lookup and bound as
/// parameters. An unknown table yields an empty list.
pub async fn fetch_columns(conn: &dyn Connection, target: &TargetTable) -> Result<Vec<CatalogColumn>> {
    let params = [
        Value::String(target.schema().to_lowercase()),
        Value::String(target.table().to_lowercase()),
    ];
    let rows = conn.query(CATALOG_COLUMNS_SQL, &params).await?;

    rows.iter()
        .map(|row| {
            Ok(CatalogColumn {
                name: text_field(row, "column_name")?,
                data_type: text_field(row, "data_type")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(ColumnCategory::classify("character varying"), ColumnCategory::Text);
        assert_eq!(ColumnCategory::classify("text"), ColumnCategory::Text);
        assert_eq!(
            ColumnCategory::classify("timestamp with time zone"),
            ColumnCategory::Temporal { with_zone: true }
        );
        assert_eq!(
            ColumnCategory::classify("timestamp without time zone"),
            ColumnCategory::Temporal { with_zone: false }
        );
        assert_eq!(
            ColumnCategory::classify("date"),
            ColumnCategory::Temporal { with_zone: false }
        );
        assert_eq!(
            ColumnCategory::classify("bigint"),
            ColumnCategory::Numeric { integer: true }
        );
        assert_eq!(
            ColumnCategory::classify("double precision"),
            ColumnCategory::Numeric { integer: false }
        );
    }

    #[test]
    fn test_classify_does_not_match_substrings() {
        assert_eq!(ColumnCategory::classify("interval"), ColumnCategory::Other);
        assert_eq!(ColumnCategory::classify("boolean"), ColumnCategory::Other);
        assert_eq!(ColumnCategory::classify("USER-DEFINED"), ColumnCategory::Other);
    }
}
