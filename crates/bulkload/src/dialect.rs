//! PostgreSQL statement builders
//!
//! Every statement the load paths issue is built here. Statement shapes that
//! sea-query models (INSERT ... SELECT ... ON CONFLICT, DELETE ... WHERE
//! EXISTS) go through sea-query; COPY, CREATE TEMPORARY TABLE ... AS and
//! TRUNCATE are assembled from [`quote_identifier`] output. Identifiers are
//! always quoted, so names are case-sensitive.

use sea_query::{Alias, Expr, IntoIden, OnConflict, PostgresQueryBuilder, Query, TableRef};
use std::fmt;

use crate::error::{Error, Result};
use crate::security::{quote_identifier, quote_identifier_list, validate_sql_identifier};

/// Prefix of the session-temporary staging relation
pub const STAGING_PREFIX: &str = "tmp_";

/// Catalog query: column names and types of one table in ordinal order
pub const CATALOG_COLUMNS_SQL: &str = "SELECT column_name::text AS column_name, \
     data_type::text AS data_type \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

/// A schema-qualified target relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetTable {
    schema: String,
    table: String,
}

impl TargetTable {
    /// Create a target descriptor
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Table in the `public` schema
    pub fn public(table: impl Into<String>) -> Self {
        Self::new("public", table)
    }

    /// Schema name
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Validate both identifiers
    pub fn validate(&self) -> Result<()> {
        validate_sql_identifier(&self.schema)?;
        validate_sql_identifier(&self.table)
    }

    /// Quoted `"schema"."table"`
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }

    /// Name of the staging relation for this target.
    ///
    /// PostgreSQL truncates identifiers to 63 bytes; the name is cut at a
    /// character boundary so the truncated form is what every statement uses.
    pub fn staging_name(&self) -> String {
        let mut name = format!("{}{}", STAGING_PREFIX, self.table);
        if name.len() > crate::security::MAX_IDENTIFIER_LEN {
            let mut end = crate::security::MAX_IDENTIFIER_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        name
    }

    fn sea_ref(&self) -> TableRef {
        TableRef::SchemaTable(
            Alias::new(&self.schema).into_iden(),
            Alias::new(&self.table).into_iden(),
        )
    }

    fn sea_staging_ref(&self) -> TableRef {
        TableRef::Table(Alias::new(self.staging_name()).into_iden())
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn idens(columns: &[String]) -> Vec<sea_query::DynIden> {
    columns.iter().map(|c| Alias::new(c).into_iden()).collect()
}

/// PostgreSQL statement builder
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// `COPY` into the target; no column list means natural column order
    pub fn copy_sql(&self, target: &TargetTable, columns: &[String]) -> String {
        self.copy_into(&target.qualified(), columns)
    }

    /// `COPY` into the target's staging relation
    pub fn copy_staging_sql(&self, target: &TargetTable, columns: &[String]) -> String {
        self.copy_into(&quote_identifier(&target.staging_name()), columns)
    }

    fn copy_into(&self, relation: &str, columns: &[String]) -> String {
        let column_list = if columns.is_empty() {
            String::new()
        } else {
            format!(" ({})", quote_identifier_list(columns))
        };
        format!(
            "COPY {}{} FROM STDIN WITH (FORMAT csv, DELIMITER ',')",
            relation, column_list
        )
    }

    /// Create the staging relation with the target's shape, if absent
    pub fn create_staging_sql(&self, target: &TargetTable) -> String {
        format!(
            "CREATE TEMPORARY TABLE IF NOT EXISTS {} AS SELECT * FROM {} WHERE false",
            quote_identifier(&target.staging_name()),
            target.qualified()
        )
    }

    /// Empty the staging relation between batches
    pub fn truncate_staging_sql(&self, target: &TargetTable) -> String {
        format!("TRUNCATE {}", quote_identifier(&target.staging_name()))
    }

    fn insert_from_staging(&self, target: &TargetTable, columns: &[String]) -> Result<sea_query::InsertStatement> {
        let select = Query::select()
            .columns(idens(columns))
            .from(target.sea_staging_ref())
            .to_owned();

        let mut stmt = Query::insert();
        stmt.into_table(target.sea_ref())
            .columns(idens(columns))
            .select_from(select)
            .map_err(|e| Error::schema(format!("insert column mismatch: {}", e)))?;
        Ok(stmt)
    }

    /// `INSERT ... SELECT` from staging with an `ON CONFLICT` clause.
    ///
    /// `update` selects `DO UPDATE SET c = EXCLUDED.c` for every non-key
    /// column; when every column is a key there is nothing to update and the
    /// action is `DO NOTHING`.
    pub fn upsert_sql(
        &self,
        target: &TargetTable,
        columns: &[String],
        key_columns: &[String],
        update: bool,
    ) -> Result<String> {
        let update_cols: Vec<String> = columns
            .iter()
            .filter(|c| !key_columns.contains(c))
            .cloned()
            .collect();

        let mut on_conflict = OnConflict::columns(idens(key_columns));
        if update && !update_cols.is_empty() {
            on_conflict.update_columns(idens(&update_cols));
        } else {
            on_conflict.do_nothing();
        }

        let mut stmt = self.insert_from_staging(target, columns)?;
        stmt.on_conflict(on_conflict);
        Ok(stmt.to_string(PostgresQueryBuilder))
    }

    /// Plain `INSERT ... SELECT` from staging
    pub fn insert_from_staging_sql(&self, target: &TargetTable, columns: &[String]) -> Result<String> {
        Ok(self
            .insert_from_staging(target, columns)?
            .to_string(PostgresQueryBuilder))
    }

    /// Delete target rows whose match columns equal a staged row
    pub fn delete_matching_sql(&self, target: &TargetTable, match_columns: &[String]) -> String {
        let staging = target.staging_name();

        let mut exists = Query::select();
        exists.expr(Expr::cust("1")).from(target.sea_staging_ref());
        for col in match_columns {
            exists.and_where(
                Expr::col((
                    Alias::new(target.schema()),
                    Alias::new(target.table()),
                    Alias::new(col),
                ))
                .equals((Alias::new(&staging), Alias::new(col))),
            );
        }

        Query::delete()
            .from_table(target.sea_ref())
            .and_where(Expr::exists(exists.to_owned()))
            .to_string(PostgresQueryBuilder)
    }
}
