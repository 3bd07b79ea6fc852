//! Keyed loads through a session-temporary staging table
//!
//! Each batch is copied into `tmp_<table>`, reconciled into the target with
//! one set-based statement (two for replace-by-key), and the staging table is
//! truncated before the next batch. Everything happens in one transaction on
//! one session, so the target either reflects every batch or none.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::LoadOptions;
use crate::connection::{close_quietly, rollback_quietly, Connection, ConnectionFactory};
use crate::dialect::{PostgresDialect, TargetTable};
use crate::encoder::BatchEncoder;
use crate::error::{Error, Result};
use crate::loader::{BulkLoader, LoadOutcome, LoadSummary, NoOpReason};
use crate::security::validate_sql_identifiers;
use crate::types::{RowSet, RowSource};

/// How staged rows are reconciled into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert, overwriting non-key columns of rows whose keys conflict
    UpsertUpdate {
        /// Columns of the target's unique constraint
        key_columns: Vec<String>,
    },
    /// Insert, skipping rows whose keys conflict
    UpsertIgnore {
        /// Columns of the target's unique constraint
        key_columns: Vec<String>,
    },
    /// Delete target rows matching a staged row on every match column, then
    /// insert the staged rows
    ReplaceByKey {
        /// Columns compared between target and staging
        match_columns: Vec<String>,
    },
}

fn owned<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Vec<String> {
    columns.into_iter().map(Into::into).collect()
}

impl WriteMode {
    /// Upsert, updating on conflict
    pub fn upsert_update<S: Into<String>>(key_columns: impl IntoIterator<Item = S>) -> Self {
        Self::UpsertUpdate {
            key_columns: owned(key_columns),
        }
    }

    /// Upsert, ignoring conflicts
    pub fn upsert_ignore<S: Into<String>>(key_columns: impl IntoIterator<Item = S>) -> Self {
        Self::UpsertIgnore {
            key_columns: owned(key_columns),
        }
    }

    /// Replace rows matching on `match_columns`
    pub fn replace_by_key<S: Into<String>>(match_columns: impl IntoIterator<Item = S>) -> Self {
        Self::ReplaceByKey {
            match_columns: owned(match_columns),
        }
    }

    /// Key or match columns
    pub fn columns(&self) -> &[String] {
        match self {
            Self::UpsertUpdate { key_columns } | Self::UpsertIgnore { key_columns } => key_columns,
            Self::ReplaceByKey { match_columns } => match_columns,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpsertUpdate { .. } => "upsert_update",
            Self::UpsertIgnore { .. } => "upsert_ignore",
            Self::ReplaceByKey { .. } => "replace_by_key",
        }
    }
}

/// Statements run after each staged batch
#[derive(Debug)]
enum Plan {
    Upsert(String),
    Replace { delete: String, insert: String },
}

impl Plan {
    fn build(target: &TargetTable, columns: &[String], mode: &WriteMode) -> Result<Self> {
        let dialect = PostgresDialect;
        Ok(match mode {
            WriteMode::UpsertUpdate { key_columns } => {
                Self::Upsert(dialect.upsert_sql(target, columns, key_columns, true)?)
            }
            WriteMode::UpsertIgnore { key_columns } => {
                Self::Upsert(dialect.upsert_sql(target, columns, key_columns, false)?)
            }
            WriteMode::ReplaceByKey { match_columns } => Self::Replace {
                delete: dialect.delete_matching_sql(target, match_columns),
                insert: dialect.insert_from_staging_sql(target, columns)?,
            },
        })
    }

    /// Returns `(affected, deleted)`
    async fn apply(&self, conn: &dyn Connection) -> Result<(u64, u64)> {
        match self {
            Self::Upsert(sql) => Ok((conn.execute(sql, &[]).await?, 0)),
            Self::Replace { delete, insert } => {
                let deleted = conn.execute(delete, &[]).await?;
                let inserted = conn.execute(insert, &[]).await?;
                Ok((inserted, deleted))
            }
        }
    }
}

/// Keyed loader (upsert / ignore / replace)
#[derive(Clone)]
pub struct StagingReconciler {
    factory: Arc<dyn ConnectionFactory>,
}

impl StagingReconciler {
    /// Create a reconciler that opens sessions from `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Load rows into `target`, reconciling on the mode's key columns.
    ///
    /// An empty key list is not an error: the rows are appended through
    /// [`BulkLoader`] instead.
    pub async fn reconcile(
        &self,
        source: RowSource,
        target: &TargetTable,
        mode: &WriteMode,
        options: &LoadOptions,
    ) -> Result<LoadOutcome> {
        let set = RowSet::from_source(source)?;
        if set.is_empty() {
            info!(table = %target, mode = mode.name(), "no rows to reconcile");
            return Ok(LoadOutcome::NoOp(NoOpReason::EmptyInput));
        }

        if mode.columns().is_empty() {
            warn!(
                table = %target,
                mode = mode.name(),
                "no key columns given, falling back to append"
            );
            return BulkLoader::new(Arc::clone(&self.factory))
                .load(set.into(), target, options)
                .await;
        }

        if !set.has_columns() {
            return Err(Error::schema(format!(
                "{} into {} requires an explicit column list",
                mode.name(),
                target
            )));
        }

        target.validate()?;
        validate_sql_identifiers(set.columns())?;
        validate_sql_identifiers(mode.columns())?;
        set.require_columns(mode.columns(), &target.to_string())?;
        let encoder = BatchEncoder::from_options(options)?;
        let plan = Plan::build(target, set.columns(), mode)?;

        info!(
            table = %target,
            mode = mode.name(),
            rows = set.len(),
            batches = encoder.batch_count(set.len()),
            "starting staged load"
        );

        let conn = self.factory.connect().await?;
        let result: Result<LoadSummary> = async {
            conn.begin().await?;
            let summary = stage_batches(conn.as_ref(), &set, target, &plan, &encoder).await?;
            conn.commit().await?;
            Ok(summary)
        }
        .await;

        if let Err(e) = &result {
            error!(table = %target, mode = mode.name(), error = %e, "staged load failed, rolling back");
            rollback_quietly(conn.as_ref()).await;
        }
        close_quietly(conn.as_ref()).await;

        let summary = result?;
        info!(
            table = %target,
            mode = mode.name(),
            rows = summary.rows_affected,
            deleted = summary.rows_deleted,
            batches = summary.batches,
            "staged load committed"
        );
        Ok(LoadOutcome::Applied(summary))
    }
}

async fn stage_batches(
    conn: &dyn Connection,
    set: &RowSet,
    target: &TargetTable,
    plan: &Plan,
    encoder: &BatchEncoder,
) -> Result<LoadSummary> {
    let dialect = PostgresDialect;
    let copy_sql = dialect.copy_staging_sql(target, set.columns());
    let truncate_sql = dialect.truncate_staging_sql(target);

    conn.batch_execute(&dialect.create_staging_sql(target)).await?;

    let mut summary = LoadSummary::default();
    for batch in encoder.batches(set.rows()) {
        let payload = batch.encode()?;
        let staged = conn.copy_in(&copy_sql, payload).await?;
        let (affected, deleted) = plan.apply(conn).await?;
        conn.batch_execute(&truncate_sql).await?;

        debug!(
            table = %target,
            batch = batch.index(),
            staged,
            affected,
            deleted,
            "reconciled batch"
        );
        summary.rows_affected += affected;
        summary.rows_deleted += deleted;
        summary.batches += 1;
    }

    Ok(summary)
}
