//! Append-only bulk loading through `COPY`
//!
//! [`BulkLoader::load`] owns its session: one connection, one transaction,
//! every batch streamed in order, commit at the end. Any failure rolls the
//! whole operation back, so earlier batches never become visible on their own.
//!
//! [`BulkLoader::load_with`] streams into a session and transaction that
//! belong to the caller and never commits.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::LoadOptions;
use crate::connection::{close_quietly, rollback_quietly, Connection, ConnectionFactory};
use crate::dialect::{PostgresDialect, TargetTable};
use crate::encoder::BatchEncoder;
use crate::error::Result;
use crate::security::validate_sql_identifiers;
use crate::types::{RowSet, RowSource};

/// Why an operation did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoOpReason {
    /// The input had no rows
    EmptyInput,
    /// No input column matched the target's catalog
    NoMatchingColumns,
}

/// Counts reported by an applied operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Rows copied (append) or affected by the reconciliation insert
    pub rows_affected: u64,
    /// Batches executed
    pub batches: usize,
    /// Target rows removed by replace-by-key
    pub rows_deleted: u64,
}

/// Result of a load or reconcile operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadOutcome {
    /// Nothing was sent to the database
    NoOp(NoOpReason),
    /// The operation ran and committed (or, for external scopes, completed)
    Applied(LoadSummary),
}

impl LoadOutcome {
    /// Affected row count; zero for a no-op
    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::NoOp(_) => 0,
            Self::Applied(summary) => summary.rows_affected,
        }
    }

    /// Whether the operation was skipped
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }

    /// Summary of an applied operation
    pub fn summary(&self) -> Option<&LoadSummary> {
        match self {
            Self::NoOp(_) => None,
            Self::Applied(summary) => Some(summary),
        }
    }
}

/// Append-only loader
#[derive(Clone)]
pub struct BulkLoader {
    factory: Arc<dyn ConnectionFactory>,
}

impl BulkLoader {
    /// Create a loader that opens sessions from `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Append rows to `target` in one transaction on a fresh session
    pub async fn load(
        &self,
        source: RowSource,
        target: &TargetTable,
        options: &LoadOptions,
    ) -> Result<LoadOutcome> {
        let set = RowSet::from_source(source)?;
        if set.is_empty() {
            info!(table = %target, "no rows to load");
            return Ok(LoadOutcome::NoOp(NoOpReason::EmptyInput));
        }

        let encoder = prepare(&set, target, options)?;
        info!(
            table = %target,
            rows = set.len(),
            batches = encoder.batch_count(set.len()),
            "starting bulk load"
        );

        let conn = self.factory.connect().await?;
        let result: Result<LoadSummary> = async {
            conn.begin().await?;
            let summary = copy_batches(conn.as_ref(), &set, target, &encoder).await?;
            conn.commit().await?;
            Ok(summary)
        }
        .await;

        if let Err(e) = &result {
            error!(table = %target, error = %e, "bulk load failed, rolling back");
            rollback_quietly(conn.as_ref()).await;
        }
        close_quietly(conn.as_ref()).await;

        let summary = result?;
        info!(
            table = %target,
            rows = summary.rows_affected,
            batches = summary.batches,
            "bulk load committed"
        );
        Ok(LoadOutcome::Applied(summary))
    }

    /// Append rows using the caller's session and transaction.
    ///
    /// Nothing is committed. On failure a best-effort `ROLLBACK` is issued
    /// on `conn` before the error is returned.
    pub async fn load_with(
        conn: &dyn Connection,
        source: RowSource,
        target: &TargetTable,
        options: &LoadOptions,
    ) -> Result<LoadOutcome> {
        let set = RowSet::from_source(source)?;
        if set.is_empty() {
            info!(table = %target, "no rows to load");
            return Ok(LoadOutcome::NoOp(NoOpReason::EmptyInput));
        }

        let encoder = prepare(&set, target, options)?;
        match copy_batches(conn, &set, target, &encoder).await {
            Ok(summary) => {
                info!(
                    table = %target,
                    rows = summary.rows_affected,
                    batches = summary.batches,
                    "bulk load streamed into caller transaction"
                );
                Ok(LoadOutcome::Applied(summary))
            }
            Err(e) => {
                error!(table = %target, error = %e, "bulk load failed, rolling back caller transaction");
                rollback_quietly(conn).await;
                Err(e)
            }
        }
    }
}

fn prepare(set: &RowSet, target: &TargetTable, options: &LoadOptions) -> Result<BatchEncoder> {
    target.validate()?;
    validate_sql_identifiers(set.columns())?;
    BatchEncoder::from_options(options)
}

/// Stream every batch through `COPY`, summing the server-reported counts
async fn copy_batches(
    conn: &dyn Connection,
    set: &RowSet,
    target: &TargetTable,
    encoder: &BatchEncoder,
) -> Result<LoadSummary> {
    let sql = PostgresDialect.copy_sql(target, set.columns());
    let mut summary = LoadSummary::default();

    for batch in encoder.batches(set.rows()) {
        let payload = batch.encode()?;
        let copied = conn.copy_in(&sql, payload).await?;
        debug!(
            table = %target,
            batch = batch.index(),
            rows = batch.len(),
            copied,
            "copied batch"
        );
        summary.rows_affected += copied;
        summary.batches += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_rows_affected() {
        assert_eq!(LoadOutcome::NoOp(NoOpReason::EmptyInput).rows_affected(), 0);

        let applied = LoadOutcome::Applied(LoadSummary {
            rows_affected: 7,
            batches: 2,
            rows_deleted: 0,
        });
        assert_eq!(applied.rows_affected(), 7);
        assert!(!applied.is_noop());
        assert_eq!(applied.summary().map(|s| s.batches), Some(2));
    }
}
