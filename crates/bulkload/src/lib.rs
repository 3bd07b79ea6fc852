//! # bulkload
//!
//! Batched bulk loading into PostgreSQL with three write strategies:
//!
//! - **Append**: rows are streamed with `COPY ... FROM STDIN` ([`loader`])
//! - **Upsert**: rows are staged in a temporary table and merged with
//!   `INSERT ... ON CONFLICT`, either updating or ignoring conflicts
//!   ([`reconcile`])
//! - **Replace by key**: target rows matching a staged row are deleted,
//!   then the staged rows are inserted ([`reconcile`])
//!
//! Every operation runs on one session in one transaction. Rows are cut into
//! batches that are encoded one at a time; a failure in any batch rolls the
//! whole operation back.
//!
//! An optional [`coerce`] pass rewrites loosely typed input (strings from
//! forms and spreadsheets) to the target's column types before loading.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkload::prelude::*;
//! use std::sync::Arc;
//!
//! let factory = Arc::new(PgConnectionFactory::new(ConnectionConfig::from_env()?)?);
//!
//! let rows = RowSource::records(vec![
//!     Record::new().with("id", 1_i64).with("name", "alpha"),
//!     Record::new().with("id", 2_i64).with("name", "beta"),
//! ]);
//!
//! let outcome = StagingReconciler::new(factory)
//!     .reconcile(
//!         rows,
//!         &TargetTable::new("test", "items"),
//!         &WriteMode::upsert_update(["id"]),
//!         &LoadOptions::staged(),
//!     )
//!     .await?;
//! println!("{} rows affected", outcome.rows_affected());
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` (default) - PostgreSQL backend via tokio-postgres

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod coerce;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod reconcile;
pub mod security;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorCategory, Result};

    pub use crate::types::{Record, Row, RowSet, RowSource, Value};

    pub use crate::config::{ConnectionConfig, LoadOptions};
    pub use crate::connection::{Connection, ConnectionFactory};

    pub use crate::dialect::{PostgresDialect, TargetTable};
    pub use crate::encoder::BatchEncoder;

    pub use crate::loader::{BulkLoader, LoadOutcome, LoadSummary, NoOpReason};
    pub use crate::reconcile::{StagingReconciler, WriteMode};

    pub use crate::catalog::{CatalogColumn, ColumnCategory};
    pub use crate::coerce::{Coerced, Coercer, CoercionOptions, NumberFormat, TypeCoercion};

    #[cfg(feature = "postgres")]
    pub use crate::postgres::{PgConnection, PgConnectionFactory};
}

pub use error::{Error, Result};
pub use types::Value;
