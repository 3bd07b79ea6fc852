//! Shared test doubles for bulkload crate tests
//!
//! `RecordingConnection` records every call it receives and answers with
//! scripted results, so load paths can be checked statement by statement
//! without a database.

#![allow(dead_code)]

use async_trait::async_trait;
use bulkload::dialect::CATALOG_COLUMNS_SQL;
use bulkload::prelude::*;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Install a test-writer subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bulkload=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

/// One call observed by the recording connection
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Begin,
    Commit,
    Rollback,
    Close,
    Execute(String),
    BatchExecute(String),
    Query(String, Vec<Value>),
    Copy { sql: String, payload: String },
}

/// Scripted behavior
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Zero-based index of the COPY that fails
    pub fail_copy_at: Option<usize>,
    /// Zero-based index of the `execute` that fails
    pub fail_execute_at: Option<usize>,
    /// Rows reported for each DELETE
    pub deleted_per_statement: u64,
    /// Rows reported for each INSERT; defaults to the rows of the last COPY
    pub inserted_per_statement: Option<u64>,
    /// `(column_name, data_type)` rows answered to the catalog query
    pub catalog: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    copies: usize,
    executes: usize,
    last_copy_rows: u64,
}

/// In-memory connection that records calls
#[derive(Debug, Clone, Default)]
pub struct RecordingConnection {
    state: Arc<Mutex<State>>,
    script: Arc<Script>,
}

impl RecordingConnection {
    pub fn new(script: Script) -> Self {
        Self {
            state: Arc::default(),
            script: Arc::new(script),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls rendered as short labels, e.g. `BEGIN`, `COPY`, `INSERT`
    pub fn labels(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| match call {
                Call::Begin => "BEGIN".to_string(),
                Call::Commit => "COMMIT".to_string(),
                Call::Rollback => "ROLLBACK".to_string(),
                Call::Close => "CLOSE".to_string(),
                Call::Copy { .. } => "COPY".to_string(),
                Call::Query(..) => "QUERY".to_string(),
                Call::Execute(sql) | Call::BatchExecute(sql) => sql
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect()
    }

    pub fn copies(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Copy { sql, payload } => Some((sql, payload)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> bulkload::Result<Vec<Row>> {
        self.record(Call::Query(sql.to_string(), params.to_vec()));
        if sql != CATALOG_COLUMNS_SQL {
            return Ok(Vec::new());
        }
        Ok(self
            .script
            .catalog
            .iter()
            .map(|(name, data_type)| {
                Row::new(
                    vec!["column_name".into(), "data_type".into()],
                    vec![Value::from(name.as_str()), Value::from(data_type.as_str())],
                )
            })
            .collect())
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> bulkload::Result<u64> {
        self.record(Call::Execute(sql.to_string()));
        let mut state = self.state.lock().unwrap();
        let index = state.executes;
        state.executes += 1;

        if self.script.fail_execute_at == Some(index) {
            return Err(Error::from_sqlstate(
                "23505",
                Some("t_pkey"),
                "duplicate key value violates unique constraint",
                sql,
            ));
        }

        if sql.starts_with("DELETE") {
            Ok(self.script.deleted_per_statement)
        } else {
            Ok(self
                .script
                .inserted_per_statement
                .unwrap_or(state.last_copy_rows))
        }
    }

    async fn batch_execute(&self, sql: &str) -> bulkload::Result<()> {
        self.record(Call::BatchExecute(sql.to_string()));
        Ok(())
    }

    async fn copy_in(&self, sql: &str, payload: Bytes) -> bulkload::Result<u64> {
        let text = String::from_utf8_lossy(&payload).into_owned();
        let rows = text.lines().count() as u64;
        self.record(Call::Copy {
            sql: sql.to_string(),
            payload: text,
        });

        let mut state = self.state.lock().unwrap();
        let index = state.copies;
        state.copies += 1;

        if self.script.fail_copy_at == Some(index) {
            return Err(Error::from_sqlstate(
                "22P02",
                None,
                "invalid input syntax for type integer",
                sql,
            ));
        }
        state.last_copy_rows = rows;
        Ok(rows)
    }

    async fn begin(&self) -> bulkload::Result<()> {
        self.record(Call::Begin);
        Ok(())
    }

    async fn commit(&self) -> bulkload::Result<()> {
        self.record(Call::Commit);
        Ok(())
    }

    async fn rollback(&self) -> bulkload::Result<()> {
        self.record(Call::Rollback);
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        true
    }

    async fn close(&self) -> bulkload::Result<()> {
        self.record(Call::Close);
        Ok(())
    }
}

/// Factory handing out clones of one recording connection
#[derive(Debug, Default)]
pub struct RecordingFactory {
    pub conn: RecordingConnection,
    connects: AtomicUsize,
    fail_connect: bool,
}

impl RecordingFactory {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            conn: RecordingConnection::new(script),
            ..Default::default()
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            fail_connect: true,
            ..Default::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for RecordingFactory {
    async fn connect(&self) -> bulkload::Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Error::connection("connection refused"));
        }
        Ok(Box::new(self.conn.clone()))
    }
}

/// Rows `(id, name)` for ids `1..=n`
pub fn id_name_rows(n: i64) -> RowSource {
    RowSource::rows_with_columns(
        ["id", "name"],
        (1..=n)
            .map(|i| vec![Value::Int64(i), Value::from(format!("name_{}", i))])
            .collect(),
    )
}
