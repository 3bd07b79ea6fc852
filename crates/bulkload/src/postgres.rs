//! PostgreSQL backend for bulkload
//!
//! - [`PgConnection`]: a tokio-postgres session implementing [`Connection`],
//!   including `COPY ... FROM STDIN` streaming
//! - [`PgConnectionFactory`]: opens sessions from a [`ConnectionConfig`] and
//!   pins the session search path

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::security::quote_identifier_list;
use crate::types::{Row, Value};

type PgParam = Box<dyn tokio_postgres::types::ToSql + Sync + Send>;

/// Convert a Value to a tokio-postgres compatible parameter
fn value_to_sql(value: &Value) -> PgParam {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::Decimal(d) => Box::new(*d),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::DateTime(dt) => Box::new(*dt),
        Value::DateTimeTz(dt) => Box::new(*dt),
        Value::Uuid(u) => Box::new(*u),
        Value::Json(j) => Box::new(j.clone()),
    }
}

/// Convert a tokio-postgres row to a Row
fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values: Vec<Value> = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| pg_value_to_value(pg_row, i, col.type_()))
        .collect();

    Row::new(columns, values)
}

/// Read one column, mapping SQL NULL and unsupported types to `Value::Null`
fn pg_value_to_value(
    row: &tokio_postgres::Row,
    idx: usize,
    pg_type: &tokio_postgres::types::Type,
) -> Value {
    use tokio_postgres::types::Type;

    fn get<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> Value
    where
        T: tokio_postgres::types::FromSql<'a>,
        F: FnOnce(T) -> Value,
    {
        row.try_get::<_, Option<T>>(idx)
            .ok()
            .flatten()
            .map(wrap)
            .unwrap_or(Value::Null)
    }

    match *pg_type {
        Type::BOOL => get(row, idx, Value::Bool),
        Type::INT2 => get(row, idx, Value::Int16),
        Type::INT4 => get(row, idx, Value::Int32),
        Type::INT8 => get(row, idx, Value::Int64),
        Type::FLOAT4 => get(row, idx, Value::Float32),
        Type::FLOAT8 => get(row, idx, Value::Float64),
        Type::NUMERIC => get(row, idx, Value::Decimal),
        Type::BYTEA => get(row, idx, Value::Bytes),
        Type::DATE => get(row, idx, Value::Date),
        Type::TIME => get(row, idx, Value::Time),
        Type::TIMESTAMP => get(row, idx, Value::DateTime),
        Type::TIMESTAMPTZ => get(row, idx, Value::DateTimeTz),
        Type::UUID => get(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => get(row, idx, Value::Json),
        // text-like and unknown types
        _ => get(row, idx, Value::String),
    }
}

/// Map a driver error, classifying server errors by SQLSTATE
fn map_pg_error(e: tokio_postgres::Error, sql: &str) -> Error {
    if let Some(db) = e.as_db_error() {
        let err = Error::from_sqlstate(db.code().code(), db.constraint(), db.message(), sql);
        return err.with_source(e);
    }
    if e.is_closed() {
        return Error::connection_with_source("connection closed", e);
    }
    Error::query_with_sql(e.to_string(), sql).with_source(e)
}

fn map_tx_error(e: tokio_postgres::Error) -> Error {
    let message = match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    };
    Error::transaction(message).with_source(e)
}

fn to_params(params: &[Value]) -> Vec<PgParam> {
    params.iter().map(value_to_sql).collect()
}

fn param_refs(boxed: &[PgParam]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
    boxed
        .iter()
        .map(|b| b.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect()
}

/// PostgreSQL connection implementation
pub struct PgConnection {
    client: tokio_postgres::Client,
    closed: AtomicBool,
}

impl PgConnection {
    /// Wrap a connected tokio-postgres client
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) || self.client.is_closed() {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }

    async fn transaction_control(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.client.batch_execute(sql).await.map_err(map_tx_error)
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;

        let boxed = to_params(params);
        let pg_rows = self
            .client
            .query(sql, &param_refs(&boxed))
            .await
            .map_err(|e| map_pg_error(e, sql))?;

        Ok(pg_rows.iter().map(pg_row_to_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;

        let boxed = to_params(params);
        self.client
            .execute(sql, &param_refs(&boxed))
            .await
            .map_err(|e| map_pg_error(e, sql))
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| map_pg_error(e, sql))
    }

    async fn copy_in(&self, sql: &str, payload: Bytes) -> Result<u64> {
        self.ensure_open()?;

        let sink = self
            .client
            .copy_in::<_, Bytes>(sql)
            .await
            .map_err(|e| map_pg_error(e, sql))?;
        futures::pin_mut!(sink);

        sink.send(payload).await.map_err(|e| map_pg_error(e, sql))?;
        sink.as_mut().finish().await.map_err(|e| map_pg_error(e, sql))
    }

    async fn begin(&self) -> Result<()> {
        self.transaction_control("BEGIN").await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_control("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_control("ROLLBACK").await
    }

    async fn is_valid(&self) -> bool {
        if self.ensure_open().is_err() {
            return false;
        }
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        // dropping the client ends the spawned connection task
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// `SET search_path` statement for a configuration
pub fn search_path_sql(config: &ConnectionConfig) -> String {
    format!(
        "SET search_path TO {}",
        quote_identifier_list(&config.search_path())
    )
}

/// PostgreSQL connection factory
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    config: ConnectionConfig,
}

impl PgConnectionFactory {
    /// Create a factory, validating the configuration up front
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { config })
    }

    /// Create a factory from `DB_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ConnectionConfig::from_env()?)
    }

    /// The configuration sessions are opened with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let c = &self.config;
        let mut pg = tokio_postgres::Config::new();
        pg.host(&c.host).port(c.port).dbname(&c.database).user(&c.user);
        if let Some(password) = c.password() {
            pg.password(password);
        }
        if let Some(name) = &c.application_name {
            pg.application_name(name);
        }
        if c.connect_timeout_ms > 0 {
            pg.connect_timeout(Duration::from_millis(c.connect_timeout_ms));
        }
        pg
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let (client, connection) = self
            .pg_config()
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                Error::connection_with_source(
                    format!(
                        "failed to connect to {}:{}/{}",
                        self.config.host, self.config.port, self.config.database
                    ),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection error");
            }
        });

        let conn = PgConnection::new(client);
        let sql = search_path_sql(&self.config);
        conn.batch_execute(&sql).await.map_err(|e| {
            Error::connection(format!("failed to set search path: {}", e))
        })?;

        tracing::debug!(
            host = %self.config.host,
            database = %self.config.database,
            search_path = ?self.config.search_path(),
            "opened postgres session"
        );

        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        let _ = value_to_sql(&Value::Int32(42));
        let _ = value_to_sql(&Value::String("hello".into()));
        let _ = value_to_sql(&Value::Null);
        let _ = value_to_sql(&Value::Decimal(rust_decimal::Decimal::new(1234, 2)));
    }

    #[test]
    fn test_search_path_sql() {
        let config = ConnectionConfig::new("coop", "u");
        assert_eq!(search_path_sql(&config), "SET search_path TO \"test\", \"public\"");

        let config = config.with_app_schema("Sales");
        assert_eq!(search_path_sql(&config), "SET search_path TO \"Sales\", \"public\"");
    }

    #[test]
    fn test_pg_config_from_connection_config() {
        let config = ConnectionConfig::new("coop", "loader")
            .with_host("db.internal", 6543)
            .with_password("pw")
            .with_connect_timeout(2_500);
        let factory = PgConnectionFactory::new(config).unwrap();
        let pg = factory.pg_config();

        assert_eq!(pg.get_dbname(), Some("coop"));
        assert_eq!(pg.get_user(), Some("loader"));
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_application_name(), Some("bulkload"));
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_millis(2_500)));
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = ConnectionConfig::new("", "u");
        assert!(PgConnectionFactory::new(config).is_err());
    }
}
