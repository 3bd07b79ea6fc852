//! Configuration for bulkload
//!
//! - [`ConnectionConfig`]: how a session is opened, passed explicitly to a
//!   [`ConnectionFactory`](crate::connection::ConnectionFactory)
//! - [`LoadOptions`]: per-operation batching knobs
//!
//! Nothing here reads process state implicitly; [`ConnectionConfig::from_env`]
//! is an explicit constructor the caller chooses to use.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Error, Result};
use crate::security::validate_sql_identifier;

/// Environment variable for the database host
pub const ENV_DB_HOST: &str = "DB_HOST";
/// Environment variable for the database port
pub const ENV_DB_PORT: &str = "DB_PORT";
/// Environment variable for the database name
pub const ENV_DB_NAME: &str = "DB_NAME";
/// Environment variable for the database user
pub const ENV_DB_USER: &str = "DB_USER";
/// Environment variable for the database password
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";
/// Environment variable for the application schema placed before `public`
pub const ENV_DB_SCHEMA: &str = "DB_SCHEMA";

/// Default application schema
pub const DEFAULT_APP_SCHEMA: &str = "test";
/// Default batch size for the append path
pub const DEFAULT_BATCH_SIZE: usize = 50_000;
/// Default batch size for staged (keyed) paths
pub const DEFAULT_STAGING_BATCH_SIZE: usize = 10_000;

/// Configuration for opening a database session
#[derive(Clone, Validate)]
pub struct ConnectionConfig {
    /// Server host name or address
    #[validate(length(min = 1))]
    pub host: String,
    /// Server port
    #[validate(range(min = 1))]
    pub port: u16,
    /// Database name
    #[validate(length(min = 1))]
    pub database: String,
    /// Login role
    #[validate(length(min = 1))]
    pub user: String,
    /// Password, redacted from `Debug` output
    pub password: Option<SecretString>,
    /// Schema searched before `public` for unqualified names
    #[validate(length(min = 1, max = 63))]
    pub app_schema: String,
    /// Application name (shown in pg_stat_activity)
    pub application_name: Option<String>,
    /// Connection timeout in milliseconds (0 = driver default)
    pub connect_timeout_ms: u64,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("app_schema", &self.app_schema)
            .field("application_name", &self.application_name)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: None,
            app_schema: DEFAULT_APP_SCHEMA.into(),
            application_name: Some("bulkload".into()),
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    /// Create configuration for a database and user on the default host
    pub fn new(database: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    /// Load configuration from the process environment
    ///
    /// `DB_NAME` and `DB_USER` are required; `DB_HOST` defaults to
    /// `localhost`, `DB_PORT` to 5432 and `DB_SCHEMA` to
    /// [`DEFAULT_APP_SCHEMA`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config(format!("{} is not set", key)))
        };

        let mut config = Self::new(required(ENV_DB_NAME)?, required(ENV_DB_USER)?);

        if let Some(host) = lookup(ENV_DB_HOST).filter(|v| !v.is_empty()) {
            config.host = host;
        }

        if let Some(port) = lookup(ENV_DB_PORT).filter(|v| !v.is_empty()) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{} is not a valid port: {}", ENV_DB_PORT, port)))?;
        }

        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            config.password = Some(SecretString::from(password));
        }

        if let Some(schema) = lookup(ENV_DB_SCHEMA).filter(|v| !v.is_empty()) {
            config.app_schema = schema;
        }

        config.check()?;
        Ok(config)
    }

    /// Set host and port
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the application schema
    pub fn with_app_schema(mut self, schema: impl Into<String>) -> Self {
        self.app_schema = schema.into();
        self
    }

    /// Set application name
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Expose the password for the driver
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }

    /// Session search path: the application schema, then `public`
    pub fn search_path(&self) -> Vec<String> {
        if self.app_schema == "public" {
            vec!["public".into()]
        } else {
            vec![self.app_schema.clone(), "public".into()]
        }
    }

    /// Validate field rules and the schema identifier
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid connection config: {}", e)))?;
        validate_sql_identifier(&self.app_schema)
    }
}

/// Per-operation batching options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LoadOptions {
    /// Maximum rows per batch; bounds the encoded payload held in memory
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl LoadOptions {
    /// Options tuned for staged (keyed) loads
    pub fn staged() -> Self {
        Self {
            batch_size: DEFAULT_STAGING_BATCH_SIZE,
        }
    }

    /// Set batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Validate option rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid load options: {}", e)))
    }
}
