//! Error types for bulkload
//!
//! Every failure is fatal to the operation that raised it. The category is
//! informational: it tells the caller *what* went wrong (session, statement,
//! data, shape) so it can decide whether to re-run the whole operation.
//! Nothing in this crate retries on its own.

use std::fmt;
use thiserror::Error;

/// Result type for bulkload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Opening or using the database session failed
    Connection,
    /// Statement or COPY execution failed
    Query,
    /// BEGIN / COMMIT / ROLLBACK failed
    Transaction,
    /// Constraint violation (PK, FK, unique, check, not-null)
    Constraint,
    /// Value could not be converted to the column type
    TypeConversion,
    /// Invalid configuration, identifier or option
    Configuration,
    /// Row set shape does not match its column list or the target
    Schema,
    /// Transfer encoding failed
    Encode,
}

impl ErrorCategory {
    /// Whether the category describes bad input data rather than a broken
    /// session. Re-running the same rows will fail the same way.
    #[inline]
    pub const fn is_data_error(self) -> bool {
        matches!(
            self,
            Self::Constraint | Self::TypeConversion | Self::Schema | Self::Encode
        )
    }
}

/// Main error type for bulkload
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction control failed
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Constraint violation (PK, FK, unique, check)
    #[error("constraint violation: {constraint_name} - {message}")]
    Constraint {
        constraint_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Row set shape error
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Column not found in the row set's column list
    #[error("column not found: {column} in table {table}")]
    ColumnNotFound { table: String, column: String },

    /// Transfer encoding failed
    #[error("encode error: {message}")]
    Encode { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Constraint { .. } => ErrorCategory::Constraint,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Schema { .. } | Self::ColumnNotFound { .. } => ErrorCategory::Schema,
            Self::Encode { .. } => ErrorCategory::Encode,
        }
    }

    /// Whether this error was caused by the rows rather than the session
    #[inline]
    pub fn is_data_error(&self) -> bool {
        self.category().is_data_error()
    }

    /// The SQL text attached to a query error, if any
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
            source: None,
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create an encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a column-not-found error
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Classify a server error by its SQLSTATE.
    ///
    /// Class `23` (integrity constraint violation) maps to
    /// [`Error::Constraint`], class `22` (data exception) to
    /// [`Error::TypeConversion`]; everything else stays a query error with
    /// the statement attached.
    pub fn from_sqlstate(
        code: &str,
        constraint: Option<&str>,
        message: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        let message = message.into();
        match code.get(..2) {
            Some("23") => Self::Constraint {
                constraint_name: constraint.unwrap_or("unknown").to_string(),
                message,
                source: None,
            },
            Some("22") => Self::TypeConversion {
                message,
                source: None,
            },
            _ => Self::query_with_sql(message, sql),
        }
    }

    /// Attach the underlying cause.
    ///
    /// Variants without a source slot are returned unchanged.
    pub fn with_source(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        match &mut self {
            Self::Connection { source, .. }
            | Self::Query { source, .. }
            | Self::Transaction { source, .. }
            | Self::Constraint { source, .. }
            | Self::TypeConversion { source, .. } => *source = Some(Box::new(cause)),
            Self::Configuration { .. }
            | Self::Schema { .. }
            | Self::ColumnNotFound { .. }
            | Self::Encode { .. } => {}
        }
        self
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Transaction => write!(f, "transaction"),
            Self::Constraint => write!(f, "constraint"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Configuration => write!(f, "configuration"),
            Self::Schema => write!(f, "schema"),
            Self::Encode => write!(f, "encode"),
        }
    }
}
