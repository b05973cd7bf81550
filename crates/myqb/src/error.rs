//! Error types for myqb

use std::path::PathBuf;
use thiserror::Error;

/// Client error: the server has gone away.
pub const CR_SERVER_GONE_ERROR: u32 = 2006;
/// Client error: connection lost during a query.
pub const CR_SERVER_LOST: u32 = 2013;

/// Result type alias for myqb operations
pub type DbResult<T> = Result<T, DbError>;

/// An error reported by the underlying driver.
///
/// `code` is the server (or client library) error number, `message` its text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct DriverError {
    pub code: u32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the connection dropped underneath the statement.
    pub fn is_gone_away(&self) -> bool {
        matches!(self.code, CR_SERVER_GONE_ERROR | CR_SERVER_LOST)
    }
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Unknown connection profile or bad configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connecting (or reconnecting) failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bad builder input: operator, direction, join type, option...
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server rejected the statement
    #[error("Query error [{code}]: {message} (query: {sql})")]
    QueryExecution {
        code: u32,
        message: String,
        sql: String,
    },

    /// Bulk-load source file is missing
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Operation cannot run with the given input (e.g. UPDATE without data)
    #[error("Operation error: {0}")]
    Operation(String),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an operation error
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Wrap a driver failure for the statement `sql`.
    pub fn from_driver(err: DriverError, sql: &str) -> Self {
        Self::QueryExecution {
            code: err.code,
            message: err.message,
            sql: sql.to_string(),
        }
    }

    /// Server/client error number, if this error carries one.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::QueryExecution { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a connection error
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a query execution error
    pub fn is_query_execution(&self) -> bool {
        matches!(self, Self::QueryExecution { .. })
    }
}
