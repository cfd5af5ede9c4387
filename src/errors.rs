/*!
 * Error types for the langembed application.
 *
 * `DatabaseError` is what the package-database engine reports; every variant
 * maps to a numeric status code. `EmbedError` is the pipeline taxonomy: each
 * variant names the failing operation so the binary can print a single
 * diagnostic line and exit.
 */

use std::path::PathBuf;

use thiserror::Error;

/// Generic engine failure
pub const STATUS_FUNCTION_FAILED: i32 = 1627;
/// The file exists but is not a package database
pub const STATUS_INVALID_PACKAGE: i32 = 1620;
/// Output file already holds data
pub const STATUS_FILE_EXISTS: i32 = 80;
/// A property value has an unexpected datatype
pub const STATUS_DATATYPE_MISMATCH: i32 = 1629;
/// A transform could not be generated or applied
pub const STATUS_TRANSFORM_FAILURE: i32 = 1624;
/// Write attempted on a read-only handle
pub const STATUS_ACCESS_DENIED: i32 = 5;

/// Errors reported by the package-database engine
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failure reported by the storage backend itself
    #[error("{message}")]
    Engine {
        /// Raw backend status code
        status: i32,
        /// Backend message
        message: String,
    },

    /// The file opened fine but lacks the package system tables
    #[error("Not a package database: {0}")]
    NotAPackage(PathBuf),

    /// The two databases cannot be reconciled into a transform
    #[error("Structural mismatch in table `{table}`: {reason}")]
    StructuralMismatch {
        /// Table that could not be diffed
        table: String,
        /// What differs
        reason: String,
    },

    /// A summary property holds a value of another datatype
    #[error("Summary property {property} holds a {found} value, expected text")]
    TypeMismatch {
        /// Property id
        property: u32,
        /// Datatype found in the header
        found: &'static str,
    },

    /// The transform output path already contains data
    #[error("Refusing to overwrite non-empty file: {0}")]
    OutputExists(PathBuf),

    /// The transform file is malformed
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// The transform was generated against a different base
    #[error("Transform validation failed: {0}")]
    ValidationFailed(String),

    /// Mutation attempted through a read-only handle
    #[error("Database {0} is open read-only")]
    ReadOnly(PathBuf),

    /// I/O failure while streaming data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Numeric status code reported alongside diagnostics
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Engine { status, .. } => *status,
            Self::NotAPackage(_) => STATUS_INVALID_PACKAGE,
            Self::StructuralMismatch { .. } => STATUS_TRANSFORM_FAILURE,
            Self::TypeMismatch { .. } => STATUS_DATATYPE_MISMATCH,
            Self::OutputExists(_) => STATUS_FILE_EXISTS,
            Self::InvalidTransform(_) => STATUS_TRANSFORM_FAILURE,
            Self::ValidationFailed(_) => STATUS_TRANSFORM_FAILURE,
            Self::ReadOnly(_) => STATUS_ACCESS_DENIED,
            Self::Io(e) => e.raw_os_error().unwrap_or(STATUS_FUNCTION_FAILED),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::SqliteFailure(failure, message) => Self::Engine {
                status: failure.extended_code,
                message: message.unwrap_or_else(|| failure.to_string()),
            },
            other => Self::Engine {
                status: STATUS_FUNCTION_FAILED,
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidTransform(error.to_string())
    }
}

/// Pipeline errors; all of them are terminal
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Bad invocation
    #[error("error at usage: {0}")]
    Usage(String),

    /// Temp path or file operation failed
    #[error("error at {operation}: {source}")]
    Filesystem {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A database could not be opened
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    DatabaseOpen {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// Transform generation or stamping failed
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    DeltaGeneration {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// The storage entry could not be assigned
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    StorageAssign {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// The language property could not be read
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    PropertyRead {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// The language property could not be written or persisted
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    PropertyWrite {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },

    /// The final commit failed; the engine discarded every change
    #[error("error at {operation}: {source} (status {})", .source.status_code())]
    Commit {
        operation: &'static str,
        #[source]
        source: DatabaseError,
    },
}

impl EmbedError {
    /// Name of the operation that failed
    pub fn operation(&self) -> &str {
        match self {
            Self::Usage(_) => "usage",
            Self::Filesystem { operation, .. }
            | Self::DatabaseOpen { operation, .. }
            | Self::DeltaGeneration { operation, .. }
            | Self::StorageAssign { operation, .. }
            | Self::PropertyRead { operation, .. }
            | Self::PropertyWrite { operation, .. }
            | Self::Commit { operation, .. } => operation,
        }
    }

    /// Engine status code, for database failures only
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Usage(_) | Self::Filesystem { .. } => None,
            Self::DatabaseOpen { source, .. }
            | Self::DeltaGeneration { source, .. }
            | Self::StorageAssign { source, .. }
            | Self::PropertyRead { source, .. }
            | Self::PropertyWrite { source, .. }
            | Self::Commit { source, .. } => Some(source.status_code()),
        }
    }
}
