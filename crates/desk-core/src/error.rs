//! Error types for the dat-desk engine.
//!
//! One enum covers every subsystem so callers and the RPC layer deal with a
//! single error surface with stable JSON-RPC codes.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the dat-desk library.
#[derive(Debug, Error)]
pub enum DeskError {
    // Network errors
    #[error("Network unavailable: {message}")]
    NetworkUnavailable { message: String },

    // Registry errors
    #[error("Dat not found: {id}")]
    DatNotFound { id: String },

    #[error("Folder is already shared: {0}")]
    DuplicatePath(PathBuf),

    // Metadata extraction errors
    #[error("Metadata extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // RPC parameter validation
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for dat-desk operations.
pub type Result<T> = std::result::Result<T, DeskError>;

// Conversion implementations for common error types

impl From<std::io::Error> for DeskError {
    fn from(err: std::io::Error) -> Self {
        DeskError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DeskError {
    fn from(err: serde_json::Error) -> Self {
        DeskError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl DeskError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DeskError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network unavailable
    /// - -32001: Dat not found
    /// - -32002: Duplicate local path
    /// - -32003: Metadata extraction failed
    /// - -32004: Persistence failure
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            DeskError::NetworkUnavailable { .. } => -32000,

            DeskError::DatNotFound { .. } => -32001,

            DeskError::DuplicatePath(_) => -32002,

            DeskError::Extraction { .. }
            | DeskError::FileNotFound(_)
            | DeskError::NotADirectory(_) => -32003,

            DeskError::Io { .. } | DeskError::Json { .. } => -32004,

            DeskError::InvalidParams { .. } => -32602,

            // All other errors are internal errors
            _ => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeskError::NetworkUnavailable { .. })
    }
}
