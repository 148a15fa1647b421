//! Unified error types for the purge engine.
//!
//! Error codes:
//! - RES_001: Memory guard tripped
//! - DB_001-002: Storage errors
//! - OUT_001: Dump output errors
//! - CONF_001: Configuration errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// DB_001: A fetch failed
    FetchFailed,
    /// DB_002: A delete or maintenance statement failed
    ExecuteFailed,
}

impl StorageErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FetchFailed => "DB_001",
            Self::ExecuteFailed => "DB_002",
        }
    }
}

/// Unified error type for the purge engine.
///
/// Every variant is fatal for the current invocation. Recovery happens by
/// invoking the run again; already deleted slices shrink the remaining work.
#[derive(Debug, Error)]
pub enum Error {
    /// The memory guard reported that the process is too close to its limit.
    #[error("[RES_001] memory exhausted: {used} bytes in use, limit {limit} bytes")]
    ResourceExhausted { used: u64, limit: u64 },

    /// Storage error with code.
    #[error("[{code}] {message}")]
    Storage {
        code: &'static str,
        message: String,
    },

    #[error("[OUT_001] dump output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("[CONF_001] configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn storage(code: StorageErrorCode, msg: impl Into<String>) -> Self {
        Self::Storage {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn resource_exhausted(used: u64, limit: u64) -> Self {
        Self::ResourceExhausted { used, limit }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from the memory guard.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::ResourceExhausted { .. } => Some("RES_001"),
            Self::Storage { code, .. } => Some(code),
            Self::Output(_) => Some("OUT_001"),
            Self::Config(_) => Some("CONF_001"),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
