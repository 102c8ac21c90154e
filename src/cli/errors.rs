//! CLI-specific error types
//!
//! CLI failures print one line to stderr and exit non-zero; nothing here is
//! recoverable in-process.

use std::fmt;
use std::io;

use crate::history::HistoryError;
use crate::merge::MergeError;
use crate::store::StoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Store could not be opened or operated on
    StoreFailed,
    /// Merge drain failed
    MergeFailed,
    /// History log unavailable
    HistoryUnavailable,
    /// I/O error (stdout)
    IoError,
    /// Already initialized
    AlreadyInitialized,
    /// Not initialized
    NotInitialized,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "MIR_CLI_STORE_FAILED",
            Self::MergeFailed => "MIR_CLI_MERGE_FAILED",
            Self::HistoryUnavailable => "MIR_CLI_HISTORY_UNAVAILABLE",
            Self::IoError => "MIR_CLI_IO_ERROR",
            Self::AlreadyInitialized => "MIR_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "MIR_CLI_NOT_INITIALIZED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Store failure
    pub fn store_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::StoreFailed, msg)
    }

    /// Merge failure
    pub fn merge_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::MergeFailed, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Already initialized
    pub fn already_initialized() -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            "Store directory already initialized",
        )
    }

    /// Not initialized
    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "Store directory not initialized. Run 'mirrordb init' first.",
        )
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self::store_failed(e.to_string())
    }
}

impl From<MergeError> for CliError {
    fn from(e: MergeError) -> Self {
        Self::merge_failed(e.to_string())
    }
}

impl From<HistoryError> for CliError {
    fn from(e: HistoryError) -> Self {
        Self::new(CliErrorCode::HistoryUnavailable, e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
