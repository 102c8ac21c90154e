//! History log error types
//!
//! Error codes:
//! - MIR_HISTORY_UNAVAILABLE (ERROR severity, merge treats cycle as no-op)
//! - MIR_HISTORY_CORRUPTION (ERROR severity, surfaced as unavailable)
//! - MIR_HISTORY_APPEND_FAILED (ERROR severity, commit fails)
//! - MIR_HISTORY_FSYNC_FAILED (FATAL severity)
//!
//! Unlike a recovery WAL, a broken history log is not fatal to the process:
//! the read projection merely stops advancing until the store is rebuilt.
//! Only a failed fsync on the append path is fatal, because an acknowledged
//! commit without durable history would break exactly-once replay.

use std::fmt;
use std::io;

/// Severity levels for history log errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, engine continues (retry or no-op)
    Error,
    /// The writer session must stop; durability barrier broken
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// History log error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryErrorCode {
    /// History tracking disabled for this store
    Unavailable,
    /// Checksum or structural validation failed
    Corruption,
    /// Append write failed
    AppendFailed,
    /// fsync after append failed
    FsyncFailed,
}

impl HistoryErrorCode {
    /// Returns the stable string code.
    pub fn code(&self) -> &'static str {
        match self {
            HistoryErrorCode::Unavailable => "MIR_HISTORY_UNAVAILABLE",
            HistoryErrorCode::Corruption => "MIR_HISTORY_CORRUPTION",
            HistoryErrorCode::AppendFailed => "MIR_HISTORY_APPEND_FAILED",
            HistoryErrorCode::FsyncFailed => "MIR_HISTORY_FSYNC_FAILED",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            HistoryErrorCode::Unavailable => Severity::Error,
            HistoryErrorCode::Corruption => Severity::Error,
            HistoryErrorCode::AppendFailed => Severity::Error,
            HistoryErrorCode::FsyncFailed => Severity::Fatal,
        }
    }
}

impl fmt::Display for HistoryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// History log error with context.
#[derive(Debug)]
pub struct HistoryError {
    code: HistoryErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl HistoryError {
    /// History tracking is disabled for this store.
    pub fn tracking_disabled() -> Self {
        Self {
            code: HistoryErrorCode::Unavailable,
            message: "store was opened without history tracking".to_string(),
            details: None,
            source: None,
        }
    }

    /// Generic unavailability with a reason.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: HistoryErrorCode::Unavailable,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Structural or checksum corruption.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: HistoryErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Corruption with a byte-offset context.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: HistoryErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Corruption with a sequence-token context.
    pub fn corruption_at_token(token: u64, reason: impl Into<String>) -> Self {
        Self {
            code: HistoryErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("sequence_token: {}", token)),
            source: None,
        }
    }

    /// Append write failure.
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: HistoryErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// fsync failure on the append path.
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: HistoryErrorCode::FsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Returns the error code.
    pub fn code(&self) -> HistoryErrorCode {
        self.code
    }

    /// Returns the severity level.
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the merge coordinator should treat the cycle as a no-op
    /// (tracking disabled or log corrupted), leaving the checkpoint alone so
    /// the condition can self-heal.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.code,
            HistoryErrorCode::Unavailable | HistoryErrorCode::Corruption
        )
    }

    /// Whether the writer session must stop.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for history log operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            HistoryErrorCode::Unavailable.code(),
            "MIR_HISTORY_UNAVAILABLE"
        );
        assert_eq!(HistoryErrorCode::Corruption.code(), "MIR_HISTORY_CORRUPTION");
        assert_eq!(
            HistoryErrorCode::AppendFailed.code(),
            "MIR_HISTORY_APPEND_FAILED"
        );
        assert_eq!(
            HistoryErrorCode::FsyncFailed.code(),
            "MIR_HISTORY_FSYNC_FAILED"
        );
    }

    #[test]
    fn test_only_fsync_is_fatal() {
        assert!(!HistoryError::tracking_disabled().is_fatal());
        assert!(!HistoryError::corruption("bad checksum").is_fatal());
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        assert!(!HistoryError::append_failed("write", io_err).is_fatal());
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        assert!(HistoryError::fsync_failed("fsync", io_err).is_fatal());
    }

    #[test]
    fn test_corruption_counts_as_unavailable() {
        assert!(HistoryError::tracking_disabled().is_unavailable());
        assert!(HistoryError::corruption_at_offset(12, "truncated").is_unavailable());
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        assert!(!HistoryError::append_failed("write", io_err).is_unavailable());
    }

    #[test]
    fn test_display_contains_code_and_details() {
        let err = HistoryError::corruption_at_token(42, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("MIR_HISTORY_CORRUPTION"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("sequence_token: 42"));
    }
}
