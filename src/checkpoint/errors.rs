//! Checkpoint-specific error types
//!
//! Checkpoint errors are never fatal. The slot is an optimization that
//! bounds replay work; when it cannot be read it is discarded and the full
//! retained log is replayed, and when it cannot be written the in-memory
//! checkpoint stays authoritative and the persist is retried on the next
//! merge cycle.

use std::fmt;
use std::io;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed but the projection stays consistent
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Checkpoint error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorCode {
    /// Slot file could not be written durably
    PersistFailed,
    /// Slot file exists but could not be decoded
    DecodeFailed,
    /// Slot file belongs to a different store generation
    ForeignSlot,
    /// Slot file uses a format version this build does not understand
    UnsupportedVersion,
}

impl CheckpointErrorCode {
    /// Returns the string representation of this code
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointErrorCode::PersistFailed => "MIR_CHECKPOINT_PERSIST_FAILED",
            CheckpointErrorCode::DecodeFailed => "MIR_CHECKPOINT_DECODE_FAILED",
            CheckpointErrorCode::ForeignSlot => "MIR_CHECKPOINT_FOREIGN_SLOT",
            CheckpointErrorCode::UnsupportedVersion => "MIR_CHECKPOINT_UNSUPPORTED_VERSION",
        }
    }

    /// Returns the severity level for this error code
    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

impl fmt::Display for CheckpointErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checkpoint error with full context
#[derive(Debug)]
pub struct CheckpointError {
    code: CheckpointErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl CheckpointError {
    fn new(code: CheckpointErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    /// Creates a persist failure error
    pub fn persist_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(CheckpointErrorCode::PersistFailed, message, Some(source))
    }

    /// Creates a decode failure error
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::new(CheckpointErrorCode::DecodeFailed, message, None)
    }

    /// Creates an error for a slot written by a different store generation
    pub fn foreign_slot(expected: impl fmt::Display, found: impl fmt::Display) -> Self {
        Self::new(
            CheckpointErrorCode::ForeignSlot,
            format!("slot names store {} but this store is {}", found, expected),
            None,
        )
    }

    /// Creates an error for an unknown slot format version
    pub fn unsupported_version(found: u32) -> Self {
        Self::new(
            CheckpointErrorCode::UnsupportedVersion,
            format!("slot format version {} is not supported", found),
            None,
        )
    }

    /// Returns the error code
    pub fn code(&self) -> CheckpointErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity of this error
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Whether the caller should treat the slot as absent and fall back to
    /// replaying the full retained log.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self.code,
            CheckpointErrorCode::DecodeFailed
                | CheckpointErrorCode::ForeignSlot
                | CheckpointErrorCode::UnsupportedVersion
        )
    }

    /// Checkpoint errors never require process termination
    pub fn is_fatal(&self) -> bool {
        false
    }
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code,
            self.message
        )?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;
