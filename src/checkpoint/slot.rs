//! Durable checkpoint slot handling
//!
//! The slot file records how far the read projection has durably absorbed
//! the history log:
//! - format_version: Always 1
//! - store_id: Identity of the store generation the token belongs to
//! - token: Newest sequence token whose effects are fully projected
//! - updated_at: RFC3339 timestamp of the last persist
//!
//! Location: `<store_dir>/checkpoint.json`
//!
//! The slot is written AFTER the projection has applied a batch and is read
//! once at open. A slot naming a different store generation (after a
//! rebuild) or an unknown format version is discarded, never trusted.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{CheckpointError, CheckpointResult};
use crate::history::SequenceToken;

/// Current slot file format version
pub const SLOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SlotFile {
    format_version: u32,
    store_id: Uuid,
    token: u64,
    updated_at: String,
}

/// Reader and writer for one store's checkpoint slot.
///
/// Bound to a store generation by id: tokens from a previous generation of
/// the same directory (before a rebuild) are meaningless and must not bound
/// replay, so `load` rejects them.
#[derive(Debug, Clone)]
pub struct CheckpointSlot {
    path: PathBuf,
    store_id: Uuid,
}

impl CheckpointSlot {
    /// Creates a slot handle for the store generation `store_id`.
    pub fn new(path: PathBuf, store_id: Uuid) -> Self {
        Self { path, store_id }
    }

    /// Path of the slot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted token, if a usable one exists.
    ///
    /// A missing file is `Ok(None)`. Every error this returns is
    /// discardable except it never silently hides one: the caller decides
    /// to log and fall back to full replay.
    pub fn load(&self) -> CheckpointResult<Option<SequenceToken>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::decode_failed(format!(
                    "cannot read slot file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let slot: SlotFile = serde_json::from_str(&contents).map_err(|e| {
            CheckpointError::decode_failed(format!(
                "cannot parse slot file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if slot.format_version != SLOT_FORMAT_VERSION {
            return Err(CheckpointError::unsupported_version(slot.format_version));
        }
        if slot.store_id != self.store_id {
            return Err(CheckpointError::foreign_slot(self.store_id, slot.store_id));
        }

        Ok(Some(SequenceToken::new(slot.token)))
    }

    /// Persists `token` durably, fsyncing the file and its directory.
    pub fn persist(&self, token: SequenceToken) -> CheckpointResult<()> {
        let slot = SlotFile {
            format_version: SLOT_FORMAT_VERSION,
            store_id: self.store_id,
            token: token.value(),
            updated_at: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&slot).map_err(|e| {
            CheckpointError::persist_failed(
                "cannot serialize slot",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CheckpointError::persist_failed(
                        format!("cannot create slot directory {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let mut file = File::create(&self.path).map_err(|e| {
            CheckpointError::persist_failed(
                format!("cannot create slot file {}", self.path.display()),
                e,
            )
        })?;
        file.write_all(json.as_bytes()).map_err(|e| {
            CheckpointError::persist_failed(
                format!("cannot write slot file {}", self.path.display()),
                e,
            )
        })?;
        file.sync_all().map_err(|e| {
            CheckpointError::persist_failed(
                format!("cannot fsync slot file {}", self.path.display()),
                e,
            )
        })?;

        if let Some(parent) = self.path.parent() {
            let dir = OpenOptions::new().read(true).open(parent).map_err(|e| {
                CheckpointError::persist_failed(
                    format!("cannot open slot directory for fsync {}", parent.display()),
                    e,
                )
            })?;
            dir.sync_all().map_err(|e| {
                CheckpointError::persist_failed(
                    format!("cannot fsync slot directory {}", parent.display()),
                    e,
                )
            })?;
        }

        Ok(())
    }

    /// Removes the slot file if present. Used when a rebuild retires the
    /// store generation the slot belonged to.
    pub fn remove(&self) -> CheckpointResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::persist_failed(
                format!("cannot remove slot file {}", self.path.display()),
                e,
            )),
        }
    }
}

/// Returns the path to a store's checkpoint slot file
pub fn slot_path(store_dir: &Path) -> PathBuf {
    store_dir.join("checkpoint.json")
}
