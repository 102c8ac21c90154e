//! Store meta file handling
//!
//! `<store_dir>/meta.json` records:
//! - schema_version: On-disk format generation, checked at open
//! - store_id: Identity of this store generation, regenerated by rebuild
//! - created_at: RFC3339 timestamp
//!
//! The store id is what binds checkpoints to a generation: after a
//! destructive rebuild the id changes and stale checkpoint slots stop
//! matching.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};

/// On-disk schema version this build reads and writes
pub const SCHEMA_VERSION: u32 = 1;

/// Store meta file contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMeta {
    /// Schema version of every file in the store directory
    pub schema_version: u32,

    /// Identity of this store generation
    pub store_id: Uuid,

    /// When this generation was created (RFC3339)
    pub created_at: String,
}

impl StoreMeta {
    /// Creates meta for a brand-new store generation.
    pub fn fresh() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            store_id: Uuid::new_v4(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Loads and validates the meta file.
    ///
    /// Missing file is `Ok(None)` (a directory that was never initialized).
    /// An undecodable file or an unsupported schema version is an error the
    /// open path answers with a destructive rebuild.
    pub fn load(path: &Path) -> StoreResult<Option<Self>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let meta: StoreMeta = serde_json::from_str(&contents)
            .map_err(|e| StoreError::CorruptMeta(e.to_string()))?;

        if meta.schema_version != SCHEMA_VERSION {
            return Err(StoreError::IncompatibleSchema {
                found: meta.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Some(meta))
    }

    /// Writes the meta file durably, fsyncing the file and its directory.
    pub fn persist(&self, path: &Path) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::CorruptMeta(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        if let Some(parent) = path.parent() {
            let dir = OpenOptions::new().read(true).open(parent)?;
            dir.sync_all()?;
        }

        Ok(())
    }

    /// Loads the meta file, initializing a fresh generation when absent.
    pub fn load_or_init(path: &Path) -> StoreResult<Self> {
        match Self::load(path)? {
            Some(meta) => Ok(meta),
            None => {
                let meta = Self::fresh();
                meta.persist(path)?;
                Ok(meta)
            }
        }
    }
}
