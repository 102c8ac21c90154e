//! Committed-records file
//!
//! Append-only, no in-place updates. Each committed version of a record is
//! one checksummed frame; the latest frame per id (by file order) wins, and
//! deletes are tombstone frames. Commit ordering puts record frames on disk
//! and fsyncs them before the transaction enters the history log, so any
//! observer of a logged transaction can already refetch its effects.
//!
//! Frame layout:
//! - Frame Length (u32 LE, total including length and checksum)
//! - Sequence Token (u64 LE)
//! - Flags (u8, bit 0 = tombstone)
//! - Record id (u32 LE length + UTF-8 bytes)
//! - Payload (u32 LE length + JSON bytes, empty for tombstones)
//! - Checksum (u32 LE, CRC32 over everything before it)

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use crate::history::{RecordId, SequenceToken};

const MIN_FRAME_SIZE: usize = 4 + 8 + 1 + 4 + 4 + 4;
const FLAG_TOMBSTONE: u8 = 0b0000_0001;

struct VersionEntry {
    token: SequenceToken,
    /// `None` is a tombstone.
    value: Option<Value>,
}

/// Append-only store of committed record versions with a latest-wins index.
///
/// The index is folded forward incrementally: every fetch first scans any
/// bytes appended since the last scan, which is how versions committed by
/// other processes become visible. An incomplete trailing frame is left
/// alone (it may be a foreign append still in flight) and re-examined on
/// the next refresh.
pub struct RecordStore {
    path: PathBuf,
    file: File,
    index: HashMap<RecordId, VersionEntry>,
    scan_offset: u64,
    highest_token: Option<SequenceToken>,
}

impl RecordStore {
    /// Opens (creating if absent) the records file at `path`.
    ///
    /// A torn trailing frame left by a crashed commit is truncated away so
    /// new frames start on a clean boundary. A frame that is fully present
    /// but invalid is corruption and fails the open.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut store = Self {
            path: path.to_path_buf(),
            file,
            index: HashMap::new(),
            scan_offset: 0,
            highest_token: None,
        };

        store.refresh()?;

        let file_len = store.file.metadata()?.len();
        if store.scan_offset < file_len {
            store.file.set_len(store.scan_offset)?;
            store.file.sync_all()?;
        }

        Ok(store)
    }

    /// Folds frames appended since the last scan into the index.
    fn refresh(&mut self) -> StoreResult<()> {
        let mut reader = File::open(&self.path)?;
        reader.seek(SeekFrom::Start(self.scan_offset))?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let mut offset = 0usize;
        while offset < buf.len() {
            match decode_frame(&buf[offset..]) {
                FrameParse::Incomplete => break,
                FrameParse::Corrupt(reason) => {
                    return Err(StoreError::CorruptRecords {
                        offset: self.scan_offset + offset as u64,
                        reason,
                    })
                }
                FrameParse::Version {
                    token,
                    id,
                    value,
                    consumed,
                } => {
                    let newer = self
                        .index
                        .get(&id)
                        .map(|entry| token >= entry.token)
                        .unwrap_or(true);
                    if newer {
                        self.index.insert(id, VersionEntry { token, value });
                    }
                    if self.highest_token.map(|t| token > t).unwrap_or(true) {
                        self.highest_token = Some(token);
                    }
                    offset += consumed;
                }
            }
        }

        self.scan_offset += offset as u64;
        Ok(())
    }

    /// Appends one version frame. The caller batches frames for a commit
    /// and calls [`RecordStore::sync`] once before the transaction is
    /// logged.
    pub fn append_version(
        &mut self,
        token: SequenceToken,
        id: &RecordId,
        value: Option<&Value>,
    ) -> StoreResult<()> {
        let payload = match value {
            Some(value) => serde_json::to_vec(value).map_err(|e| {
                StoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?,
            None => Vec::new(),
        };
        let id_bytes = id.as_str().as_bytes();
        let total = MIN_FRAME_SIZE + id_bytes.len() + payload.len();

        let mut frame = Vec::with_capacity(total);
        frame.extend_from_slice(&(total as u32).to_le_bytes());
        frame.extend_from_slice(&token.value().to_le_bytes());
        frame.push(if value.is_none() { FLAG_TOMBSTONE } else { 0 });
        frame.extend_from_slice(&(id_bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(id_bytes);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut hasher = Hasher::new();
        hasher.update(&frame);
        frame.extend_from_slice(&hasher.finalize().to_le_bytes());

        self.file.write_all(&frame)?;

        if self.highest_token.map(|t| token > t).unwrap_or(true) {
            self.highest_token = Some(token);
        }
        Ok(())
    }

    /// Fsyncs appended frames. Must complete before the transaction that
    /// produced them is appended to the history log.
    pub fn sync(&self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current committed value for `id`, or `None` if never written or
    /// deleted. Always refreshes first so foreign commits are visible.
    pub fn fetch_current(&mut self, id: &RecordId) -> StoreResult<Option<Value>> {
        self.refresh()?;
        Ok(self
            .index
            .get(id)
            .and_then(|entry| entry.value.as_ref().cloned()))
    }

    /// Number of live (non-deleted) records.
    pub fn live_count(&mut self) -> StoreResult<usize> {
        self.refresh()?;
        Ok(self
            .index
            .values()
            .filter(|entry| entry.value.is_some())
            .count())
    }

    /// Token the next commit should use when the store has no history log
    /// to assign one.
    pub fn next_token(&mut self) -> StoreResult<SequenceToken> {
        self.refresh()?;
        Ok(self
            .highest_token
            .map(|t| t.next())
            .unwrap_or_else(|| SequenceToken::new(1)))
    }
}

enum FrameParse {
    /// The buffer ends mid-frame.
    Incomplete,
    Corrupt(String),
    Version {
        token: SequenceToken,
        id: RecordId,
        value: Option<Value>,
        consumed: usize,
    },
}

fn decode_frame(buf: &[u8]) -> FrameParse {
    if buf.len() < 4 {
        return FrameParse::Incomplete;
    }
    let declared = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if declared < MIN_FRAME_SIZE {
        return FrameParse::Corrupt(format!("impossible frame length {}", declared));
    }
    if declared > buf.len() {
        return FrameParse::Incomplete;
    }

    let frame = &buf[..declared];
    let body = &frame[..declared - 4];
    let expected = u32::from_le_bytes([
        frame[declared - 4],
        frame[declared - 3],
        frame[declared - 2],
        frame[declared - 1],
    ]);
    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != expected {
        return FrameParse::Corrupt("frame checksum mismatch".to_string());
    }

    let token = SequenceToken::new(u64::from_le_bytes([
        frame[4], frame[5], frame[6], frame[7], frame[8], frame[9], frame[10], frame[11],
    ]));
    let flags = frame[12];

    let id_len = u32::from_le_bytes([frame[13], frame[14], frame[15], frame[16]]) as usize;
    let id_end = 17 + id_len;
    if id_end + 4 > declared - 4 {
        return FrameParse::Corrupt("record id overruns frame".to_string());
    }
    let id = match std::str::from_utf8(&frame[17..id_end]) {
        Ok(id) => RecordId::new(id),
        Err(e) => return FrameParse::Corrupt(format!("record id is not UTF-8: {}", e)),
    };

    let payload_len = u32::from_le_bytes([
        frame[id_end],
        frame[id_end + 1],
        frame[id_end + 2],
        frame[id_end + 3],
    ]) as usize;
    let payload_end = id_end + 4 + payload_len;
    if payload_end != declared - 4 {
        return FrameParse::Corrupt("payload length does not fill frame".to_string());
    }

    let value = if flags & FLAG_TOMBSTONE != 0 {
        None
    } else {
        match serde_json::from_slice(&frame[id_end + 4..payload_end]) {
            Ok(value) => Some(value),
            Err(e) => return FrameParse::Corrupt(format!("payload is not valid JSON: {}", e)),
        }
    };

    FrameParse::Version {
        token,
        id,
        value,
        consumed: declared,
    }
}
