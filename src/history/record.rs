//! History record types and binary codec
//!
//! Each logged transaction is framed as:
//! - Record Length (u32 LE, total including length and checksum)
//! - Sequence Token (u64 LE)
//! - Timestamp (i64 LE, milliseconds since epoch, UTC)
//! - Author tag (u32 LE length + UTF-8 bytes)
//! - Affected identity count (u32 LE), then per identity:
//!   u32 LE length + UTF-8 bytes
//! - Checksum (u32 LE, CRC32 over everything before it)
//!
//! The codec is deterministic: serializing the same transaction always
//! produces the same bytes, so pruning can rewrite a retained tail
//! byte-identically.

use std::collections::HashSet;
use std::io::{self, Cursor, Read};

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Minimum serialized size: length + token + timestamp + author length +
/// identity count + checksum, with empty author and no identities.
pub(crate) const MIN_RECORD_SIZE: u64 = 4 + 8 + 8 + 4 + 4 + 4;

/// Opaque, totally ordered position in the store's history.
///
/// Tokens are assigned at commit time, strictly monotonically increasing
/// across the store lifetime and independent of which writer session
/// produced the transaction. Consumers compare and persist tokens; they
/// never derive meaning from the numeric value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequenceToken(u64);

impl SequenceToken {
    /// Wraps a raw token value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the immediately following token.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, store-wide identity of a persisted record.
///
/// Independent of any transient in-memory object identity; the same id
/// always names the same logical record across sessions and processes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One durably-logged, atomic set of record changes.
///
/// `affected` is deduplicated and preserves commit order; it names which
/// identities changed, never what changed. The merge path refetches
/// current committed values by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Position of this transaction in the store's history.
    pub token: SequenceToken,
    /// Commit wall-clock time (informational; ordering comes from the token).
    pub timestamp: DateTime<Utc>,
    /// Tag identifying the writer session that produced the commit.
    pub author: String,
    /// Identities touched by this transaction, deduplicated, commit order.
    pub affected: Vec<RecordId>,
}

impl Transaction {
    /// Creates a transaction, deduplicating `affected` while preserving the
    /// first occurrence order.
    pub fn new(
        token: SequenceToken,
        timestamp: DateTime<Utc>,
        author: impl Into<String>,
        affected: Vec<RecordId>,
    ) -> Self {
        let mut seen = HashSet::new();
        let affected = affected
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            token,
            timestamp,
            author: author.into(),
            affected,
        }
    }

    /// Serializes the transaction into its framed binary form.
    pub fn serialize(&self) -> Vec<u8> {
        let author_bytes = self.author.as_bytes();
        let ids_len: usize = self
            .affected
            .iter()
            .map(|id| 4 + id.as_str().len())
            .sum();
        let total = MIN_RECORD_SIZE as usize + author_bytes.len() + ids_len;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&self.token.value().to_le_bytes());
        buf.extend_from_slice(&self.timestamp.timestamp_millis().to_le_bytes());
        buf.extend_from_slice(&(author_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(author_bytes);
        buf.extend_from_slice(&(self.affected.len() as u32).to_le_bytes());
        for id in &self.affected {
            let id_bytes = id.as_str().as_bytes();
            buf.extend_from_slice(&(id_bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(id_bytes);
        }

        let mut hasher = Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());

        debug_assert_eq!(buf.len(), total);
        buf
    }

    /// Deserializes a transaction from a buffer holding exactly one framed
    /// record, verifying the checksum and structure.
    ///
    /// Returns the transaction and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if (data.len() as u64) < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "history record too short",
            ));
        }

        let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if declared != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "declared record length {} does not match buffer length {}",
                    declared,
                    data.len()
                ),
            ));
        }

        // Checksum trailer covers everything before it, length included
        let body = &data[..data.len() - 4];
        let expected = u32::from_le_bytes([
            data[data.len() - 4],
            data[data.len() - 3],
            data[data.len() - 2],
            data[data.len() - 1],
        ]);
        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "history record checksum mismatch",
            ));
        }

        let mut cursor = Cursor::new(&body[4..]);

        let mut u64_buf = [0u8; 8];
        cursor.read_exact(&mut u64_buf)?;
        let token = SequenceToken::new(u64::from_le_bytes(u64_buf));

        cursor.read_exact(&mut u64_buf)?;
        let millis = i64::from_le_bytes(u64_buf);
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("timestamp out of range: {}", millis),
            )
        })?;

        let author = read_string(&mut cursor)?;

        let mut u32_buf = [0u8; 4];
        cursor.read_exact(&mut u32_buf)?;
        let count = u32::from_le_bytes(u32_buf) as usize;

        let mut affected = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            affected.push(RecordId::new(read_string(&mut cursor)?));
        }

        if cursor.position() as usize != body.len() - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes inside history record",
            ));
        }

        Ok((
            Self {
                token,
                timestamp,
                author,
                affected,
            },
            declared,
        ))
    }
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    let mut len_buf = [0u8; 4];
    cursor.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {}", e)))
}
