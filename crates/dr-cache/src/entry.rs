//! Cache entries and their on-disk encoding.
//!
//! Each entry is a single file with a length-prefixed JSON header followed by
//! the raw content:
//!
//! ```text
//! [header_len: u32 LE][header JSON][content bytes]
//! ```
//!
//! Readers decode the header first so that expiry can be checked without
//! reading the content.

use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Upper bound for a header; anything larger is a corrupt file.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Whether cached content was produced as text or bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Binary,
}

/// A persisted render result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Hash key (see [`CacheKey`](crate::CacheKey)).
    pub key: String,
    /// Output format of the content.
    pub format: String,
    pub kind: ContentKind,
    pub content: Vec<u8>,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Time to live.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        format: impl Into<String>,
        kind: ContentKind,
        content: Vec<u8>,
        ttl: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            kind,
            content,
            created_at_ms: now_ms(),
            ttl,
        }
    }

    /// Whether the entry is stale at `now_ms`.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.header().is_expired_at(now_ms)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub(crate) fn header(&self) -> EntryHeader {
        EntryHeader {
            key: self.key.clone(),
            format: self.format.clone(),
            kind: self.kind,
            created_at_ms: self.created_at_ms,
            ttl_ms: u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Serialize to the on-disk representation.
    pub(crate) fn encode(&self) -> io::Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header())?;
        if header.len() > MAX_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "cache header too large",
            ));
        }
        let header_len = u32::try_from(header.len()).unwrap_or(u32::MAX);

        let mut buf = Vec::with_capacity(4 + header.len() + self.content.len());
        buf.extend_from_slice(&header_len.to_le_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.content);
        Ok(buf)
    }
}

/// Entry metadata stored in front of the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryHeader {
    pub key: String,
    pub format: String,
    pub kind: ContentKind,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
}

impl EntryHeader {
    /// An entry is live while `now < created_at + ttl`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.created_at_ms.saturating_add(self.ttl_ms)
    }

    /// Read the header from the start of `reader`.
    pub fn read_from(reader: &mut impl Read) -> io::Result<Self> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let header_len = u32::from_le_bytes(len_buf) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cache header length {header_len} exceeds {MAX_HEADER_LEN}"),
            ));
        }

        let mut header = vec![0u8; header_len];
        reader.read_exact(&mut header)?;
        serde_json::from_slice(&header).map_err(io::Error::from)
    }

    pub fn into_entry(self, content: Vec<u8>) -> CacheEntry {
        CacheEntry {
            key: self.key,
            format: self.format,
            kind: self.kind,
            content,
            created_at_ms: self.created_at_ms,
            ttl: Duration::from_millis(self.ttl_ms),
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
