//! Sparse offset index: logical offset to physical file position
//!
//! Only a sample of batch start positions is recorded, so a lookup returns
//! the nearest indexed position at or before the requested offset and the
//! caller scans forward from there.
//!
//! The index is persisted next to the log as a sequence of fixed 12-byte
//! entries (`relative_offset: u32`, `position: u64`, big-endian).

use crate::core::offset::Offset;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// 4 bytes relative offset, 8 bytes position
pub const INDEX_ENTRY_SIZE: usize = 12;

/// Default physical distance between samples (32KB)
pub const DEFAULT_INDEX_INTERVAL_BYTES: u64 = 32 * 1024;

/// Sampling cadence of the offset index
///
/// A batch is sampled once the distance since the previous sample (or the
/// start of the segment) reaches either threshold. A zero threshold disables
/// that trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexPolicy {
    /// Bytes appended since the last sample, the triggering batch included
    pub interval_bytes: u64,
    /// Logical offsets since the last sample
    pub interval_offsets: u64,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self {
            interval_bytes: DEFAULT_INDEX_INTERVAL_BYTES,
            interval_offsets: 0,
        }
    }
}

impl IndexPolicy {
    /// Sample every appended batch
    pub fn every_batch() -> Self {
        Self {
            interval_bytes: 1,
            interval_offsets: 0,
        }
    }

    fn should_sample(&self, bytes_since: u64, offsets_since: u64) -> bool {
        (self.interval_bytes > 0 && bytes_since >= self.interval_bytes)
            || (self.interval_offsets > 0 && offsets_since >= self.interval_offsets)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    /// offset relative to the base offset
    relative_offset: u32,
    /// byte offset within the log file
    position: u64,
}

/// Sparse, ascending logical-to-physical mapping for one segment
#[derive(Debug)]
pub struct OffsetIndex {
    path: PathBuf,
    base_offset: Offset,
    policy: IndexPolicy,
    entries: Vec<IndexEntry>,
    /// in-memory state differs from the persisted file
    dirty: bool,
    closed: bool,
}

impl OffsetIndex {
    /// Create an empty index for a new segment
    pub fn new<P: AsRef<Path>>(path: P, base_offset: Offset, policy: IndexPolicy) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            base_offset,
            policy,
            entries: Vec::new(),
            dirty: false,
            closed: false,
        }
    }

    /// Load a persisted index, or start empty if the file does not exist
    ///
    /// A torn trailing entry and any entries breaking the ascending order are
    /// dropped; the index is then rewritten on the next flush.
    pub async fn open<P: AsRef<Path>>(
        path: P,
        base_offset: Offset,
        policy: IndexPolicy,
    ) -> Result<Self> {
        let mut index = Self::new(path, base_offset, policy);

        let raw = match tokio::fs::read(&index.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(Error::Io(e)),
        };

        if raw.len() % INDEX_ENTRY_SIZE != 0 {
            warn!(
                path = %index.path.display(),
                len = raw.len(),
                "offset index has a torn trailing entry"
            );
            index.dirty = true;
        }

        let mut buf = &raw[..raw.len() - raw.len() % INDEX_ENTRY_SIZE];
        while buf.remaining() >= INDEX_ENTRY_SIZE {
            let entry = IndexEntry {
                relative_offset: buf.get_u32(),
                position: buf.get_u64(),
            };

            if let Some(last) = index.entries.last() {
                if entry.relative_offset <= last.relative_offset || entry.position <= last.position
                {
                    warn!(
                        path = %index.path.display(),
                        kept = index.entries.len(),
                        "offset index entries out of order, dropping the remainder"
                    );
                    index.dirty = true;
                    break;
                }
            }
            index.entries.push(entry);
        }

        debug!(
            path = %index.path.display(),
            entries = index.entries.len(),
            "loaded offset index"
        );
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base_offset(&self) -> Offset {
        self.base_offset
    }

    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded `(offset, position)` samples in ascending order
    pub fn entries(&self) -> impl Iterator<Item = (Offset, u64)> + '_ {
        self.entries
            .iter()
            .map(|e| (self.offset(e.relative_offset), e.position))
    }

    /// Last recorded sample
    pub fn last_entry(&self) -> Option<(Offset, u64)> {
        self.entries
            .last()
            .map(|e| (self.offset(e.relative_offset), e.position))
    }

    #[inline]
    fn offset(&self, relative_offset: u32) -> Offset {
        self.base_offset + relative_offset as i64
    }

    /// Record `(base_offset, physical_offset)` if the sampling policy asks for it
    ///
    /// Returns whether a sample was recorded.
    pub fn maybe_track(&mut self, base_offset: Offset, physical_offset: u64, byte_size: u64) -> bool {
        let (last_offset, last_position) = self
            .last_entry()
            .unwrap_or((self.base_offset, 0));

        if !self.entries.is_empty()
            && (base_offset <= last_offset || physical_offset <= last_position)
        {
            warn!(
                offset = %base_offset,
                position = physical_offset,
                last_offset = %last_offset,
                last_position,
                "non-increasing index sample ignored"
            );
            return false;
        }

        let bytes_since = (physical_offset + byte_size).saturating_sub(last_position);
        let offsets_since = (base_offset - last_offset).max(0) as u64;
        if !self.policy.should_sample(bytes_since, offsets_since) {
            return false;
        }

        let Some(relative_offset) = base_offset.relative_to(self.base_offset) else {
            warn!(
                base = %self.base_offset,
                offset = %base_offset,
                "offset not representable in the index, skipping sample"
            );
            return false;
        };

        self.entries.push(IndexEntry {
            relative_offset,
            position: physical_offset,
        });
        self.dirty = true;

        trace!(offset = %base_offset, position = physical_offset, "indexed batch");
        true
    }

    /// Physical position of the greatest indexed offset `<= target`
    pub fn lower_bound(&self, target: Offset) -> Option<u64> {
        if target < self.base_offset {
            return None;
        }

        let idx = self
            .entries
            .partition_point(|e| self.offset(e.relative_offset) <= target);

        idx.checked_sub(1).map(|i| self.entries[i].position)
    }

    /// Drop every entry with an offset greater than `bound`
    pub fn truncate(&mut self, bound: Offset) {
        let keep = if bound < self.base_offset {
            0
        } else {
            self.entries
                .partition_point(|e| self.offset(e.relative_offset) <= bound)
        };

        if keep < self.entries.len() {
            debug!(
                base = %self.base_offset,
                bound = %bound,
                dropped = self.entries.len() - keep,
                "truncated offset index"
            );
            self.entries.truncate(keep);
            self.dirty = true;
        }
    }

    /// Replace the whole content of the index
    pub(crate) fn replace_with(&mut self, other: OffsetIndex) {
        self.entries = other.entries;
        self.dirty = true;
    }

    /// Persist the index if it changed since the last flush
    pub async fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("offset index"));
        }
        if !self.dirty {
            return Ok(());
        }

        let mut buf = BytesMut::with_capacity(self.entries.len() * INDEX_ENTRY_SIZE);
        for entry in &self.entries {
            buf.put_u32(entry.relative_offset);
            buf.put_u64(entry.position);
        }

        // write aside and rename so a crash never leaves a half-written index
        let tmp_path = self.path.with_extension("index.tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&buf).await?;
        file.sync_data().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;

        self.dirty = false;
        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "flushed offset index"
        );
        Ok(())
    }

    /// Flush and stop accepting further flushes
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush().await?;
        self.closed = true;
        Ok(())
    }
}

impl fmt::Display for OffsetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OffsetIndex(base={}, entries={}",
            self.base_offset,
            self.entries.len()
        )?;
        if let Some((offset, position)) = self.last_entry() {
            write!(f, ", last=({offset}, {position})")?;
        }
        f.write_str(")")
    }
}
