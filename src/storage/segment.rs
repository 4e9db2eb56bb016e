//! Segment: one append-only log file with its index, reader and cache
//!
//! A segment ties together the four components that make up a unit of log
//! storage and keeps them consistent:
//!
//! - the [`Appender`], present only while the segment accepts writes
//! - the [`Reader`], whose watermarks decide what readers may observe
//! - the [`OffsetIndex`], sampled on append and cut on truncation
//! - the optional [`BatchCache`], fed on append and cut on truncation
//!
//! Data moves through three stages: appended (written through the appender,
//! reflected in the dirty offset), flushed (durable), then visible (reader
//! watermarks advanced). Watermarks only move past data once it is flushed.
//!
//! # Single writer
//!
//! The write path (`append`, `truncate`, `flush`, `release_appender`,
//! `close`) takes `&mut self` and no locking happens inside the segment.
//! Callers sharing a segment between tasks must serialize writes themselves,
//! typically with one writer task per segment. Reads go through a cloned
//! [`Reader`] and may run concurrently with writes.

use crate::config::{self, SegmentConfig};
use crate::core::batch::RecordBatch;
use crate::core::offset::Offset;
use crate::error::{Error, Result};
use crate::index::OffsetIndex;
use crate::storage::appender::Appender;
use crate::storage::cache::BatchCache;
use crate::storage::reader::{DataStream, IoPriority, Reader};
use crate::storage::recovery;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    pub base_offset: Offset,
    pub last_offset: Offset,
    /// Bytes the batch occupies in the segment file
    pub byte_size: u64,
}

impl fmt::Display for AppendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AppendResult(base={}, last={}, bytes={})",
            self.base_offset, self.last_offset, self.byte_size
        )
    }
}

/// Single append-only storage unit covering a contiguous offset range
pub struct Segment {
    base_offset: Offset,
    dirty_offset: Option<Offset>,
    reader: Reader,
    appender: Option<Appender>,
    index: OffsetIndex,
    cache: Option<Arc<BatchCache>>,
    write_halted: bool,
}

impl Segment {
    /// Assemble a segment from its parts
    pub fn new(
        base_offset: Offset,
        dirty_offset: Option<Offset>,
        reader: Reader,
        index: OffsetIndex,
        appender: Option<Appender>,
        cache: Option<Arc<BatchCache>>,
    ) -> Self {
        Self {
            base_offset,
            dirty_offset,
            reader,
            appender,
            index,
            cache,
            write_halted: false,
        }
    }

    /// Create a new, empty, writable segment in `dir`
    pub async fn create<P: AsRef<Path>>(
        dir: P,
        base_offset: Offset,
        config: &SegmentConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_base_offset(base_offset)?;
        let dir = dir.as_ref();
        let log_path = config::log_path(dir, base_offset);

        let appender = Appender::create(&log_path, config.write_buffer_size).await?;
        let reader = Reader::new(&log_path);
        let index = OffsetIndex::new(
            config::index_path(dir, base_offset),
            base_offset,
            config.index,
        );
        let cache = config.cache.map(|c| Arc::new(BatchCache::new(c.max_bytes)));

        info!(path = %log_path.display(), base = %base_offset, "created segment");
        Ok(Self::new(
            base_offset,
            None,
            reader,
            index,
            Some(appender),
            cache,
        ))
    }

    /// Open an existing segment read-only
    ///
    /// The file is scanned to find the valid prefix; a torn or corrupt tail is
    /// truncated away and the offset index is reconciled with the data.
    pub async fn recover<P: AsRef<Path>>(
        dir: P,
        base_offset: Offset,
        config: &SegmentConfig,
    ) -> Result<Self> {
        let (reader, mut index, recovered) =
            Self::recover_parts(dir.as_ref(), base_offset, config).await?;

        if recovered.has_tail() {
            reader.truncate(recovered.valid_end).await?;
        }
        index.flush().await?;

        info!(
            path = %reader.path().display(),
            base = %base_offset,
            last = ?recovered.last_offset.map(|o| o.value()),
            bytes = recovered.valid_end,
            "recovered read-only segment"
        );
        Ok(Self::new(
            base_offset,
            recovered.last_offset,
            reader,
            index,
            None,
            None,
        ))
    }

    /// Open an existing segment and keep appending to it
    pub async fn recover_active<P: AsRef<Path>>(
        dir: P,
        base_offset: Offset,
        config: &SegmentConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (reader, mut index, recovered) =
            Self::recover_parts(dir.as_ref(), base_offset, config).await?;

        let mut appender = Appender::open(reader.path(), config.write_buffer_size).await?;
        if recovered.has_tail() {
            appender.truncate(recovered.valid_end).await?;
        }
        index.flush().await?;
        let cache = config.cache.map(|c| Arc::new(BatchCache::new(c.max_bytes)));

        info!(
            path = %reader.path().display(),
            base = %base_offset,
            last = ?recovered.last_offset.map(|o| o.value()),
            bytes = recovered.valid_end,
            "recovered active segment"
        );
        Ok(Self::new(
            base_offset,
            recovered.last_offset,
            reader,
            index,
            Some(appender),
            cache,
        ))
    }

    async fn recover_parts(
        dir: &Path,
        base_offset: Offset,
        config: &SegmentConfig,
    ) -> Result<(Reader, OffsetIndex, recovery::Recovered)> {
        check_base_offset(base_offset)?;
        let log_path = config::log_path(dir, base_offset);
        let index = OffsetIndex::open(
            config::index_path(dir, base_offset),
            base_offset,
            config.index,
        )
        .await?;

        let (index, recovered) = recovery::recover(&log_path, index).await?;
        let reader =
            Reader::with_watermarks(&log_path, recovered.last_offset, recovered.valid_end);
        Ok((reader, index, recovered))
    }

    pub fn base_offset(&self) -> Offset {
        self.base_offset
    }

    /// Highest offset appended so far, `None` for an empty segment
    pub fn dirty_offset(&self) -> Option<Offset> {
        self.dirty_offset
    }

    pub fn has_appender(&self) -> bool {
        self.appender.is_some()
    }

    pub fn appender(&self) -> Option<&Appender> {
        self.appender.as_ref()
    }

    /// Reader of this segment; clone it to stream concurrently with writes
    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn index(&self) -> &OffsetIndex {
        &self.index
    }

    pub fn cache(&self) -> Option<&Arc<BatchCache>> {
        self.cache.as_ref()
    }

    /// Whether a corruption stopped the write path
    pub fn is_write_halted(&self) -> bool {
        self.write_halted
    }

    /// Physical size, including appended but unflushed bytes
    pub fn size_bytes(&self) -> u64 {
        self.appender
            .as_ref()
            .map_or_else(|| self.reader.last_visible_byte_offset(), |a| a.file_byte_offset())
    }

    /// Append one batch at the end of the segment
    ///
    /// The batch must start after the current dirty offset. The batch is not
    /// visible to readers until the next [`Segment::flush`].
    ///
    /// If the number of bytes written differs from the batch's declared size
    /// the bytes are discarded, the write path is halted for good and
    /// [`Error::Corruption`] is returned.
    ///
    /// # Panics
    ///
    /// Panics if the segment has no appender (it was created read-only or its
    /// appender was released).
    pub async fn append(&mut self, batch: RecordBatch) -> Result<AppendResult> {
        let segment_base = self.base_offset;
        let Some(appender) = self.appender.as_mut() else {
            panic!("append on segment {segment_base} without an appender");
        };

        if self.write_halted {
            return Err(Error::WriteHalted {
                base_offset: segment_base.value(),
            });
        }

        let base_offset = batch.base_offset();
        let Some(last_offset) = batch.header().checked_last_offset() else {
            return Err(Error::Corruption(format!(
                "batch at {base_offset} overflows the offset range"
            )));
        };
        let extends = base_offset >= segment_base
            && last_offset >= base_offset
            && self.dirty_offset.map_or(true, |dirty| base_offset > dirty);
        if !extends {
            return Err(Error::OffsetOutOfOrder {
                base_offset: base_offset.value(),
                segment_base: segment_base.value(),
                dirty_offset: self.dirty_offset.map(|o| o.value()),
            });
        }

        let start = appender.file_byte_offset();
        if let Err(e) = appender.append(&batch.encode()).await {
            Self::rollback(appender, start).await;
            return Err(e);
        }

        let end = appender.file_byte_offset();
        let byte_size = end - start;
        if byte_size != batch.size_bytes() as u64 {
            error!(
                path = %appender.path().display(),
                offset = %base_offset,
                start,
                end,
                declared = batch.size_bytes(),
                "batch size mismatch, halting segment writes"
            );
            self.write_halted = true;
            Self::rollback(appender, start).await;
            return Err(Error::Corruption(format!(
                "size must be deterministic: batch {base_offset} wrote {byte_size} bytes, declared {}",
                batch.size_bytes()
            )));
        }

        self.dirty_offset = Some(last_offset);
        self.index.maybe_track(base_offset, start, byte_size);

        let result = AppendResult {
            base_offset,
            last_offset,
            byte_size,
        };
        if let Some(cache) = &self.cache {
            cache.put(batch);
        }

        trace!(%result, position = start, "appended batch");
        Ok(result)
    }

    async fn rollback(appender: &mut Appender, position: u64) {
        if let Err(e) = appender.truncate(position).await {
            warn!(
                path = %appender.path().display(),
                position,
                error = %e,
                "failed to discard bytes of a failed append"
            );
        }
    }

    /// Discard everything after `prev_last_offset`, which ends at `physical_position`
    ///
    /// `physical_position` must be the end of the batch holding
    /// `prev_last_offset` (0 to empty the segment). The file is truncated
    /// exactly once: through the appender when the segment is writable, else
    /// through the reader.
    pub async fn truncate(&mut self, prev_last_offset: Offset, physical_position: u64) -> Result<()> {
        let highest = self.dirty_offset.unwrap_or(self.base_offset.prev());
        if prev_last_offset > highest {
            return Err(Error::InvalidTruncation(format!(
                "offset {prev_last_offset} is beyond the end of segment {} ({highest})",
                self.base_offset
            )));
        }

        let physical_end = self.size_bytes();
        if physical_position > physical_end {
            return Err(Error::InvalidTruncation(format!(
                "position {physical_position} is beyond the end of segment {} ({physical_end})",
                self.base_offset
            )));
        }

        let dirty_offset = (prev_last_offset >= self.base_offset).then_some(prev_last_offset);
        self.dirty_offset = dirty_offset;
        self.reader.set_last_written_offset(dirty_offset);
        self.reader.set_last_visible_byte_offset(physical_position);

        if let Some(cache) = &self.cache {
            cache.truncate(prev_last_offset.next());
        }
        self.index.truncate(prev_last_offset);

        match self.appender.as_mut() {
            Some(appender) => appender.truncate(physical_position).await?,
            None => self.reader.truncate(physical_position).await?,
        }

        info!(
            base = %self.base_offset,
            offset = %prev_last_offset,
            position = physical_position,
            "truncated segment"
        );
        Ok(())
    }

    /// Make appended data durable, then visible to readers
    ///
    /// Does nothing on a segment without an appender.
    pub async fn flush(&mut self) -> Result<()> {
        let Some(appender) = self.appender.as_mut() else {
            return Ok(());
        };

        let previous = self.reader.last_written_offset();
        self.reader.set_last_written_offset(self.dirty_offset);

        if let Err(e) = appender.flush().await {
            self.reader.set_last_written_offset(previous);
            return Err(e);
        }

        let visible = appender.file_byte_offset();
        self.reader.set_last_visible_byte_offset(visible);

        debug!(
            base = %self.base_offset,
            dirty = ?self.dirty_offset.map(|o| o.value()),
            visible,
            "flushed segment"
        );
        Ok(())
    }

    /// Turn the segment read-only: flush, close the appender, persist the
    /// index, then drop the appender and the cache
    ///
    /// # Panics
    ///
    /// Panics if the appender was already released.
    pub async fn release_appender(&mut self) -> Result<()> {
        assert!(
            self.appender.is_some(),
            "cannot release a missing appender of segment {}",
            self.base_offset
        );

        self.flush().await?;
        if let Some(appender) = self.appender.as_mut() {
            appender.close().await?;
        }
        self.index.flush().await?;

        self.appender = None;
        self.cache = None;

        info!(base = %self.base_offset, "released segment appender");
        Ok(())
    }

    /// Close the reader, then the appender (flushing it), then the index
    pub async fn close(mut self) -> Result<()> {
        self.reader.close().await?;
        if let Some(appender) = self.appender.as_mut() {
            appender.close().await?;
        }
        self.index.close().await?;

        info!(base = %self.base_offset, "closed segment");
        Ok(())
    }

    /// Stream starting at or before `offset`
    ///
    /// The index only knows a sample of batch positions, so the stream may
    /// start before the batch holding `offset`; use [`DataStream::skip_to`]
    /// to scan forward.
    pub async fn offset_data_stream(&self, offset: Offset, priority: IoPriority) -> Result<DataStream> {
        let position = self.index.lower_bound(offset).unwrap_or(0);
        self.reader.data_stream(position, priority).await
    }

    /// Cached batch holding `offset`, if it is cached and already published to readers
    pub fn cached_batch(&self, offset: Offset) -> Option<Arc<RecordBatch>> {
        let last_written = self.reader.last_written_offset()?;
        if offset > last_written {
            return None;
        }
        self.cache.as_ref()?.get_containing(offset)
    }
}

/// Offsets are non-negative; negative values are reserved for watermark sentinels
fn check_base_offset(base_offset: Offset) -> Result<()> {
    if base_offset.value() < 0 {
        return Err(Error::Configuration(format!(
            "segment base offset must be non-negative, got {base_offset}"
        )));
    }
    Ok(())
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment(base={}, dirty_offset=", self.base_offset)?;
        match self.dirty_offset {
            Some(offset) => write!(f, "{offset}")?,
            None => f.write_str("none")?,
        }
        write!(f, ", reader={}, writer=", self.reader)?;
        match &self.appender {
            Some(appender) => write!(f, "{appender}")?,
            None => f.write_str("none")?,
        }
        write!(f, ", index={}", self.index)?;
        if let Some(cache) = &self.cache {
            write!(f, ", cache={cache}")?;
        }
        if self.write_halted {
            f.write_str(", halted")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("dirty_offset", &self.dirty_offset)
            .field("reader", &self.reader)
            .field("appender", &self.appender)
            .field("index", &self.index)
            .field("write_halted", &self.write_halted)
            .finish_non_exhaustive()
    }
}
