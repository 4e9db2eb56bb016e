//! Reader: watermark-bounded read access to a segment file

use crate::core::batch::{BatchDecoder, RecordBatch};
use crate::core::offset::Offset;
use crate::error::{Error, Result};
use futures::{Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

/// Sentinel for "nothing written yet"
///
/// Segments only hold non-negative offsets, so `i64::MIN` is never a real
/// watermark.
const NO_OFFSET: i64 = i64::MIN;

/// Advisory scheduling hint for stream reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IoPriority {
    /// Consumer fetches
    #[default]
    Normal,
    /// Latency sensitive reads (e.g. replication catch-up)
    High,
    /// Background scans (e.g. recovery, compaction)
    Low,
}

impl fmt::Display for IoPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoPriority::Normal => "normal",
            IoPriority::High => "high",
            IoPriority::Low => "low",
        })
    }
}

#[derive(Debug)]
struct Shared {
    last_written_offset: AtomicI64,
    last_visible_byte_offset: AtomicU64,
    closed: AtomicBool,
}

/// Read-only view over a segment file
///
/// Clones share the watermarks, so a clone handed to a concurrent reader
/// observes every update made by the owning segment. Watermarks are written
/// by a single writer; readers may see a stale value but never one ahead of
/// what was published.
#[derive(Debug, Clone)]
pub struct Reader {
    path: PathBuf,
    shared: Arc<Shared>,
}

impl Reader {
    /// Reader over a file with nothing visible yet
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_watermarks(path, None, 0)
    }

    /// Reader over a file whose first `last_visible_byte_offset` bytes are readable
    pub fn with_watermarks<P: AsRef<Path>>(
        path: P,
        last_written_offset: Option<Offset>,
        last_visible_byte_offset: u64,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            shared: Arc::new(Shared {
                last_written_offset: AtomicI64::new(
                    last_written_offset.map_or(NO_OFFSET, |o| o.value()),
                ),
                last_visible_byte_offset: AtomicU64::new(last_visible_byte_offset),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest logical offset readers may observe
    pub fn last_written_offset(&self) -> Option<Offset> {
        match self.shared.last_written_offset.load(Ordering::Acquire) {
            NO_OFFSET => None,
            value => Some(Offset::new(value)),
        }
    }

    /// Number of bytes from the start of the file readers may observe
    pub fn last_visible_byte_offset(&self) -> u64 {
        self.shared.last_visible_byte_offset.load(Ordering::Acquire)
    }

    pub fn set_last_written_offset(&self, offset: Option<Offset>) {
        self.shared
            .last_written_offset
            .store(offset.map_or(NO_OFFSET, |o| o.value()), Ordering::Release);
    }

    pub fn set_last_visible_byte_offset(&self, position: u64) {
        self.shared
            .last_visible_byte_offset
            .store(position, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stream the batches starting at physical position `start`
    ///
    /// The stream is bounded by the watermarks as they are at the time of the
    /// call: it never yields bytes at or beyond the visible byte offset, nor
    /// batches starting after the last written offset.
    pub async fn data_stream(&self, start: u64, priority: IoPriority) -> Result<DataStream> {
        if self.is_closed() {
            return Err(Error::Closed("reader"));
        }

        // logical watermark first: it never runs ahead of the visible bytes
        let last_written_offset = self.last_written_offset();
        let visible = self.last_visible_byte_offset();
        let limit = visible.saturating_sub(start);

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        trace!(
            path = %self.path.display(),
            start,
            limit,
            %priority,
            "opened data stream"
        );

        Ok(DataStream {
            inner: FramedRead::new(file.take(limit), BatchDecoder::new()),
            start_position: start,
            last_written_offset,
            done: false,
        })
    }

    /// Truncate the underlying file to `position` bytes
    pub async fn truncate(&self, position: u64) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed("reader"));
        }

        let file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(position).await?;
        file.sync_data().await?;

        debug!(path = %self.path.display(), position, "truncated segment file");
        Ok(())
    }

    /// Stop serving new streams; streams already open keep their file handle
    pub async fn close(&self) -> Result<()> {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(path = %self.path.display(), "closed reader");
        }
        Ok(())
    }
}

impl fmt::Display for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reader(path={}, last_written=", self.path.display())?;
        match self.last_written_offset() {
            Some(offset) => write!(f, "{offset}")?,
            None => f.write_str("none")?,
        }
        write!(f, ", visible={}", self.last_visible_byte_offset())?;
        if self.is_closed() {
            f.write_str(", closed")?;
        }
        f.write_str(")")
    }
}

/// Stream of record batches read from a segment file
pub struct DataStream {
    inner: FramedRead<Take<File>, BatchDecoder>,
    start_position: u64,
    last_written_offset: Option<Offset>,
    done: bool,
}

impl DataStream {
    /// Physical position the stream started at
    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    /// Physical position just past the last batch yielded
    pub fn position(&self) -> u64 {
        self.start_position + self.inner.decoder().consumed()
    }

    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        self.next().await.transpose()
    }

    /// Scan forward to the first batch containing or following `offset`
    pub async fn skip_to(&mut self, offset: Offset) -> Result<Option<RecordBatch>> {
        while let Some(batch) = self.next_batch().await? {
            if batch.last_offset() >= offset {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }

    /// Read every remaining batch
    pub async fn collect_batches(self) -> Result<Vec<RecordBatch>> {
        self.try_collect().await
    }
}

impl Stream for DataStream {
    type Item = Result<RecordBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(batch))) => {
                let visible = this
                    .last_written_offset
                    .is_some_and(|last| batch.base_offset() <= last);
                if visible {
                    Poll::Ready(Some(Ok(batch)))
                } else {
                    this.done = true;
                    Poll::Ready(None)
                }
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("start_position", &self.start_position)
            .field("position", &self.position())
            .field("last_written_offset", &self.last_written_offset)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
