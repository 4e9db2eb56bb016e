//! Startup recovery of a segment file
//!
//! Scans the log from the start, stops at the first batch that is torn,
//! corrupt or out of order, and reconciles the persisted offset index with
//! what was actually found.

use crate::core::batch::BatchDecoder;
use crate::core::offset::Offset;
use crate::error::{Error, Result};
use crate::index::OffsetIndex;
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

/// Outcome of scanning a segment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovered {
    /// End of the last valid batch
    pub valid_end: u64,
    /// Length of the file before recovery
    pub file_len: u64,
    /// Last offset of the last valid batch
    pub last_offset: Option<Offset>,
    /// Number of valid batches
    pub batches: usize,
}

impl Recovered {
    /// Whether bytes past the valid prefix must be discarded
    pub fn has_tail(&self) -> bool {
        self.file_len > self.valid_end
    }
}

/// Scan `log_path` and reconcile `index` with its content
///
/// The index is kept if every entry points at the start of a valid batch;
/// entries past the valid data are dropped. Otherwise it is rebuilt from the
/// scan with the same sampling policy. The file itself is left untouched.
pub async fn recover(log_path: &Path, mut index: OffsetIndex) -> Result<(OffsetIndex, Recovered)> {
    let segment_base = index.base_offset();
    let file = File::open(log_path).await?;
    let file_len = file.metadata().await?.len();

    let loaded: Vec<(Offset, u64)> = index.entries().collect();
    let mut cursor = 0;
    let mut consistent = true;
    let mut rebuilt = OffsetIndex::new(index.path(), segment_base, index.policy());

    let mut framed = FramedRead::new(file, BatchDecoder::new());
    let mut last_offset: Option<Offset> = None;
    let mut valid_end = 0u64;
    let mut batches = 0usize;

    while let Some(item) = framed.next().await {
        let batch = match item {
            Ok(batch) => batch,
            Err(Error::Corruption(reason)) => {
                warn!(
                    path = %log_path.display(),
                    position = valid_end,
                    %reason,
                    "corrupt batch, discarding the rest of the segment"
                );
                break;
            }
            Err(e) => return Err(e),
        };

        let base = batch.base_offset();
        let in_order = base >= segment_base && last_offset.map_or(true, |last| base > last);
        if !in_order {
            warn!(
                path = %log_path.display(),
                position = valid_end,
                offset = %base,
                "batch out of order, discarding the rest of the segment"
            );
            break;
        }

        match loaded.get(cursor) {
            Some(&(offset, position)) if offset == base && position == valid_end => cursor += 1,
            Some(&(offset, _)) if offset <= base => consistent = false,
            _ => {}
        }

        let size = batch.size_bytes() as u64;
        rebuilt.maybe_track(base, valid_end, size);
        valid_end += size;
        last_offset = Some(batch.last_offset());
        batches += 1;
    }

    debug_assert_eq!(valid_end, framed.decoder().consumed());

    let bound = last_offset.unwrap_or(segment_base.prev());
    if loaded[cursor..].iter().any(|&(offset, _)| offset <= bound) {
        consistent = false;
    }

    if consistent {
        index.truncate(bound);
    } else {
        warn!(
            path = %index.path().display(),
            loaded = loaded.len(),
            rebuilt = rebuilt.len(),
            "offset index does not match the log, rebuilding it"
        );
        index.replace_with(rebuilt);
    }

    let recovered = Recovered {
        valid_end,
        file_len,
        last_offset,
        batches,
    };
    if recovered.has_tail() {
        warn!(
            path = %log_path.display(),
            valid_end,
            file_len,
            "segment has an invalid tail"
        );
    }
    debug!(
        path = %log_path.display(),
        batches,
        valid_end,
        last = ?last_offset.map(|o| o.value()),
        "scanned segment"
    );
    Ok((index, recovered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, SegmentConfig};
    use crate::core::batch::{RecordBatch, RecordBatchBuilder};
    use crate::index::IndexPolicy;
    use crate::storage::reader::IoPriority;
    use crate::storage::segment::Segment;
    use bytes::{Bytes, BytesMut};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn batch(base: i64, count: usize) -> RecordBatch {
        let mut builder = RecordBatchBuilder::new(Offset::new(base));
        for _ in 0..count {
            builder = builder.add_record(None, Some(Bytes::from_static(b"recovered")));
        }
        builder.build().unwrap()
    }

    fn every_batch() -> SegmentConfig {
        SegmentConfig {
            index: IndexPolicy::every_batch(),
            ..Default::default()
        }
    }

    /// Write a segment with batches of 2 records and return the batch start positions
    async fn write_segment(dir: &Path, base: i64, batches: usize) -> Vec<u64> {
        let mut segment = Segment::create(dir, Offset::new(base), &every_batch())
            .await
            .unwrap();
        let mut positions = Vec::new();
        for i in 0..batches {
            positions.push(segment.size_bytes());
            segment.append(batch(base + 2 * i as i64, 2)).await.unwrap();
        }
        segment.close().await.unwrap();
        positions
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[tokio::test]
    async fn test_clean_segment() {
        let temp_dir = TempDir::new().unwrap();
        let positions = write_segment(temp_dir.path(), 0, 3).await;

        let segment = Segment::recover(temp_dir.path(), Offset::new(0), &every_batch())
            .await
            .unwrap();
        assert_eq!(segment.dirty_offset(), Some(Offset::new(5)));
        assert_eq!(segment.reader().last_written_offset(), Some(Offset::new(5)));
        assert!(!segment.has_appender());
        assert_eq!(
            segment.index().entries().map(|(_, p)| p).collect::<Vec<_>>(),
            positions
        );

        let read = segment
            .offset_data_stream(Offset::new(0), IoPriority::Low)
            .await
            .unwrap()
            .collect_batches()
            .await
            .unwrap();
        assert_eq!(read.len(), 3);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(temp_dir.path(), 0, 2).await;
        let log_path = config::log_path(temp_dir.path(), Offset::new(0));
        let valid_len = std::fs::metadata(&log_path).unwrap().len();

        let torn = batch(4, 3).encode();
        append_raw(&log_path, &torn[..torn.len() / 2]);

        let segment = Segment::recover(temp_dir.path(), Offset::new(0), &every_batch())
            .await
            .unwrap();
        assert_eq!(segment.dirty_offset(), Some(Offset::new(3)));
        assert_eq!(std::fs::metadata(&log_path).unwrap().len(), valid_len);
    }

    #[tokio::test]
    async fn test_corrupt_batch_ends_the_segment() {
        let temp_dir = TempDir::new().unwrap();
        let positions = write_segment(temp_dir.path(), 0, 3).await;
        let log_path = config::log_path(temp_dir.path(), Offset::new(0));

        // flip a byte in the body of the second batch
        let mut raw = std::fs::read(&log_path).unwrap();
        let victim = positions[2] as usize - 1;
        raw[victim] ^= 0xff;
        std::fs::write(&log_path, &raw).unwrap();

        let index = OffsetIndex::open(
            config::index_path(temp_dir.path(), Offset::new(0)),
            Offset::new(0),
            IndexPolicy::every_batch(),
        )
        .await
        .unwrap();
        let (index, recovered) = recover(&log_path, index).await.unwrap();

        assert_eq!(recovered.valid_end, positions[1]);
        assert_eq!(recovered.last_offset, Some(Offset::new(1)));
        assert_eq!(recovered.batches, 1);
        assert!(recovered.has_tail());
        assert_eq!(index.len(), 1, "entries past the valid data are dropped");
    }

    #[tokio::test]
    async fn test_inconsistent_index_is_rebuilt() {
        let temp_dir = TempDir::new().unwrap();
        let positions = write_segment(temp_dir.path(), 0, 3).await;
        let index_path = config::index_path(temp_dir.path(), Offset::new(0));

        // an entry pointing into the middle of the first batch
        let mut raw = BytesMut::new();
        bytes::BufMut::put_u32(&mut raw, 1);
        bytes::BufMut::put_u64(&mut raw, 7);
        std::fs::write(&index_path, &raw).unwrap();

        let segment = Segment::recover(temp_dir.path(), Offset::new(0), &every_batch())
            .await
            .unwrap();
        assert_eq!(
            segment.index().entries().collect::<Vec<_>>(),
            vec![
                (Offset::new(0), positions[0]),
                (Offset::new(2), positions[1]),
                (Offset::new(4), positions[2]),
            ]
        );
        assert_eq!(std::fs::metadata(&index_path).unwrap().len(), 36);
    }

    #[tokio::test]
    async fn test_missing_index_is_rebuilt() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(temp_dir.path(), 10, 2).await;
        std::fs::remove_file(config::index_path(temp_dir.path(), Offset::new(10))).unwrap();

        let segment = Segment::recover(temp_dir.path(), Offset::new(10), &every_batch())
            .await
            .unwrap();
        assert_eq!(segment.index().len(), 2);
        assert_eq!(
            segment.index().lower_bound(Offset::new(13)),
            segment.index().last_entry().map(|(_, p)| p)
        );
    }

    #[tokio::test]
    async fn test_empty_segment() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(temp_dir.path(), 0, 0).await;

        let segment = Segment::recover(temp_dir.path(), Offset::new(0), &every_batch())
            .await
            .unwrap();
        assert_eq!(segment.dirty_offset(), None);
        assert_eq!(segment.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_recover_active_keeps_appending() {
        let temp_dir = TempDir::new().unwrap();
        write_segment(temp_dir.path(), 0, 2).await;
        let log_path = config::log_path(temp_dir.path(), Offset::new(0));
        append_raw(&log_path, b"garbage after a crash");

        let mut segment = Segment::recover_active(temp_dir.path(), Offset::new(0), &every_batch())
            .await
            .unwrap();
        assert!(segment.has_appender());
        assert_eq!(segment.dirty_offset(), Some(Offset::new(3)));

        segment.append(batch(4, 1)).await.unwrap();
        segment.flush().await.unwrap();

        let read = segment
            .offset_data_stream(Offset::new(0), IoPriority::Normal)
            .await
            .unwrap()
            .collect_batches()
            .await
            .unwrap();
        assert_eq!(
            read.iter().map(|b| b.base_offset().value()).collect::<Vec<_>>(),
            vec![0, 2, 4]
        );
        assert_eq!(segment.index().len(), 3);
    }
}
