//! Appender: buffered, sequential writer over a segment file

use crate::error::{Error, Result};
use bytes::BytesMut;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Exclusive append-only writer for one segment file
///
/// Bytes are staged in memory and written out once the buffer fills up or on
/// [`Appender::flush`], which also makes them durable. The appender is not
/// internally synchronized: exactly one task may drive it.
pub struct Appender {
    path: PathBuf,
    file: File,
    buffer: BytesMut,
    buffer_capacity: usize,
    /// bytes handed to the file
    committed: u64,
    /// bytes known to be on stable storage
    synced: u64,
    closed: bool,
}

impl Appender {
    /// Create a new, empty segment file
    ///
    /// Fails if the file already exists.
    pub async fn create<P: AsRef<Path>>(path: P, buffer_capacity: usize) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        debug!(path = %path.display(), "created segment file");
        Ok(Self::with_file(path.to_path_buf(), file, 0, buffer_capacity))
    }

    /// Open an existing segment file for appending at its current end
    pub async fn open<P: AsRef<Path>>(path: P, buffer_capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().write(true).open(path).await?;
        let len = file.seek(SeekFrom::End(0)).await?;

        debug!(path = %path.display(), len, "opened segment file for append");
        Ok(Self::with_file(path.to_path_buf(), file, len, buffer_capacity))
    }

    fn with_file(path: PathBuf, file: File, len: u64, buffer_capacity: usize) -> Self {
        Self {
            path,
            file,
            buffer: BytesMut::with_capacity(buffer_capacity),
            buffer_capacity,
            committed: len,
            synced: len,
            closed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Physical offset at which the next byte will be written
    pub fn file_byte_offset(&self) -> u64 {
        self.committed + self.buffer.len() as u64
    }

    /// Physical offset up to which data is known to be durable
    pub fn durable_byte_offset(&self) -> u64 {
        self.synced
    }

    /// Bytes staged in memory and not yet written to the file
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append bytes at the current physical offset
    pub async fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("appender"));
        }

        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.buffer_capacity {
            self.write_out().await?;
        }
        Ok(())
    }

    /// Hand the staged bytes to the file
    async fn write_out(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let result = match self.file.write_all(&self.buffer).await {
            Ok(()) => self.file.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            // keep the file aligned with `committed` so a retry does not duplicate bytes
            if let Err(restore) = self.reset_file(self.committed).await {
                warn!(
                    path = %self.path.display(),
                    error = %restore,
                    "failed to restore segment file after a failed write"
                );
            }
            return Err(Error::Io(e));
        }

        trace!(
            path = %self.path.display(),
            bytes = self.buffer.len(),
            "wrote out appender buffer"
        );
        self.committed += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    async fn reset_file(&mut self, position: u64) -> std::io::Result<()> {
        self.file.set_len(position).await?;
        self.file.seek(SeekFrom::Start(position)).await?;
        Ok(())
    }

    /// Write out staged bytes and wait until they reach stable storage
    pub async fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("appender"));
        }

        self.write_out().await?;
        if self.synced != self.committed {
            self.file.sync_data().await?;
            self.synced = self.committed;
        }
        Ok(())
    }

    /// Discard everything at or beyond `position`, staged bytes included
    pub async fn truncate(&mut self, position: u64) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("appender"));
        }

        let end = self.file_byte_offset();
        if position > end {
            return Err(Error::InvalidTruncation(format!(
                "position {position} is beyond the end of {} ({end})",
                self.path.display()
            )));
        }

        if position >= self.committed {
            self.buffer.truncate((position - self.committed) as usize);
        } else {
            self.buffer.clear();
            self.reset_file(position).await?;
            self.file.sync_data().await?;
            self.committed = position;
            self.synced = self.synced.min(position);
        }

        debug!(path = %self.path.display(), position, "truncated appender");
        Ok(())
    }

    /// Flush and stop accepting writes
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush().await?;
        self.closed = true;
        debug!(path = %self.path.display(), len = self.committed, "closed appender");
        Ok(())
    }
}

impl fmt::Display for Appender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Appender(path={}, offset={}, buffered={}, durable={}{})",
            self.path.display(),
            self.file_byte_offset(),
            self.buffer.len(),
            self.synced,
            if self.closed { ", closed" } else { "" }
        )
    }
}

impl fmt::Debug for Appender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Appender")
            .field("path", &self.path)
            .field("committed", &self.committed)
            .field("buffered", &self.buffer.len())
            .field("synced", &self.synced)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_len(path: &Path) -> u64 {
        std::fs::metadata(path).unwrap().len()
    }

    #[tokio::test]
    async fn test_buffered_until_flush() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("buffered.log");

        let mut appender = Appender::create(&path, 1024).await.unwrap();
        appender.append(b"hello").await.unwrap();
        appender.append(b" world").await.unwrap();

        assert_eq!(appender.file_byte_offset(), 11);
        assert_eq!(appender.buffered_bytes(), 11);
        assert_eq!(file_len(&path), 0);

        appender.flush().await.unwrap();
        assert_eq!(appender.buffered_bytes(), 0);
        assert_eq!(appender.durable_byte_offset(), 11);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_full_buffer_written_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("full.log");

        let mut appender = Appender::create(&path, 8).await.unwrap();
        appender.append(b"0123456789").await.unwrap();

        assert_eq!(appender.buffered_bytes(), 0);
        assert_eq!(file_len(&path), 10);
        assert_eq!(appender.durable_byte_offset(), 0, "written out but not synced");
    }

    #[tokio::test]
    async fn test_create_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("exists.log");
        std::fs::write(&path, b"data").unwrap();

        assert!(matches!(
            Appender::create(&path, 16).await,
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_truncate_inside_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncate_buffer.log");

        let mut appender = Appender::create(&path, 1024).await.unwrap();
        appender.append(b"abcdef").await.unwrap();
        appender.flush().await.unwrap();
        appender.append(b"ghijkl").await.unwrap();

        appender.truncate(9).await.unwrap();
        assert_eq!(appender.file_byte_offset(), 9);

        appender.append(b"XYZ").await.unwrap();
        appender.flush().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghiXYZ");
    }

    #[tokio::test]
    async fn test_truncate_file_discards_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncate_file.log");

        let mut appender = Appender::create(&path, 1024).await.unwrap();
        appender.append(b"abcdef").await.unwrap();
        appender.flush().await.unwrap();
        appender.append(b"unflushed").await.unwrap();

        appender.truncate(2).await.unwrap();
        assert_eq!(appender.file_byte_offset(), 2);
        assert_eq!(appender.buffered_bytes(), 0);
        assert_eq!(appender.durable_byte_offset(), 2);

        appender.append(b"cd").await.unwrap();
        appender.close().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_truncate_beyond_end_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut appender = Appender::create(temp_dir.path().join("beyond.log"), 64)
            .await
            .unwrap();
        appender.append(b"abc").await.unwrap();

        assert!(matches!(
            appender.truncate(4).await,
            Err(Error::InvalidTruncation(_))
        ));
        assert_eq!(appender.file_byte_offset(), 3);
    }

    #[tokio::test]
    async fn test_closed_appender_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("closed.log");

        let mut appender = Appender::create(&path, 64).await.unwrap();
        appender.append(b"last words").await.unwrap();
        appender.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"last words");
        assert!(matches!(
            appender.append(b"more").await,
            Err(Error::Closed(_))
        ));
        appender.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_appends_at_end() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reopen.log");
        std::fs::write(&path, b"head").unwrap();

        let mut appender = Appender::open(&path, 64).await.unwrap();
        assert_eq!(appender.file_byte_offset(), 4);
        appender.append(b"tail").await.unwrap();
        appender.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"headtail");
    }
}
