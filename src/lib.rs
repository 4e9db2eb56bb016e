//! seglog: append-only log segment storage
//!
//! A segment is a single append-only file of record batches covering a
//! contiguous range of logical offsets, with:
//!
//! - **Appender**: buffered writer; data is durable after a flush
//! - **Reader**: streams batches, bounded by watermarks published on flush
//! - **Offset index**: sparse offset to file position samples for seeking
//! - **Batch cache**: recently appended batches kept in memory
//!
//! # Example
//!
//! ```no_run
//! use seglog::prelude::*;
//! use bytes::Bytes;
//!
//! # async fn example() -> seglog::error::Result<()> {
//! let config = SegmentConfig::default();
//! let mut segment = Segment::create("/tmp/seglog", Offset::new(0), &config).await?;
//!
//! let batch = RecordBatchBuilder::new(Offset::new(0))
//!     .add_record(Some(Bytes::from("key")), Some(Bytes::from("value")))
//!     .build()?;
//! segment.append(batch).await?;
//! segment.flush().await?;
//!
//! let mut stream = segment.offset_data_stream(Offset::new(0), IoPriority::Normal).await?;
//! while let Some(batch) = stream.next_batch().await? {
//!     println!("{batch}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod storage;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{CacheConfig, SegmentConfig};
    pub use crate::core::*;
    pub use crate::error::{Error, Result};
    pub use crate::index::{IndexPolicy, OffsetIndex};
    pub use crate::storage::*;
}
