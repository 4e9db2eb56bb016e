//! Storage layer: segment files, their readers, writers and caches

pub mod appender;
pub mod cache;
pub mod reader;
pub mod recovery;
pub mod segment;

pub use appender::Appender;
pub use cache::{BatchCache, CacheStats};
pub use reader::{DataStream, IoPriority, Reader};
pub use recovery::Recovered;
pub use segment::{AppendResult, Segment};
