//! Core data types: offsets, timestamps and record batches

pub mod batch;
pub mod offset;
pub mod timestamp;

pub use batch::*;
pub use offset::*;
pub use timestamp::*;
