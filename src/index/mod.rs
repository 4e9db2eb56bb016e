//! Indexing for offset lookups

pub mod offset;

pub use offset::*;
