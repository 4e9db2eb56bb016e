//! Logical record offsets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Logical position of a record within a log
///
/// Offsets are dense within a record batch (`base_offset..=last_offset`) and
/// strictly increasing across the batches of a segment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    /// Create an offset from its raw value
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// The offset immediately following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The offset immediately preceding this one
    pub fn prev(&self) -> Self {
        Self(self.0 - 1)
    }

    /// Distance from `base` to this offset, if it fits a `u32`
    pub fn relative_to(&self, base: Offset) -> Option<u32> {
        self.0
            .checked_sub(base.0)
            .and_then(|delta| u32::try_from(delta).ok())
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}

impl Add<i64> for Offset {
    type Output = Offset;

    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Offset> for Offset {
    type Output = i64;

    fn sub(self, rhs: Offset) -> Self::Output {
        self.0 - rhs.0
    }
}
