//! Batch cache: recently appended batches kept in memory for hot reads
//!
//! The cache is write-through: a segment inserts every batch it appends and
//! evicts everything at or above the cut point when it is truncated. It is
//! bounded by a byte budget; when the budget is exceeded the batches with the
//! lowest offsets go first, since readers tailing the log ask for the newest
//! data.
//!
//! A cache may be shared by the segments of one log and by concurrent
//! readers, so offsets must not repeat among the batches it holds.

use crate::core::batch::RecordBatch;
use crate::core::offset::Offset;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Inner {
    batches: BTreeMap<Offset, Arc<RecordBatch>>,
    size_bytes: usize,
}

/// In-memory map from base offset to batch
#[derive(Debug)]
pub struct BatchCache {
    max_bytes: usize,
    inner: RwLock<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BatchCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: RwLock::new(Inner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.read().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().batches.is_empty()
    }

    /// Serialized size of all cached batches
    pub fn size_bytes(&self) -> usize {
        self.inner.read().size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Insert a batch, evicting the oldest entries if over budget
    ///
    /// The inserted batch itself is never evicted by this call.
    pub fn put(&self, batch: RecordBatch) {
        let base = batch.base_offset();
        let size = batch.size_bytes();

        let mut inner = self.inner.write();
        if let Some(previous) = inner.batches.insert(base, Arc::new(batch)) {
            inner.size_bytes -= previous.size_bytes();
        }
        inner.size_bytes += size;

        while inner.size_bytes > self.max_bytes {
            let Some((&oldest, _)) = inner.batches.first_key_value() else {
                break;
            };
            if oldest == base {
                break;
            }
            if let Some(evicted) = inner.batches.remove(&oldest) {
                inner.size_bytes -= evicted.size_bytes();
                trace!(offset = %oldest, "evicted cached batch");
            }
        }
    }

    /// Batch starting exactly at `base_offset`
    pub fn get(&self, base_offset: Offset) -> Option<Arc<RecordBatch>> {
        let found = self.inner.read().batches.get(&base_offset).cloned();
        self.record(found.is_some());
        found
    }

    /// Batch whose offset range covers `offset`
    pub fn get_containing(&self, offset: Offset) -> Option<Arc<RecordBatch>> {
        let found = self
            .inner
            .read()
            .batches
            .range(..=offset)
            .next_back()
            .filter(|(_, batch)| batch.contains(offset))
            .map(|(_, batch)| batch.clone());
        self.record(found.is_some());
        found
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Evict every batch whose base offset is `>= cut`
    ///
    /// Returns the number of evicted batches.
    pub fn truncate(&self, cut: Offset) -> usize {
        let mut inner = self.inner.write();
        let evicted = inner.batches.split_off(&cut);
        let evicted_bytes: usize = evicted.values().map(|b| b.size_bytes()).sum();
        inner.size_bytes -= evicted_bytes;

        if !evicted.is_empty() {
            trace!(cut = %cut, evicted = evicted.len(), "truncated batch cache");
        }
        evicted.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.batches.clear();
        inner.size_bytes = 0;
    }
}

impl fmt::Display for BatchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        write!(
            f,
            "BatchCache(batches={}, bytes={}/{}",
            inner.batches.len(),
            inner.size_bytes,
            self.max_bytes
        )?;
        if let (Some(first), Some(last)) =
            (inner.batches.keys().next(), inner.batches.keys().next_back())
        {
            write!(f, ", range=[{first}, {last}]")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::RecordBatchBuilder;
    use bytes::Bytes;

    fn batch(base: i64, count: usize) -> RecordBatch {
        let mut builder = RecordBatchBuilder::new(Offset::new(base));
        for _ in 0..count {
            builder = builder.add_record(None, Some(Bytes::from_static(b"payload")));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let cache = BatchCache::new(1 << 20);
        cache.put(batch(0, 3));
        cache.put(batch(3, 2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Offset::new(3)).unwrap().last_offset(), Offset::new(4));
        assert!(cache.get(Offset::new(1)).is_none());

        let containing = cache.get_containing(Offset::new(1)).unwrap();
        assert_eq!(containing.base_offset(), Offset::new(0));
        assert!(cache.get_containing(Offset::new(5)).is_none());

        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 2 });
    }

    #[test]
    fn test_truncate_removes_exactly_at_or_above_cut() {
        let cache = BatchCache::new(1 << 20);
        for base in [0, 10, 20, 30] {
            cache.put(batch(base, 10));
        }
        let per_batch = batch(0, 10).size_bytes();

        assert_eq!(cache.truncate(Offset::new(20)), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.size_bytes(), 2 * per_batch);
        assert!(cache.get(Offset::new(0)).is_some());
        assert!(cache.get(Offset::new(10)).is_some());
        assert!(cache.get(Offset::new(20)).is_none());
        assert!(cache.get(Offset::new(30)).is_none());

        assert_eq!(cache.truncate(Offset::new(100)), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let per_batch = batch(0, 1).size_bytes();
        let cache = BatchCache::new(per_batch * 2);

        cache.put(batch(0, 1));
        cache.put(batch(1, 1));
        cache.put(batch(2, 1));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(Offset::new(0)).is_none());
        assert!(cache.get(Offset::new(2)).is_some());
        assert!(cache.size_bytes() <= cache.max_bytes());
    }

    #[test]
    fn test_oversized_batch_is_kept() {
        let cache = BatchCache::new(1);
        cache.put(batch(0, 1));
        cache.put(batch(1, 1));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(Offset::new(1)).is_some());
    }

    #[test]
    fn test_replace_same_offset() {
        let cache = BatchCache::new(1 << 20);
        cache.put(batch(0, 1));
        cache.put(batch(0, 4));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), batch(0, 4).size_bytes());
    }

    #[test]
    fn test_display() {
        let cache = BatchCache::new(100);
        assert_eq!(cache.to_string(), "BatchCache(batches=0, bytes=0/100)");
    }
}
