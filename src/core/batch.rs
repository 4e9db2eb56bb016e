//! Record batch format: the unit of writing and reading in a segment
//!
//! A serialized batch is a fixed 43-byte header followed by the records
//! section (optionally zstd-compressed). All integers are big-endian.
//!
//! ```text
//! base_offset i64 | size_bytes i32 | crc u32 | magic i8 | attributes i16
//! last_offset_delta i32 | first_timestamp i64 | max_timestamp i64
//! record_count i32 | records...
//! ```
//!
//! `size_bytes` covers the whole batch (header included) and the CRC covers
//! every byte after the `crc` field.

use crate::core::offset::Offset;
use crate::core::timestamp::Timestamp;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc32fast::Hasher as Crc32Hasher;
use std::fmt;
use tokio_util::codec::Decoder;

/// Record batch format version
pub const MAGIC: i8 = 2;

/// Serialized header size
pub const HEADER_SIZE: usize = 8 + 4 + 4 + 1 + 2 + 4 + 8 + 8 + 4;

/// Bytes preceding the CRC-covered region (base_offset, size_bytes, crc)
const CRC_START: usize = 8 + 4 + 4;

/// Upper bound on a single serialized batch
pub const MAX_BATCH_SIZE: usize = 64 * 1024 * 1024;

/// Compression level for ZSTD (1-22, higher = better compression but slower)
pub const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// Smallest serialized record: deltas, null key and value, no headers
const MIN_RECORD_SIZE: usize = 4 + 8 + 4 + 4 + 4;

/// Smallest serialized record header: empty key, null value
const MIN_HEADER_SIZE: usize = 4 + 4;

/// Attribute bits holding the compression codec
const ATTR_COMPRESSION_MASK: i16 = 0x07;

/// Compression codec of a batch's records section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Records are stored as-is
    #[default]
    None,
    /// Records section is ZSTD-compressed
    Zstd,
}

impl Compression {
    fn attribute_bits(self) -> i16 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 4,
        }
    }

    fn from_attributes(attributes: i16) -> Result<Self> {
        match attributes & ATTR_COMPRESSION_MASK {
            0 => Ok(Compression::None),
            4 => Ok(Compression::Zstd),
            codec => Err(Error::Corruption(format!(
                "unsupported compression codec: {codec}"
            ))),
        }
    }
}

/// Optional key-value header attached to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// Single record within a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset relative to the batch base offset
    pub offset_delta: i32,
    /// Timestamp relative to the batch first timestamp (ms)
    pub timestamp_delta: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

impl Record {
    /// Create a record without headers
    pub fn new(offset_delta: i32, key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            offset_delta,
            timestamp_delta: 0,
            key,
            value,
            headers: Vec::new(),
        }
    }

    fn encoded_len(&self) -> usize {
        let bytes_len = |b: &Option<Bytes>| 4 + b.as_ref().map_or(0, Bytes::len);
        let headers: usize = self
            .headers
            .iter()
            .map(|h| 4 + h.key.len() + bytes_len(&h.value))
            .sum();
        4 + 8 + bytes_len(&self.key) + bytes_len(&self.value) + 4 + headers
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_i32(self.offset_delta);
        buf.put_i64(self.timestamp_delta);
        put_nullable(buf, self.key.as_ref());
        put_nullable(buf, self.value.as_ref());
        buf.put_i32(self.headers.len() as i32);
        for header in &self.headers {
            buf.put_i32(header.key.len() as i32);
            buf.put_slice(&header.key);
            put_nullable(buf, header.value.as_ref());
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let offset_delta = get_i32(buf, "offset_delta")?;
        let timestamp_delta = get_i64(buf, "timestamp_delta")?;
        let key = get_nullable(buf, "key")?;
        let value = get_nullable(buf, "value")?;

        let header_count = get_i32(buf, "header_count")?;
        if header_count < 0 {
            return Err(Error::Corruption(format!(
                "negative record header count: {header_count}"
            )));
        }

        let header_count = header_count as usize;
        if header_count > buf.remaining() / MIN_HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "{header_count} record headers cannot fit in {} bytes",
                buf.remaining()
            )));
        }

        let mut headers = Vec::with_capacity(header_count);
        for _ in 0..header_count {
            let key = get_nullable(buf, "header key")?
                .ok_or_else(|| Error::Corruption("null record header key".to_string()))?;
            let value = get_nullable(buf, "header value")?;
            headers.push(RecordHeader { key, value });
        }

        Ok(Self {
            offset_delta,
            timestamp_delta,
            key,
            value,
            headers,
        })
    }
}

fn put_nullable(buf: &mut BytesMut, bytes: Option<&Bytes>) {
    match bytes {
        Some(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }
        None => buf.put_i32(-1),
    }
}

fn get_i32(buf: &mut Bytes, field: &str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::Corruption(format!("truncated record {field}")));
    }
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut Bytes, field: &str) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(Error::Corruption(format!("truncated record {field}")));
    }
    Ok(buf.get_i64())
}

fn get_nullable(buf: &mut Bytes, field: &str) -> Result<Option<Bytes>> {
    let len = get_i32(buf, field)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Err(Error::Corruption(format!("truncated record {field}")));
    }
    Ok(Some(buf.split_to(len)))
}

/// Fixed-size batch header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatchHeader {
    pub base_offset: Offset,
    /// Declared size of the whole serialized batch, header included
    pub size_bytes: i32,
    pub crc: u32,
    pub magic: i8,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub first_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    pub record_count: i32,
}

impl RecordBatchHeader {
    /// Last logical offset covered by the batch
    ///
    /// Saturates at `i64::MAX`; [`RecordBatch::decode`] and the builder reject
    /// batches whose range overflows.
    pub fn last_offset(&self) -> Offset {
        self.checked_last_offset().unwrap_or(Offset::new(i64::MAX))
    }

    /// Last logical offset, or `None` if the range does not fit an `i64`
    pub fn checked_last_offset(&self) -> Option<Offset> {
        self.base_offset
            .value()
            .checked_add(self.last_offset_delta as i64)
            .map(Offset::new)
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_i64(self.base_offset.value());
        buf.put_i32(self.size_bytes);
        buf.put_u32(self.crc);
        self.encode_crc_fields(buf);
    }

    fn encode_crc_fields(&self, buf: &mut BytesMut) {
        buf.put_i8(self.magic);
        buf.put_i16(self.attributes);
        buf.put_i32(self.last_offset_delta);
        buf.put_i64(self.first_timestamp.as_millis());
        buf.put_i64(self.max_timestamp.as_millis());
        buf.put_i32(self.record_count);
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "truncated batch header: {} < {HEADER_SIZE}",
                buf.remaining()
            )));
        }

        let header = Self {
            base_offset: Offset::new(buf.get_i64()),
            size_bytes: buf.get_i32(),
            crc: buf.get_u32(),
            magic: buf.get_i8(),
            attributes: buf.get_i16(),
            last_offset_delta: buf.get_i32(),
            first_timestamp: Timestamp::from_millis(buf.get_i64()),
            max_timestamp: Timestamp::from_millis(buf.get_i64()),
            record_count: buf.get_i32(),
        };

        if header.magic != MAGIC {
            return Err(Error::Corruption(format!(
                "unknown record batch version: {}",
                header.magic
            )));
        }

        if header.last_offset_delta < 0 || header.checked_last_offset().is_none() {
            return Err(Error::Corruption(format!(
                "invalid offset range: base {} with last delta {}",
                header.base_offset, header.last_offset_delta
            )));
        }

        Ok(header)
    }

    /// CRC-32 of the header fields after `crc` followed by the records section
    fn compute_crc(&self, body: &[u8]) -> u32 {
        let mut fields = BytesMut::with_capacity(HEADER_SIZE - CRC_START);
        self.encode_crc_fields(&mut fields);

        let mut hasher = Crc32Hasher::new();
        hasher.update(&fields);
        hasher.update(body);
        hasher.finalize()
    }
}

/// Immutable, ordered group of records written and read as one unit
///
/// The records section is kept in its serialized (and possibly compressed)
/// form; [`RecordBatch::records`] decodes it on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatch {
    header: RecordBatchHeader,
    body: Bytes,
}

impl RecordBatch {
    /// Assemble a batch from a header and a serialized records section
    ///
    /// No consistency checks are made; see [`RecordBatchBuilder`] for
    /// building well-formed batches.
    pub fn from_parts(header: RecordBatchHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    pub fn header(&self) -> &RecordBatchHeader {
        &self.header
    }

    pub fn base_offset(&self) -> Offset {
        self.header.base_offset
    }

    pub fn last_offset(&self) -> Offset {
        self.header.last_offset()
    }

    pub fn record_count(&self) -> usize {
        self.header.record_count.max(0) as usize
    }

    /// Declared serialized size of the batch
    pub fn size_bytes(&self) -> usize {
        self.header.size_bytes.max(0) as usize
    }

    /// Actual serialized size of the batch
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::from_attributes(self.header.attributes)
    }

    /// Whether the batch covers the given logical offset
    pub fn contains(&self, offset: Offset) -> bool {
        (self.base_offset()..=self.last_offset()).contains(&offset)
    }

    /// Serialize the batch as it will be laid out on disk
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        buf.put_slice(&self.body);
    }

    /// Check the stored CRC against the batch contents
    pub fn verify_crc(&self) -> Result<()> {
        let computed = self.header.compute_crc(&self.body);
        if computed != self.header.crc {
            return Err(Error::Corruption(format!(
                "checksum mismatch in batch {}: expected {:#010x}, got {computed:#010x}",
                self.base_offset(),
                self.header.crc
            )));
        }
        Ok(())
    }

    /// Decode the records section
    pub fn records(&self) -> Result<Vec<Record>> {
        let mut body = match self.compression()? {
            Compression::None => self.body.clone(),
            Compression::Zstd => zstd::decode_all(&self.body[..])
                .map(Bytes::from)
                .map_err(|e| Error::Corruption(format!("ZSTD decompression failed: {e}")))?,
        };

        let record_count = self.header.record_count;
        if record_count < 0 || record_count as usize > body.remaining() / MIN_RECORD_SIZE {
            return Err(Error::Corruption(format!(
                "{record_count} records cannot fit in the {} byte records section of batch {}",
                body.remaining(),
                self.base_offset()
            )));
        }

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            records.push(Record::decode(&mut body)?);
        }

        if body.has_remaining() {
            return Err(Error::Corruption(format!(
                "{} trailing bytes after {} records in batch {}",
                body.remaining(),
                self.header.record_count,
                self.base_offset()
            )));
        }

        Ok(records)
    }

    /// Parse a complete serialized batch, verifying its CRC
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let header = RecordBatchHeader::decode(&mut buf)?;
        let batch = Self { header, body: buf };

        if batch.encoded_len() != batch.size_bytes() {
            return Err(Error::Corruption(format!(
                "batch {} declares {} bytes but holds {}",
                batch.base_offset(),
                batch.size_bytes(),
                batch.encoded_len()
            )));
        }

        batch.verify_crc()?;
        Ok(batch)
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordBatch(base={}, last={}, records={}, size={})",
            self.base_offset(),
            self.last_offset(),
            self.header.record_count,
            self.header.size_bytes
        )
    }
}

/// Builder producing well-formed batches (size and CRC filled in)
#[derive(Debug)]
pub struct RecordBatchBuilder {
    base_offset: Offset,
    first_timestamp: Timestamp,
    compression: Compression,
    records: Vec<Record>,
}

impl RecordBatchBuilder {
    pub fn new(base_offset: Offset) -> Self {
        Self {
            base_offset,
            first_timestamp: Timestamp::now(),
            compression: Compression::None,
            records: Vec::new(),
        }
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.first_timestamp = timestamp;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Append a record at the next offset of the batch
    pub fn add_record(mut self, key: Option<Bytes>, value: Option<Bytes>) -> Self {
        let delta = self.records.len() as i32;
        self.records.push(Record::new(delta, key, value));
        self
    }

    /// Append a record with headers at the next offset of the batch
    pub fn add_record_with_headers(
        mut self,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<RecordHeader>,
    ) -> Self {
        let delta = self.records.len() as i32;
        let mut record = Record::new(delta, key, value);
        record.headers = headers;
        self.records.push(record);
        self
    }

    pub fn build(self) -> Result<RecordBatch> {
        if self.records.is_empty() {
            return Err(Error::Serialization(format!(
                "batch at offset {} has no records",
                self.base_offset
            )));
        }

        let raw_len: usize = self.records.iter().map(Record::encoded_len).sum();
        let mut raw = BytesMut::with_capacity(raw_len);
        for record in &self.records {
            record.encode_into(&mut raw);
        }

        let body = match self.compression {
            Compression::None => raw.freeze(),
            Compression::Zstd => zstd::encode_all(&raw[..], ZSTD_COMPRESSION_LEVEL)
                .map(Bytes::from)
                .map_err(|e| Error::Serialization(format!("ZSTD compression failed: {e}")))?,
        };

        let size_bytes = HEADER_SIZE + body.len();
        if size_bytes > MAX_BATCH_SIZE {
            return Err(Error::Serialization(format!(
                "batch of {size_bytes} bytes exceeds the {MAX_BATCH_SIZE} byte limit"
            )));
        }

        let max_delta = self
            .records
            .iter()
            .map(|r| r.timestamp_delta)
            .max()
            .unwrap_or(0);

        let mut header = RecordBatchHeader {
            base_offset: self.base_offset,
            size_bytes: size_bytes as i32,
            crc: 0,
            magic: MAGIC,
            attributes: self.compression.attribute_bits(),
            last_offset_delta: self.records.len() as i32 - 1,
            first_timestamp: self.first_timestamp,
            max_timestamp: self.first_timestamp.add_millis(max_delta),
            record_count: self.records.len() as i32,
        };
        if header.checked_last_offset().is_none() {
            return Err(Error::Serialization(format!(
                "{} records at offset {} overflow the offset range",
                self.records.len(),
                self.base_offset
            )));
        }
        header.crc = header.compute_crc(&body);

        Ok(RecordBatch { header, body })
    }
}

/// Framing decoder splitting a byte stream into record batches
///
/// A trailing partial batch at end of input is treated as the end of the
/// readable data rather than an error.
#[derive(Debug, Default)]
pub struct BatchDecoder {
    /// Bytes consumed by successfully decoded batches
    consumed: u64,
}

impl BatchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes of all batches decoded so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl Decoder for BatchDecoder {
    type Item = RecordBatch;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RecordBatch>> {
        if src.len() < CRC_START {
            return Ok(None);
        }

        let size = (&src[8..12]).get_i32();
        if size < HEADER_SIZE as i32 || size as usize > MAX_BATCH_SIZE {
            return Err(Error::Corruption(format!(
                "invalid batch size {size} at stream position {}",
                self.consumed
            )));
        }

        let size = size as usize;
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let batch = RecordBatch::decode(src.split_to(size).freeze())?;
        self.consumed += size as u64;
        Ok(Some(batch))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RecordBatch>> {
        match self.decode(src)? {
            Some(batch) => Ok(Some(batch)),
            None => {
                if !src.is_empty() {
                    tracing::trace!(
                        position = self.consumed,
                        trailing = src.len(),
                        "ignoring partial batch at end of stream"
                    );
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch(base: i64, count: usize) -> RecordBatch {
        let mut builder =
            RecordBatchBuilder::new(Offset::new(base)).timestamp(Timestamp::from_secs(1000));
        for i in 0..count {
            builder = builder.add_record(
                Some(Bytes::from(format!("key-{i}"))),
                Some(Bytes::from(format!("value-{i}"))),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_builder_fills_header() {
        let batch = sample_batch(10, 3);
        assert_eq!(batch.base_offset(), Offset::new(10));
        assert_eq!(batch.last_offset(), Offset::new(12));
        assert_eq!(batch.record_count(), 3);
        assert_eq!(batch.size_bytes(), batch.encoded_len());
        assert_eq!(batch.encode().len(), batch.size_bytes());
        assert!(batch.contains(Offset::new(11)));
        assert!(!batch.contains(Offset::new(13)));
        batch.verify_crc().unwrap();
    }

    #[test]
    fn test_empty_batch_rejected() {
        let result = RecordBatchBuilder::new(Offset::new(0)).build();
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_decode_records() {
        let batch = RecordBatchBuilder::new(Offset::new(0))
            .add_record(None, Some(Bytes::from_static(b"v")))
            .add_record_with_headers(
                Some(Bytes::from_static(b"k")),
                None,
                vec![RecordHeader {
                    key: Bytes::from_static(b"h"),
                    value: None,
                }],
            )
            .build()
            .unwrap();

        let decoded = RecordBatch::decode(batch.encode()).unwrap();
        assert_eq!(decoded, batch);

        let records = decoded.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, None);
        assert_eq!(records[0].value.as_deref(), Some(&b"v"[..]));
        assert_eq!(records[1].offset_delta, 1);
        assert_eq!(records[1].headers[0].key, Bytes::from_static(b"h"));
    }

    #[test]
    fn test_zstd_batch() {
        let value = Bytes::from("A".repeat(4096));
        let batch = RecordBatchBuilder::new(Offset::new(5))
            .compression(Compression::Zstd)
            .add_record(None, Some(value.clone()))
            .add_record(None, Some(value.clone()))
            .build()
            .unwrap();

        assert_eq!(batch.compression().unwrap(), Compression::Zstd);
        assert!(batch.size_bytes() < 4096, "repetitive payload should compress");

        let decoded = RecordBatch::decode(batch.encode()).unwrap();
        let records = decoded.records().unwrap();
        assert_eq!(records[1].value.as_ref(), Some(&value));
    }

    #[test]
    fn test_checksum_mismatch() {
        let batch = sample_batch(0, 2);
        let mut bytes = BytesMut::from(&batch.encode()[..]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let result = RecordBatch::decode(bytes.freeze());
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_decoder_frames_stream() {
        let first = sample_batch(0, 2);
        let second = sample_batch(2, 1);

        let mut src = BytesMut::new();
        first.encode_into(&mut src);
        second.encode_into(&mut src);
        // torn write of a third batch
        src.put_slice(&sample_batch(3, 1).encode()[..20]);

        let mut decoder = BatchDecoder::new();
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(first.clone()));
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(second.clone()));
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(decoder.decode_eof(&mut src).unwrap(), None);
        assert_eq!(
            decoder.consumed(),
            (first.size_bytes() + second.size_bytes()) as u64
        );
    }

    #[test]
    fn test_decoder_rejects_bad_size() {
        let mut src = BytesMut::new();
        src.put_i64(0);
        src.put_i32(3);
        src.put_u32(0);

        let mut decoder = BatchDecoder::new();
        assert!(matches!(decoder.decode(&mut src), Err(Error::Corruption(_))));
    }

    /// Re-seal `header` over `body` with a consistent size and CRC
    fn sealed(mut header: RecordBatchHeader, body: Bytes) -> RecordBatch {
        header.size_bytes = (HEADER_SIZE + body.len()) as i32;
        header.crc = header.compute_crc(&body);
        RecordBatch::from_parts(header, body)
    }

    #[test]
    fn test_record_count_beyond_body_rejected() {
        let batch = sample_batch(0, 2);
        let header = RecordBatchHeader {
            record_count: i32::MAX,
            ..batch.header().clone()
        };
        let body = batch.encode().slice(HEADER_SIZE..);
        let lying = sealed(header, body);

        // framing and CRC are fine, only the records section is inconsistent
        let decoded = RecordBatch::decode(lying.encode()).unwrap();
        assert!(matches!(decoded.records(), Err(Error::Corruption(_))));

        let negative = RecordBatchHeader {
            record_count: -1,
            ..batch.header().clone()
        };
        let negative = sealed(negative, batch.encode().slice(HEADER_SIZE..));
        assert!(matches!(negative.records(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_header_count_beyond_body_rejected() {
        let mut body = BytesMut::new();
        body.put_i32(0);
        body.put_i64(0);
        body.put_i32(-1);
        body.put_i32(-1);
        body.put_i32(i32::MAX);

        let header = RecordBatchHeader {
            last_offset_delta: 0,
            record_count: 1,
            ..sample_batch(0, 1).header().clone()
        };
        let batch = sealed(header, body.freeze());
        assert!(matches!(batch.records(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_offset_range_overflow() {
        let batch = sample_batch(0, 3);
        let header = RecordBatchHeader {
            base_offset: Offset::new(i64::MAX - 1),
            ..batch.header().clone()
        };
        let overflowing = sealed(header, batch.encode().slice(HEADER_SIZE..));

        assert_eq!(overflowing.header().checked_last_offset(), None);
        assert_eq!(overflowing.last_offset(), Offset::new(i64::MAX));
        assert!(matches!(
            RecordBatch::decode(overflowing.encode()),
            Err(Error::Corruption(_))
        ));

        let built = RecordBatchBuilder::new(Offset::new(i64::MAX))
            .add_record(None, None)
            .add_record(None, None)
            .build();
        assert!(matches!(built, Err(Error::Serialization(_))));
    }
}
