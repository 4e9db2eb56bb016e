//! JSON projection of fetched records
//!
//! Renders the records of a partition as a JSON array of
//! `{"topic", "key", "value", "partition", "offset"}` objects, the shape an
//! HTTP proxy hands to clients.

use crate::core::batch::RecordBatch;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use serde_json::value::RawValue;

/// How record keys and values are embedded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializationFormat {
    /// base64 encoded bytes
    #[default]
    Binary,
    /// bytes must hold a JSON document, embedded as is
    Json,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Payload {
    Binary(String),
    Json(Box<RawValue>),
}

/// One fetched record
#[derive(Debug, Serialize)]
struct FetchedRecord<'a> {
    topic: &'a str,
    key: Option<Payload>,
    value: Option<Payload>,
    partition: i32,
    offset: i64,
}

fn payload(bytes: Option<Bytes>, format: SerializationFormat) -> Result<Option<Payload>> {
    bytes
        .map(|bytes| match format {
            SerializationFormat::Binary => Ok(Payload::Binary(BASE64.encode(&bytes))),
            SerializationFormat::Json => {
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| Error::Serialization(format!("payload is not UTF-8: {e}")))?;
                let raw = RawValue::from_string(text.to_owned())?;
                Ok(Payload::Json(raw))
            }
        })
        .transpose()
}

/// Render every record of `batches` as a JSON array
pub fn serialize_fetch(
    topic: &str,
    partition: i32,
    batches: &[RecordBatch],
    format: SerializationFormat,
) -> Result<String> {
    let mut records = Vec::new();
    for batch in batches {
        for record in batch.records()? {
            records.push(FetchedRecord {
                topic,
                key: payload(record.key, format)?,
                value: payload(record.value, format)?,
                partition,
                offset: (batch.base_offset() + record.offset_delta as i64).value(),
            });
        }
    }
    Ok(serde_json::to_string(&records)?)
}
