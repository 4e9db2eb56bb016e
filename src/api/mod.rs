//! Protocol-facing adapters: wire headers and the JSON fetch projection

pub mod headers;
pub mod json;

pub use headers::{ApiKey, ApiVersion, RequestHeader, ResponseHeader};
pub use json::{serialize_fetch, SerializationFormat};
