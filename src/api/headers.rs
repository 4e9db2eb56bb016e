//! Request and response headers of the Kafka wire protocol
//!
//! Only the fixed header fields are handled here; request bodies are out of
//! scope for this crate.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use std::fmt;

/// Identifies the request type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiKey(pub i16);

impl ApiKey {
    pub const PRODUCE: ApiKey = ApiKey(0);
    pub const FETCH: ApiKey = ApiKey(1);
    pub const API_VERSIONS: ApiKey = ApiKey(18);

    pub fn value(self) -> i16 {
        self.0
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of the request API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(pub i16);

impl ApiVersion {
    pub fn value(self) -> i16 {
        self.0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub key: ApiKey,
    pub version: ApiVersion,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    /// Fixed part: key, version and correlation id
    const FIXED_SIZE: usize = 2 + 2 + 4;

    /// Decode a header, leaving `buf` at the start of the request body
    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < Self::FIXED_SIZE + 2 {
            return Err(Error::Protocol(format!(
                "request header has at least {}B, got {}B",
                Self::FIXED_SIZE + 2,
                buf.remaining()
            )));
        }

        let key = ApiKey(buf.get_i16());
        let version = ApiVersion(buf.get_i16());
        let correlation_id = buf.get_i32();

        let client_id = match buf.get_i16() {
            -1 => None,
            len if len < 0 => {
                return Err(Error::Protocol(format!("invalid client id length {len}")));
            }
            len => {
                let len = len as usize;
                if buf.remaining() < len {
                    return Err(Error::Protocol(format!(
                        "client id of {len}B truncated to {}B",
                        buf.remaining()
                    )));
                }
                let raw = buf.copy_to_bytes(len);
                let client_id = String::from_utf8(raw.to_vec())
                    .map_err(|e| Error::Protocol(format!("client id is not UTF-8: {e}")))?;
                Some(client_id)
            }
        };

        Ok(Self {
            key,
            version,
            correlation_id,
            client_id,
        })
    }

    /// Encode the header in the layout [`RequestHeader::read_from`] expects
    pub fn write_to<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_i16(self.key.value());
        buf.put_i16(self.version.value());
        buf.put_i32(self.correlation_id);
        match &self.client_id {
            None => buf.put_i16(-1),
            Some(client_id) => {
                let len = i16::try_from(client_id.len()).map_err(|_| {
                    Error::Protocol(format!("client id too long: {}B", client_id.len()))
                })?;
                buf.put_i16(len);
                buf.put_slice(client_id.as_bytes());
            }
        }
        Ok(())
    }
}

impl fmt::Display for RequestHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{key:{}, version:{}, correlation_id:{}, client_id:{}}}",
            self.key,
            self.version,
            self.correlation_id,
            self.client_id.as_deref().unwrap_or("nullopt")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

impl ResponseHeader {
    pub const SIZE: usize = 4;

    /// Header answering `request`
    pub fn for_request(request: &RequestHeader) -> Self {
        Self {
            correlation_id: request.correlation_id,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn test_read_header_and_leave_body() {
        let mut buf = BytesMut::new();
        buf.put_i16(1);
        buf.put_i16(11);
        buf.put_i32(7);
        buf.put_i16(6);
        buf.put_slice(b"client");
        buf.put_slice(b"body");
        let mut buf = buf.freeze();

        let header = RequestHeader::read_from(&mut buf).unwrap();
        assert_eq!(header.key, ApiKey::FETCH);
        assert_eq!(header.version, ApiVersion(11));
        assert_eq!(header.correlation_id, 7);
        assert_eq!(header.client_id.as_deref(), Some("client"));
        assert_eq!(buf, Bytes::from_static(b"body"));
    }

    #[test]
    fn test_null_client_id() {
        let header = RequestHeader {
            key: ApiKey::PRODUCE,
            version: ApiVersion(3),
            correlation_id: -5,
            client_id: None,
        };
        let mut buf = BytesMut::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 10);

        let decoded = RequestHeader::read_from(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(
            decoded.to_string(),
            "{key:0, version:3, correlation_id:-5, client_id:nullopt}"
        );
    }

    #[test]
    fn test_malformed_headers() {
        let mut short = Bytes::from_static(&[0, 1, 0, 2]);
        assert!(matches!(
            RequestHeader::read_from(&mut short),
            Err(Error::Protocol(_))
        ));

        let mut truncated = BytesMut::new();
        truncated.put_i16(0);
        truncated.put_i16(0);
        truncated.put_i32(1);
        truncated.put_i16(10);
        truncated.put_slice(b"abc");
        assert!(matches!(
            RequestHeader::read_from(&mut truncated.freeze()),
            Err(Error::Protocol(_))
        ));

        let mut negative = BytesMut::new();
        negative.put_i16(0);
        negative.put_i16(0);
        negative.put_i32(1);
        negative.put_i16(-3);
        assert!(matches!(
            RequestHeader::read_from(&mut negative.freeze()),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_response_echoes_correlation_id() {
        let request = RequestHeader {
            key: ApiKey::API_VERSIONS,
            version: ApiVersion(0),
            correlation_id: 0x0102_0304,
            client_id: Some("c".to_string()),
        };
        let response = ResponseHeader::for_request(&request);

        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        assert_eq!(&buf[..], &[1, 2, 3, 4]);
        assert_eq!(buf.len(), ResponseHeader::SIZE);
    }

    #[test]
    fn test_versions_are_ordered() {
        assert!(ApiVersion(2) > ApiVersion(1));
        assert!(ApiVersion::default() <= ApiVersion(0));
        assert_eq!(ApiKey(18).to_string(), "18");
    }
}
