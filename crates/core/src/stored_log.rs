//! Envelope written in front of uploaded log bodies.
//!
//! Layout: `log 1\n<n>\n<header json>\n<body>` where `n` is the length of the
//! header JSON plus its terminating newline.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Magic line identifying the envelope version.
pub const STORED_LOG_MAGIC: &str = "log 1";

/// Metadata recorded alongside an uploaded log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLogHeader {
    /// Device token of the uploader.
    pub token: String,
    /// Client-reported time zone, possibly empty.
    pub tz: String,
    /// `Content-Encoding` of the body, possibly empty.
    pub encoding: String,
}

impl StoredLogHeader {
    /// Serialize the envelope preamble that precedes the body.
    pub fn preamble(&self) -> Result<Bytes> {
        let json = serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Bytes::from(format!(
            "{STORED_LOG_MAGIC}\n{}\n{json}\n",
            json.len() + 1
        )))
    }

    /// Split a stored object into its header and body.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8])> {
        let malformed = |what: &str| Error::Serialization(format!("malformed stored log: {what}"));

        let rest = data
            .strip_prefix(STORED_LOG_MAGIC.as_bytes())
            .and_then(|rest| rest.strip_prefix(b"\n"))
            .ok_or_else(|| malformed("missing magic line"))?;

        let newline = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| malformed("missing header length"))?;
        let len: usize = std::str::from_utf8(&rest[..newline])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| malformed("invalid header length"))?;

        let rest = &rest[newline + 1..];
        if len == 0 || rest.len() < len || rest[len - 1] != b'\n' {
            return Err(malformed("truncated header"));
        }

        let header = serde_json::from_slice(&rest[..len - 1])
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok((header, &rest[len..]))
    }
}
