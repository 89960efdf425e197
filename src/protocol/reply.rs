//! Reply definitions
//!
//! Represents values decoded from the wire.

use bytes::Bytes;

use crate::error::{ProxyError, Result};

/// A decoded protocol value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `:<n>`
    Integer(i64),

    /// `+<text>`
    SimpleString(Bytes),

    /// `-<text>`
    Error(Bytes),

    /// `$<len>` followed by the body; `None` is the null bulk string (`$-1`)
    BulkString(Option<Bytes>),

    /// `*<count>` followed by `count` nested values
    Array(Vec<Reply>),
}

impl Reply {
    /// Create a simple string reply
    pub fn simple(s: impl Into<Bytes>) -> Self {
        Reply::SimpleString(s.into())
    }

    /// Create an error reply
    pub fn error(s: impl Into<Bytes>) -> Self {
        Reply::Error(s.into())
    }

    /// Create a non-null bulk string reply
    pub fn bulk(s: impl Into<Bytes>) -> Self {
        Reply::BulkString(Some(s.into()))
    }

    /// The null bulk string
    pub fn null() -> Self {
        Reply::BulkString(None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Turn an error reply into `ProxyError::Upstream`
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(msg) => Err(ProxyError::Upstream(msg)),
            other => Ok(other),
        }
    }
}

/// A decoded reply together with the exact bytes it was decoded from
///
/// `raw` is what gets relayed to the client, so whatever the backend sent
/// reaches the client byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReply {
    pub reply: Reply,
    pub raw: Bytes,
}

impl RawReply {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}
