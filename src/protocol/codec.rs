//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! Every value starts with a type byte and a CRLF-terminated header line:
//! ```text
//! *<count>\r\n  <count values>          Array
//! $<len>\r\n    <len bytes>\r\n         Bulk string ($-1 is null)
//! +<text>\r\n                           Simple string
//! -<text>\r\n                           Error
//! :<digits>\r\n                         Integer
//! ```
//!
//! ### Request (Command) Format
//! An array of bulk strings, the first one being the keyword:
//! ```text
//! *3\r\n $3\r\nSET\r\n $1\r\nk\r\n $1\r\nv\r\n
//! ```
//!
//! Decoding records every byte it consumes, so a decoded frame can be
//! relayed verbatim without re-encoding.

use std::io::{self, BufRead, Read, Write};
use std::ops::Range;

use bytes::{BufMut, Bytes, BytesMut};

use super::{CodecLimits, Command, RawReply, Reply};
use crate::error::{ProxyError, Result};

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Cap on up-front array allocation; the rest grows as elements arrive
const PREALLOC_LIMIT: usize = 1024;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a command as an array of bulk strings
///
/// Format: `*<count>\r\n` then `$<len>\r\n<bytes>\r\n` per argument
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let body: usize = args.iter().map(|a| a.as_ref().len() + 16).sum();
    let mut message = Vec::with_capacity(16 + body);

    write_header(&mut message, b'*', args.len() as i64);
    for arg in args {
        let arg = arg.as_ref();
        write_header(&mut message, b'$', arg.len() as i64);
        message.extend_from_slice(arg);
        message.extend_from_slice(CRLF);
    }

    message
}

/// Encode any reply value
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut message = Vec::new();
    encode_reply_into(reply, &mut message);
    message
}

fn encode_reply_into(reply: &Reply, out: &mut Vec<u8>) {
    match reply {
        Reply::Integer(n) => write_header(out, b':', *n),
        Reply::SimpleString(s) => write_line(out, b'+', s),
        Reply::Error(s) => write_line(out, b'-', s),
        Reply::BulkString(None) => write_header(out, b'$', -1),
        Reply::BulkString(Some(s)) => {
            write_header(out, b'$', s.len() as i64);
            out.extend_from_slice(s);
            out.extend_from_slice(CRLF);
        }
        Reply::Array(items) => {
            write_header(out, b'*', items.len() as i64);
            for item in items {
                encode_reply_into(item, out);
            }
        }
    }
}

fn write_header(out: &mut Vec<u8>, kind: u8, n: i64) {
    out.push(kind);
    out.extend_from_slice(n.to_string().as_bytes());
    out.extend_from_slice(CRLF);
}

fn write_line(out: &mut Vec<u8>, kind: u8, text: &[u8]) {
    out.push(kind);
    out.extend_from_slice(text);
    out.extend_from_slice(CRLF);
}

// =============================================================================
// Stream-based decoding
// =============================================================================

/// Read exactly one reply from a buffered stream
///
/// Consumes the bytes of this reply and nothing more. An EOF before the
/// first byte surfaces as an `UnexpectedEof` I/O error.
pub fn read_reply<R: BufRead>(reader: &mut R, limits: &CodecLimits) -> Result<RawReply> {
    Decoder::new(reader, limits).decode()
}

/// Read exactly one command from a buffered stream
///
/// The frame must be a non-empty array of bulk strings. A null element
/// becomes an empty argument.
pub fn read_command<R: BufRead>(reader: &mut R, limits: &CodecLimits) -> Result<Command> {
    let RawReply { reply, raw } = read_reply(reader, limits)?;

    let items = match reply {
        Reply::Array(items) => items,
        other => {
            return Err(ProxyError::framing(format!(
                "command must be an array, got {}",
                kind_name(&other)
            )))
        }
    };

    if items.is_empty() {
        return Err(ProxyError::framing("empty command"));
    }

    let mut args = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Reply::BulkString(Some(arg)) => args.push(arg),
            Reply::BulkString(None) => args.push(Bytes::new()),
            other => {
                return Err(ProxyError::framing(format!(
                    "command arguments must be bulk strings, got {}",
                    kind_name(&other)
                )))
            }
        }
    }

    Ok(Command::from_parts(args, raw))
}

/// Write a complete frame, retrying partial writes, then flush
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Slice-based decoding
// =============================================================================

/// Decode one reply from the front of a byte slice
///
/// `raw.len()` of the result is the number of bytes consumed.
pub fn decode_reply(bytes: &[u8], limits: &CodecLimits) -> Result<RawReply> {
    let mut cursor = bytes;
    read_reply(&mut cursor, limits).map_err(incomplete_as_framing)
}

/// Decode one command from the front of a byte slice
pub fn decode_command(bytes: &[u8], limits: &CodecLimits) -> Result<Command> {
    let mut cursor = bytes;
    read_command(&mut cursor, limits).map_err(incomplete_as_framing)
}

fn incomplete_as_framing(err: ProxyError) -> ProxyError {
    match err {
        ProxyError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            ProxyError::framing("incomplete frame")
        }
        other => other,
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Recursive-descent decoder that tees every consumed byte into `raw`
///
/// Values are first decoded as [`Node`]s holding spans into `raw`, so once
/// the frame is complete every string in the [`Reply`] is a slice of the
/// same buffer rather than a copy.
struct Decoder<'a, R> {
    reader: &'a mut R,
    limits: &'a CodecLimits,
    raw: BytesMut,
}

/// A decoded value whose strings are spans of the frame buffer
#[derive(Debug)]
enum Node {
    Integer(i64),
    SimpleString(Range<usize>),
    Error(Range<usize>),
    BulkString(Option<Range<usize>>),
    Array(Vec<Node>),
}

impl Node {
    fn into_reply(self, raw: &Bytes) -> Reply {
        match self {
            Node::Integer(n) => Reply::Integer(n),
            Node::SimpleString(span) => Reply::SimpleString(raw.slice(span)),
            Node::Error(span) => Reply::Error(raw.slice(span)),
            Node::BulkString(span) => Reply::BulkString(span.map(|s| raw.slice(s))),
            Node::Array(items) => {
                Reply::Array(items.into_iter().map(|n| n.into_reply(raw)).collect())
            }
        }
    }
}

impl<'a, R: BufRead> Decoder<'a, R> {
    fn new(reader: &'a mut R, limits: &'a CodecLimits) -> Self {
        Self {
            reader,
            limits,
            raw: BytesMut::new(),
        }
    }

    /// Decode one complete frame
    fn decode(mut self) -> Result<RawReply> {
        let node = self.decode_value(0)?;
        let raw = self.raw.freeze();

        Ok(RawReply {
            reply: node.into_reply(&raw),
            raw,
        })
    }

    /// Decode one value; `depth` is the number of enclosing arrays
    fn decode_value(&mut self, depth: usize) -> Result<Node> {
        let (start, end) = self.read_line()?;
        let kind = self.raw[start];
        let body = start + 1..end;

        match kind {
            b'*' => {
                let depth = depth + 1;
                if depth > self.limits.max_nesting_depth {
                    return Err(ProxyError::framing(format!(
                        "nesting depth {} exceeds limit {}",
                        depth, self.limits.max_nesting_depth
                    )));
                }

                let count = parse_length(&self.raw[body])?;
                // *-1 is a null array
                let Some(count) = count else {
                    return Ok(Node::Array(Vec::new()));
                };
                if count > self.limits.max_array_len {
                    return Err(ProxyError::framing(format!(
                        "array length {} exceeds limit {}",
                        count, self.limits.max_array_len
                    )));
                }

                let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
                for _ in 0..count {
                    items.push(self.decode_value(depth)?);
                }
                Ok(Node::Array(items))
            }
            b'$' => {
                let Some(len) = parse_length(&self.raw[body])? else {
                    return Ok(Node::BulkString(None));
                };
                if len > self.limits.max_bulk_len {
                    return Err(ProxyError::framing(format!(
                        "bulk string length {} exceeds limit {}",
                        len, self.limits.max_bulk_len
                    )));
                }
                self.read_bulk_body(len).map(|span| Node::BulkString(Some(span)))
            }
            b'+' => Ok(Node::SimpleString(body)),
            b'-' => Ok(Node::Error(body)),
            b':' => {
                let digits = &self.raw[body];
                std::str::from_utf8(digits)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .map(Node::Integer)
                    .ok_or_else(|| {
                        ProxyError::MalformedInteger(String::from_utf8_lossy(digits).into_owned())
                    })
            }
            other => Err(ProxyError::framing(format!(
                "unexpected type byte 0x{:02x}",
                other
            ))),
        }
    }

    /// Read one CRLF-terminated line into `raw`
    ///
    /// Returns the span of the line content without the terminator. Stops
    /// with a framing error as soon as the line outgrows `max_line_len`.
    fn read_line(&mut self) -> Result<(usize, usize)> {
        let start = self.raw.len();
        let cap = self.limits.max_line_len.saturating_add(CRLF.len());

        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                let msg = if self.raw.len() == start {
                    "stream closed"
                } else {
                    "stream closed mid-line"
                };
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg).into());
            }

            let (used, done) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            if self.raw.len() - start + used > cap {
                return Err(ProxyError::framing(format!(
                    "line exceeds limit of {} bytes",
                    self.limits.max_line_len
                )));
            }
            check_frame_len(self.limits, self.raw.len(), used)?;

            self.raw.extend_from_slice(&available[..used]);
            self.reader.consume(used);
            if done {
                break;
            }
        }

        if self.raw.len() - start < CRLF.len() || !self.raw[start..].ends_with(CRLF) {
            return Err(ProxyError::framing("line not terminated by CRLF"));
        }

        let end = self.raw.len() - CRLF.len();
        if end == start {
            return Err(ProxyError::framing("empty line, missing type byte"));
        }
        Ok((start, end))
    }

    /// Read a bulk body of `len` bytes plus its CRLF into `raw`
    ///
    /// The buffer grows only as bytes actually arrive, so a declared length
    /// costs nothing until the peer sends the data.
    fn read_bulk_body(&mut self, len: usize) -> Result<Range<usize>> {
        let start = self.raw.len();
        let total = len
            .checked_add(CRLF.len())
            .ok_or_else(|| ProxyError::framing("bulk string length overflow"))?;
        check_frame_len(self.limits, start, total)?;

        let mut body = (&mut *self.reader).take(total as u64);
        let copied = io::copy(&mut body, &mut (&mut self.raw).writer())?;
        if copied < total as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed mid-bulk-string",
            )
            .into());
        }

        if &self.raw[start + len..] != CRLF {
            return Err(ProxyError::framing("bulk string not terminated by CRLF"));
        }
        Ok(start..start + len)
    }
}

/// Fail if `more` bytes on top of `current` would pass `max_frame_len`
fn check_frame_len(limits: &CodecLimits, current: usize, more: usize) -> Result<()> {
    if current.saturating_add(more) > limits.max_frame_len {
        return Err(ProxyError::framing(format!(
            "frame exceeds limit of {} bytes",
            limits.max_frame_len
        )));
    }
    Ok(())
}

/// Parse a declared length; negative means null
fn parse_length(digits: &[u8]) -> Result<Option<usize>> {
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ProxyError::framing(format!(
                "invalid length {:?}",
                String::from_utf8_lossy(digits)
            ))
        })?;

    if n < 0 {
        return Ok(None);
    }
    usize::try_from(n)
        .map(Some)
        .map_err(|_| ProxyError::framing(format!("length {} out of range", n)))
}

fn kind_name(reply: &Reply) -> &'static str {
    match reply {
        Reply::Integer(_) => "integer",
        Reply::SimpleString(_) => "simple string",
        Reply::Error(_) => "error",
        Reply::BulkString(_) => "bulk string",
        Reply::Array(_) => "array",
    }
}
