//! Protocol Module
//!
//! Defines the RESP-style wire protocol spoken by clients and backends.
//!
//! ## Protocol Format
//!
//! ### Request Format
//! ```text
//! ┌───────────┬──────────────────┬──────────────────┬─────┐
//! │ *<n>\r\n  │ $<len>\r\n<arg>\r\n │ $<len>\r\n<arg>\r\n │ ... │
//! └───────────┴──────────────────┴──────────────────┴─────┘
//! ```
//!
//! ### Reply Types
//! - `+` simple string
//! - `-` error
//! - `:` integer
//! - `$` bulk string (`$-1` is null)
//! - `*` array (nests arbitrarily)

mod codec;
mod command;
mod limits;
mod reply;

pub use codec::{
    decode_command, decode_reply, encode_command, encode_reply, read_command, read_reply,
    write_frame, CRLF,
};
pub use command::Command;
pub use limits::CodecLimits;
pub use reply::{RawReply, Reply};
