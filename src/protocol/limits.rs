//! Decode limits
//!
//! Declared lengths arrive from the network and are not trusted. Declared
//! sizes are checked against these caps before any body is read, and the
//! frame buffer only grows as bytes actually arrive.

use serde::Deserialize;

/// Caps applied while decoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodecLimits {
    /// Maximum array nesting (a flat command has depth 1)
    pub max_nesting_depth: usize,

    /// Maximum declared bulk string length in bytes
    pub max_bulk_len: usize,

    /// Maximum declared array element count
    pub max_array_len: usize,

    /// Maximum header line length (`+`, `-`, `:` and length lines), CRLF excluded
    pub max_line_len: usize,

    /// Maximum size of one complete frame in bytes
    pub max_frame_len: usize,
}

impl CodecLimits {
    /// Limits that accept anything the input declares
    pub fn unbounded() -> Self {
        Self {
            max_nesting_depth: usize::MAX,
            max_bulk_len: usize::MAX,
            max_array_len: usize::MAX,
            max_line_len: usize::MAX,
            max_frame_len: usize::MAX,
        }
    }
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_bulk_len: 512 * 1024 * 1024, // 512 MB, same as proto-max-bulk-len
            max_array_len: 1_048_576,
            max_line_len: 64 * 1024,
            max_frame_len: 1024 * 1024 * 1024, // 1 GB, same as client-query-buffer-limit
        }
    }
}
