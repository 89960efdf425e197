//! Command definitions
//!
//! Represents commands from clients.

use bytes::Bytes;

use super::codec::encode_command;

/// A parsed command
///
/// Keeps the frame it was parsed from. Forwarding writes `raw` as-is and
/// never re-encodes `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Arguments in order; `args[0]` is the keyword
    args: Vec<Bytes>,

    /// The complete frame these arguments came from
    raw: Bytes,
}

impl Command {
    /// Build a command from arguments, framing it as an array of bulk strings
    ///
    /// Returns `None` for an empty argument list.
    pub fn from_args<I, A>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let args: Vec<Bytes> = args.into_iter().map(Into::into).collect();
        if args.is_empty() {
            return None;
        }
        let raw = Bytes::from(encode_command(&args));
        Some(Self { args, raw })
    }

    /// Pair already-decoded arguments with the frame they came from
    pub(crate) fn from_parts(args: Vec<Bytes>, raw: Bytes) -> Self {
        debug_assert!(!args.is_empty());
        Self { args, raw }
    }

    /// The keyword, exactly as the client sent it
    pub fn keyword(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The frame bytes to forward
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}
