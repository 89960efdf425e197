//! Router Module
//!
//! Decides which backend a command is sent to.
//!
//! ## Policy
//! - Keywords in the configured read-only set go to the replica
//! - Everything else goes to the primary, including keywords nobody has
//!   heard of, since an unknown command may write
//!
//! The read-only set is configuration. It is fixed when the classifier is
//! built and shared by every session afterwards.

mod classifier;

pub use classifier::{Classifier, DEFAULT_READ_ONLY_COMMANDS};

use std::fmt;

/// The backend a command is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Accepts writes
    Primary,

    /// Serves reads
    Replica,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Primary => "primary",
            Route::Replica => "replica",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
