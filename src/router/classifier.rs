//! Command classifier
//!
//! Keyword lookup against an immutable read-only set.

use std::collections::HashSet;

use super::Route;
use crate::error::{ProxyError, Result};
use crate::protocol::Command;

/// Keywords routed to the replica when nothing else is configured
pub const DEFAULT_READ_ONLY_COMMANDS: &[&str] = &[
    // keys
    "GET",
    // lists
    "LLEN", "LRANGE",
    // hashes
    "HEXISTS", "HGET", "HLEN",
];

/// Maps a command keyword to a [`Route`]
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Upper-cased read-only keywords
    read_only: HashSet<Vec<u8>>,
}

impl Classifier {
    /// Build a classifier from a list of read-only keywords
    ///
    /// Keywords are matched case-insensitively. An empty keyword is
    /// rejected since no command can carry one.
    pub fn new<I, S>(read_only: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for keyword in read_only {
            let keyword = keyword.as_ref().trim();
            if keyword.is_empty() {
                return Err(ProxyError::Config(
                    "read-only command list contains an empty keyword".to_string(),
                ));
            }
            set.insert(keyword.to_ascii_uppercase().into_bytes());
        }
        Ok(Self { read_only: set })
    }

    /// Route for a raw keyword
    pub fn route_keyword(&self, keyword: &[u8]) -> Route {
        if self.read_only.contains(&keyword.to_ascii_uppercase()) {
            Route::Replica
        } else {
            Route::Primary
        }
    }

    /// Route for a parsed command
    pub fn classify(&self, command: &Command) -> Route {
        self.route_keyword(command.keyword())
    }

    pub fn is_read_only(&self, keyword: &[u8]) -> bool {
        self.route_keyword(keyword) == Route::Replica
    }

    pub fn len(&self) -> usize {
        self.read_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_only.is_empty()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            read_only: DEFAULT_READ_ONLY_COMMANDS
                .iter()
                .map(|k| k.as_bytes().to_vec())
                .collect(),
        }
    }
}
