//! # rwsplit
//!
//! A read/write-splitting proxy for a RESP key-value store:
//! - Writes (and anything unknown) go to the primary
//! - Configured read-only commands go to the replica
//! - Replies reach the client in the order it sent its commands
//! - Frames are relayed byte for byte, never re-encoded
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one Session per client
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │  Request loop: decode → classify → enqueue route → forward   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Primary   │          │   Replica   │
//!   │    Link     │          │    Link     │
//!   └──────┬──────┘          └──────┬──────┘
//!          │ reply pump              │ reply pump
//!          └────────────┬────────────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │ Pending-route queue │ → client, in request order
//!            └─────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod router;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ProxyError, Result};
pub use config::{BackendConfig, Config};
pub use router::{Classifier, Route};
pub use network::{BackendLink, Server, Session, SessionState};
pub use client::{Client, Expiry};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rwsplit
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
