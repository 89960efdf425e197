//! Network Module
//!
//! Backend connections, client sessions and the listener.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One session per client, each owning its own primary and replica links
//! - Per session: a request loop plus one reply pump per backend

mod backend;
mod server;
mod session;

pub use backend::BackendLink;
pub use server::Server;
pub use session::{Session, SessionState};
