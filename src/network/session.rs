//! Session
//!
//! One client connection bridged to a primary and a replica.
//!
//! ## Tasks
//! Three threads share a session:
//! - the request loop reads client commands, classifies them, records the
//!   route and forwards the raw frame
//! - one reply pump per backend reads replies and releases them to the
//!   client
//!
//! ## Ordering
//! Every forwarded command appends its route to the pending queue before
//! its bytes leave the proxy. A pump holding a reply may only write it
//! once the queue head names its backend, and pops the head afterwards.
//! Each backend answers its own commands in order, so the head always
//! identifies the backend owing the oldest outstanding reply and the
//! client sees replies in the order it issued commands.
//!
//! ## Teardown
//! The first failure on any of the three sockets closes all three. The
//! other tasks then fail their blocked I/O and exit. `close` runs its body
//! at most once no matter how many tasks race into it.

use std::collections::VecDeque;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::BackendLink;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::protocol::{read_command, write_frame, CodecLimits};
use crate::router::{Classifier, Route};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet running
    Ready,

    /// Request loop and pumps are running
    Forwarding,

    /// Teardown has started
    Closing,

    /// All three connections released
    Closed,
}

impl SessionState {
    pub fn is_closing(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

/// State shared by the three tasks, guarded by one mutex
struct Pending {
    /// Routes of forwarded commands whose replies are not yet released
    routes: VecDeque<Route>,

    state: SessionState,
}

/// A proxied client connection
pub struct Session {
    /// Client read half, used only by the request loop
    client_reader: Mutex<BufReader<TcpStream>>,

    /// Client write half, shared by both pumps
    client_writer: Mutex<TcpStream>,

    /// Handle used only to shut the client socket down
    client_control: TcpStream,

    primary: BackendLink,
    replica: BackendLink,

    /// Shared, immutable routing policy
    classifier: Arc<Classifier>,

    /// Decode caps for client frames
    limits: CodecLimits,

    pending: Mutex<Pending>,

    /// Signalled whenever the queue head is popped or teardown starts
    released: Condvar,

    /// The failure that ended the session, unless it was a plain hang-up
    failure: Mutex<Option<ProxyError>>,

    /// Peer address for logging
    peer_addr: String,
}

impl Session {
    /// Create a session over already connected backends
    pub fn new(
        client: TcpStream,
        primary: BackendLink,
        replica: BackendLink,
        classifier: Arc<Classifier>,
        limits: CodecLimits,
    ) -> Result<Self> {
        let peer_addr = client
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        client.set_nodelay(true)?;

        let read_stream = client.try_clone()?;
        let client_control = client.try_clone()?;

        Ok(Self {
            client_reader: Mutex::new(BufReader::new(read_stream)),
            client_writer: Mutex::new(client),
            client_control,
            primary,
            replica,
            classifier,
            limits,
            pending: Mutex::new(Pending {
                routes: VecDeque::new(),
                state: SessionState::Ready,
            }),
            released: Condvar::new(),
            failure: Mutex::new(None),
            peer_addr,
        })
    }

    /// Dial both backends for a freshly accepted client
    ///
    /// If either backend cannot be reached the client connection is shut
    /// down before the error is returned.
    pub fn open(client: TcpStream, config: &Config, classifier: Arc<Classifier>) -> Result<Self> {
        let timeout = config.connect_timeout();
        let links = BackendLink::connect(&config.primary, &config.limits, timeout).and_then(
            |primary| {
                let replica = BackendLink::connect(&config.replica, &config.limits, timeout)?;
                Ok((primary, replica))
            },
        );

        match links {
            Ok((primary, replica)) => {
                Self::new(client, primary, replica, classifier, config.limits)
            }
            Err(e) => {
                let _ = client.shutdown(Shutdown::Both);
                Err(e)
            }
        }
    }

    /// Run the session until any of its connections fails or closes
    ///
    /// The request loop runs on the calling thread, the two pumps on scoped
    /// threads. Returns once all three have exited and every connection is
    /// closed. A clean client hang-up is `Ok`.
    pub fn run(&self) -> Result<()> {
        {
            let mut pending = self.pending.lock();
            if pending.state != SessionState::Ready {
                return Err(ProxyError::Closed);
            }
            pending.state = SessionState::Forwarding;
        }

        tracing::debug!(
            "Session started for {} (primary={}, replica={})",
            self.peer_addr,
            self.primary.addr(),
            self.replica.addr()
        );

        let joined = crossbeam::thread::scope(|s| {
            s.spawn(|_| self.supervise("primary pump", || self.pump(Route::Primary)));
            s.spawn(|_| self.supervise("replica pump", || self.pump(Route::Replica)));
            self.supervise("request loop", || self.request_loop());
        });
        if let Err(panic) = joined {
            std::panic::resume_unwind(panic);
        }

        tracing::debug!("Session for {} closed", self.peer_addr);
        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the client and both backend connections
    ///
    /// Safe to call from any thread, any number of times. Returns `true`
    /// only for the call that actually performed the teardown.
    pub fn close(&self) -> bool {
        {
            let mut pending = self.pending.lock();
            if pending.state.is_closing() {
                return false;
            }
            pending.state = SessionState::Closing;
        }
        self.released.notify_all();

        if let Err(e) = self.client_control.shutdown(Shutdown::Both) {
            tracing::trace!("Shutdown of client {} failed: {}", self.peer_addr, e);
        }
        self.primary.shutdown();
        self.replica.shutdown();

        let mut pending = self.pending.lock();
        if !pending.routes.is_empty() {
            tracing::debug!(
                "Session {} dropped {} in-flight replies",
                self.peer_addr,
                pending.routes.len()
            );
            pending.routes.clear();
        }
        pending.state = SessionState::Closed;
        drop(pending);
        self.released.notify_all();

        true
    }

    pub fn state(&self) -> SessionState {
        self.pending.lock().state
    }

    /// Number of forwarded commands still waiting for their reply
    pub fn pending_len(&self) -> usize {
        self.pending.lock().routes.len()
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Run one task; whatever way it ends, the session is torn down
    fn supervise<F>(&self, task: &str, f: F)
    where
        F: FnOnce() -> Result<()>,
    {
        let _teardown = Teardown(self);
        if let Err(e) = f() {
            self.record_failure(task, e);
        }
    }

    /// Read, classify, enqueue, forward. Never returns `Ok`.
    fn request_loop(&self) -> Result<()> {
        let mut reader = self.client_reader.lock();

        loop {
            let command = read_command(&mut *reader, &self.limits)?;
            let route = self.classifier.classify(&command);

            tracing::trace!(
                "{}: {} -> {}",
                self.peer_addr,
                String::from_utf8_lossy(command.keyword()),
                route
            );

            {
                let mut pending = self.pending.lock();
                if pending.state.is_closing() {
                    return Err(ProxyError::Closed);
                }
                pending.routes.push_back(route);
            }

            self.link(route).send(&command)?;
        }
    }

    /// Read replies from one backend and release them in order
    fn pump(&self, route: Route) -> Result<()> {
        let link = self.link(route);

        loop {
            let reply = link.receive_one()?;
            if reply.reply.is_error() {
                tracing::trace!("{}: relaying error reply from {}", self.peer_addr, route);
            }
            self.release(route, &reply.raw)?;
        }
    }

    /// Wait until `route` heads the queue, write `raw` to the client, pop
    fn release(&self, route: Route, raw: &[u8]) -> Result<()> {
        {
            let mut pending = self.pending.lock();
            loop {
                if pending.state.is_closing() {
                    return Err(ProxyError::Closed);
                }
                let head = pending.routes.front().copied();
                match head {
                    Some(head) if head == route => break,
                    _ if !pending.routes.contains(&route) => {
                        return Err(ProxyError::framing(format!(
                            "unsolicited reply from {}",
                            route
                        )));
                    }
                    _ => self.released.wait(&mut pending),
                }
            }
        }

        // Only the head's pump gets here, the lock keeps bytes whole
        {
            let mut writer = self.client_writer.lock();
            write_frame(&mut *writer, raw)?;
        }

        let mut pending = self.pending.lock();
        if !pending.state.is_closing() {
            pending.routes.pop_front();
        }
        drop(pending);
        self.released.notify_all();

        Ok(())
    }

    fn link(&self, route: Route) -> &BackendLink {
        match route {
            Route::Primary => &self.primary,
            Route::Replica => &self.replica,
        }
    }

    fn record_failure(&self, task: &str, err: ProxyError) {
        if self.state().is_closing() {
            tracing::trace!("{} {} exiting after teardown: {}", self.peer_addr, task, err);
            return;
        }

        if err.is_disconnect() {
            tracing::debug!("{} {} ended: {}", self.peer_addr, task, err);
            return;
        }

        tracing::warn!("{} {} failed: {}", self.peer_addr, task, err);
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }
}

/// Closes the session when a task exits, including by panic
struct Teardown<'a>(&'a Session);

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
