//! TCP Server
//!
//! Accepts client connections and runs one session thread per client.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::Session;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::protocol::write_frame;
use crate::router::Classifier;

/// How often the accept loop checks the shutdown flag while idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sent to clients refused because of `max_connections`
const MAX_CLIENTS_REPLY: &[u8] = b"-ERR max number of clients reached\r\n";

/// TCP listener for the proxy
pub struct Server {
    config: Arc<Config>,

    /// Built once, shared read-only by every session
    classifier: Arc<Classifier>,

    listener: TcpListener,
    local_addr: SocketAddr,

    /// Sessions currently running
    active: Arc<AtomicUsize>,

    shutdown: AtomicBool,
}

impl Server {
    /// Validate the config and bind the listen address
    pub fn bind(config: Config) -> Result<Self> {
        config.validate()?;
        let classifier = Arc::new(config.classifier()?);

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            ProxyError::Config(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        // Non-blocking accept so shutdown() is noticed
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config: Arc::new(config),
            classifier,
            listener,
            local_addr,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept clients until [`shutdown`](Self::shutdown) is called
    ///
    /// Sessions already running are not interrupted by shutdown.
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            "Listening on {} (primary={}, replica={}, {} read-only commands)",
            self.local_addr,
            self.config.primary.addr,
            self.config.replica.addr,
            self.classifier.len()
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server on {} stopped accepting", self.local_addr);
        Ok(())
    }

    /// Signal the server to stop accepting
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Number of sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn dispatch(&self, mut stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Dropping client {}: {}", addr, e);
            return;
        }

        let open = self.active.fetch_add(1, Ordering::SeqCst);
        if open >= self.config.max_connections {
            self.active.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!("Refusing client {}: {} connections open", addr, open);
            let _ = write_frame(&mut stream, MAX_CLIENTS_REPLY);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        tracing::info!("Client {} connected", addr);

        let slot = ActiveSlot(Arc::clone(&self.active));
        let config = Arc::clone(&self.config);
        let classifier = Arc::clone(&self.classifier);

        let spawned = thread::Builder::new()
            .name(format!("session-{}", addr))
            .spawn(move || {
                let _slot = slot;
                serve_client(stream, &config, classifier, addr);
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to spawn session for {}: {}", addr, e);
        }
    }
}

/// Open a session for one client and run it to completion
fn serve_client(stream: TcpStream, config: &Config, classifier: Arc<Classifier>, addr: SocketAddr) {
    let session = match Session::open(stream, config, classifier) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Dropping client {}: backend unavailable: {}", addr, e);
            return;
        }
    };

    match session.run() {
        Ok(()) => tracing::info!("Client {} disconnected", addr),
        Err(e) => tracing::warn!("Session for {} ended: {}", addr, e),
    }
}

/// Releases a connection slot when the session thread finishes
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
