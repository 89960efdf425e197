//! Backend Link
//!
//! One connection to one backend node.

use std::io::{self, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::BackendConfig;
use crate::error::{ProxyError, Result};
use crate::protocol::{
    encode_command, read_reply, write_frame, CodecLimits, Command, RawReply, Reply,
};

/// A connection to one backend
///
/// Reading and writing are locked separately, so a reply pump can block in
/// [`receive_one`](Self::receive_one) while the request loop keeps calling
/// [`send`](Self::send). Any I/O failure marks the link dead for good; it
/// never reconnects.
pub struct BackendLink {
    /// Buffered read half
    reader: Mutex<BufReader<TcpStream>>,

    /// Write half; frames are written whole so no buffering is needed
    writer: Mutex<TcpStream>,

    /// Handle used only to shut the socket down from any thread
    control: TcpStream,

    /// Decode caps for replies
    limits: CodecLimits,

    /// Set on the first failure or on shutdown
    dead: AtomicBool,

    /// Backend address for logging
    addr: String,
}

impl BackendLink {
    /// Dial a backend and run the credential handshake
    ///
    /// Sends `AUTH` when a password is configured and `SELECT` when the db
    /// is not 0. An error reply to either fails the connect.
    pub fn connect(
        backend: &BackendConfig,
        limits: &CodecLimits,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = dial(&backend.addr, timeout)?;
        let link = Self::from_stream(stream, backend.addr.clone(), limits)?;

        if let Some(password) = &backend.password {
            link.execute(&["AUTH", password.as_str()])?.into_result()?;
        }
        if backend.db != 0 {
            let db = backend.db.to_string();
            link.execute(&["SELECT", db.as_str()])?.into_result()?;
        }

        tracing::debug!("Connected to backend {}", link.addr);
        Ok(link)
    }

    /// Wrap an already connected stream without any handshake
    pub fn from_stream(stream: TcpStream, addr: String, limits: &CodecLimits) -> Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        Ok(Self {
            reader: Mutex::new(BufReader::new(read_stream)),
            writer: Mutex::new(stream),
            control,
            limits: *limits,
            dead: AtomicBool::new(false),
            addr,
        })
    }

    /// Forward a command's original frame bytes
    pub fn send(&self, command: &Command) -> Result<()> {
        self.send_raw(command.raw())
    }

    /// Write a complete frame, retrying partial writes
    pub fn send_raw(&self, frame: &[u8]) -> Result<()> {
        if self.is_dead() {
            return Err(ProxyError::Closed);
        }
        let mut writer = self.writer.lock();
        write_frame(&mut *writer, frame).map_err(|e| self.fail(e))
    }

    /// Read exactly one reply, with the bytes it was decoded from
    ///
    /// Never reads into the next reply. An `-` reply is returned as data.
    pub fn receive_one(&self) -> Result<RawReply> {
        if self.is_dead() {
            return Err(ProxyError::Closed);
        }
        let mut reader = self.reader.lock();
        read_reply(&mut *reader, &self.limits).map_err(|e| self.fail(e))
    }

    /// Encode `args`, send them and wait for the reply
    ///
    /// Only for callers that own the link outright (handshake, client
    /// library). A session must not use this, replies would be stolen
    /// from its pump.
    pub fn execute<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<Reply> {
        if args.is_empty() {
            return Err(ProxyError::framing("empty command"));
        }
        self.send_raw(&encode_command(args))?;
        Ok(self.receive_one()?.reply)
    }

    /// Close both directions and mark the link dead
    ///
    /// Wakes up any thread blocked in `receive_one`.
    pub fn shutdown(&self) {
        self.dead.store(true, Ordering::SeqCst);
        if let Err(e) = self.control.shutdown(std::net::Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::trace!("Shutdown of backend {} failed: {}", self.addr, e);
            }
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Get the backend address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn fail(&self, err: ProxyError) -> ProxyError {
        if matches!(
            err,
            ProxyError::Io(_) | ProxyError::Framing(_) | ProxyError::MalformedInteger(_)
        ) {
            self.dead.store(true, Ordering::SeqCst);
        }
        err
    }
}

/// Resolve and connect, honouring the timeout on every candidate address
fn dial(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let Some(timeout) = timeout else {
        return Ok(TcpStream::connect(addr)?);
    };

    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{} resolved to nothing", addr))
        })
        .into())
}
