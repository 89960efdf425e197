//! Shared test helpers
//!
//! Fake backends listening on 127.0.0.1:0 and a harness that wires a
//! session between a test client and two backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rwsplit::protocol::{
    encode_command, encode_reply, read_command, read_reply, CodecLimits, Command, RawReply, Reply,
};
use rwsplit::{BackendConfig, BackendLink, Classifier, Session};

// =============================================================================
// Fake Backends
// =============================================================================

/// Start a backend that hands every command to `handler`
///
/// The handler writes its own reply, so it can delay, split or skip it.
/// Returning an error closes that connection.
pub fn spawn_backend<F>(handler: F) -> SocketAddr
where
    F: Fn(&Command, &mut TcpStream) -> io::Result<()> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let handler = Arc::clone(&handler);
            thread::spawn(move || serve(stream, &*handler));
        }
    });

    addr
}

fn serve<F>(stream: TcpStream, handler: &F)
where
    F: Fn(&Command, &mut TcpStream) -> io::Result<()>,
{
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    let limits = CodecLimits::default();

    while let Ok(command) = read_command(&mut reader, &limits) {
        if handler(&command, &mut writer).is_err() {
            break;
        }
    }
}

/// Arguments joined with spaces
pub fn args_text(command: &Command) -> String {
    command
        .args()
        .iter()
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bulk reply naming the backend and echoing the command
pub fn tag_reply(tag: &str, command: &Command) -> Vec<u8> {
    encode_reply(&Reply::bulk(format!("{} {}", tag, args_text(command))))
}

/// Backend that answers everything with [`tag_reply`]
pub fn tagging_backend(tag: &'static str) -> SocketAddr {
    spawn_backend(move |command, out| out.write_all(&tag_reply(tag, command)))
}

/// Minimal in-memory store: AUTH, SELECT, PING, GET, SET, HSET, HGET, HGETALL
///
/// Every command seen is appended to `log`.
pub fn kv_backend(password: Option<&'static str>, log: Arc<Mutex<Vec<String>>>) -> SocketAddr {
    let strings: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>> = Arc::default();
    let hashes: Arc<Mutex<HashMap<Vec<u8>, Vec<(Vec<u8>, Vec<u8>)>>>> = Arc::default();

    spawn_backend(move |command, out| {
        log.lock().push(args_text(command));
        let args: Vec<&[u8]> = command.args().iter().map(|a| a.as_ref()).collect();
        let keyword = String::from_utf8_lossy(args[0]).to_ascii_uppercase();

        let reply = match (keyword.as_str(), &args[1..]) {
            ("AUTH", [given]) => match password {
                Some(p) if p.as_bytes() == *given => Reply::simple("OK"),
                _ => Reply::error("WRONGPASS invalid password"),
            },
            ("SELECT", [_]) | ("PING", []) => Reply::simple("OK"),
            ("GET", [key]) => match strings.lock().get(*key) {
                Some(v) => Reply::bulk(v.clone()),
                None => Reply::null(),
            },
            ("SET", [key, value, ..]) => {
                strings.lock().insert(key.to_vec(), value.to_vec());
                Reply::simple("OK")
            }
            ("HSET", [key, field, value]) => {
                let mut hashes = hashes.lock();
                let fields = hashes.entry(key.to_vec()).or_default();
                match fields.iter_mut().find(|entry| entry.0.as_slice() == *field) {
                    Some(entry) => {
                        entry.1 = value.to_vec();
                        Reply::Integer(0)
                    }
                    None => {
                        fields.push((field.to_vec(), value.to_vec()));
                        Reply::Integer(1)
                    }
                }
            }
            ("HGET", [key, field]) => {
                let hashes = hashes.lock();
                let value = hashes
                    .get(*key)
                    .and_then(|fields| fields.iter().find(|(f, _)| f.as_slice() == *field))
                    .map(|(_, v)| v.clone());
                match value {
                    Some(v) => Reply::bulk(v),
                    None => Reply::null(),
                }
            }
            ("HGETALL", [key]) => {
                let hashes = hashes.lock();
                let items: Vec<Reply> = hashes
                    .get(*key)
                    .map(|fields| {
                        fields
                            .iter()
                            .flat_map(|(f, v)| [Reply::bulk(f.clone()), Reply::bulk(v.clone())])
                            .collect()
                    })
                    .unwrap_or_default();
                Reply::Array(items)
            }
            _ => Reply::error(format!("ERR unknown command '{}'", keyword)),
        };

        out.write_all(&encode_reply(&reply))
    })
}

/// An address nothing listens on
pub fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

// =============================================================================
// Session Harness
// =============================================================================

pub fn link(addr: SocketAddr) -> BackendLink {
    BackendLink::connect(
        &BackendConfig::new(addr.to_string()),
        &CodecLimits::default(),
        Some(Duration::from_secs(2)),
    )
    .unwrap()
}

/// A client socket and the session serving it, not yet running
pub fn build_session(primary: SocketAddr, replica: SocketAddr) -> (TcpStream, Session) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (accepted, _) = listener.accept().unwrap();

    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let session = Session::new(
        accepted,
        link(primary),
        link(replica),
        Arc::new(Classifier::default()),
        CodecLimits::default(),
    )
    .unwrap();

    (client, session)
}

/// A running session plus the client end of it
pub struct Harness {
    pub client: TcpStream,
    pub reader: BufReader<TcpStream>,
    pub session: Arc<Session>,
    pub handle: JoinHandle<rwsplit::Result<()>>,
}

impl Harness {
    pub fn start(primary: SocketAddr, replica: SocketAddr) -> Self {
        let (client, session) = build_session(primary, replica);
        let session = Arc::new(session);
        let runner = Arc::clone(&session);
        let handle = thread::spawn(move || runner.run());

        Self {
            reader: BufReader::new(client.try_clone().unwrap()),
            client,
            session,
            handle,
        }
    }

    pub fn send(&mut self, args: &[&str]) {
        self.client.write_all(&encode_command(args)).unwrap();
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.client.write_all(bytes).unwrap();
    }

    pub fn recv(&mut self) -> RawReply {
        read_reply(&mut self.reader, &CodecLimits::default()).unwrap()
    }

    /// Text of a bulk reply
    pub fn recv_text(&mut self) -> String {
        match self.recv().reply {
            Reply::BulkString(Some(b)) => String::from_utf8_lossy(&b).into_owned(),
            other => panic!("expected bulk string, got {:?}", other),
        }
    }

    /// True once the proxy has closed the client connection
    pub fn closed_by_proxy(&mut self) -> bool {
        read_reply(&mut self.reader, &CodecLimits::default())
            .err()
            .map(|e| e.is_disconnect())
            .unwrap_or(false)
    }

    pub fn join(self) -> rwsplit::Result<()> {
        self.handle.join().unwrap()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
