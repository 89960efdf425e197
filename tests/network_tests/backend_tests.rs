//! Backend Link Tests
//!
//! These tests verify:
//! - Credential handshake on connect
//! - Raw forwarding and exact single-reply reads
//! - Dead-link behaviour after failure or shutdown

#[path = "../common/mod.rs"]
mod common;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rwsplit::protocol::{CodecLimits, Command, Reply};
use rwsplit::{BackendConfig, BackendLink, ProxyError};

use common::{dead_addr, kv_backend, link, spawn_backend, tagging_backend};

fn connect(backend: &BackendConfig) -> rwsplit::Result<BackendLink> {
    BackendLink::connect(backend, &CodecLimits::default(), Some(Duration::from_secs(2)))
}

// =============================================================================
// Handshake Tests
// =============================================================================

#[test]
fn test_connect_without_credentials_sends_nothing() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let addr = kv_backend(None, Arc::clone(&log));

    let link = connect(&BackendConfig::new(addr.to_string())).unwrap();
    link.execute(&["PING"]).unwrap();

    assert_eq!(*log.lock(), vec!["PING"]);
}

#[test]
fn test_connect_sends_auth_and_select() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let addr = kv_backend(Some("secret"), Arc::clone(&log));

    let backend = BackendConfig::new(addr.to_string())
        .with_password("secret")
        .with_db(3);
    let link = connect(&backend).unwrap();

    assert!(!link.is_dead());
    assert_eq!(*log.lock(), vec!["AUTH secret", "SELECT 3"]);
}

#[test]
fn test_connect_fails_on_auth_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let addr = kv_backend(Some("secret"), log);

    let backend = BackendConfig::new(addr.to_string()).with_password("wrong");
    match connect(&backend) {
        Err(ProxyError::Upstream(msg)) => assert!(msg.starts_with(b"WRONGPASS")),
        Err(other) => panic!("Expected upstream error, got {}", other),
        Ok(_) => panic!("Expected upstream error, got a link"),
    }
}

#[test]
fn test_connect_refused() {
    let result = connect(&BackendConfig::new(dead_addr().to_string()));
    assert!(matches!(result, Err(ProxyError::Io(_))));
}

// =============================================================================
// Send / Receive Tests
// =============================================================================

#[test]
fn test_send_forwards_raw_bytes() {
    let addr = tagging_backend("primary");
    let link = link(addr);

    let command = Command::from_args(["SET", "k", "v"]).unwrap();
    link.send(&command).unwrap();
    let reply = link.receive_one().unwrap();

    assert_eq!(reply.reply, Reply::bulk("primary SET k v"));
    assert_eq!(reply.raw.as_ref(), b"$15\r\nprimary SET k v\r\n");
}

#[test]
fn test_receive_one_does_not_over_read() {
    // Both replies arrive in a single write
    let addr = spawn_backend(|_, out| out.write_all(b"*2\r\n:1\r\n:2\r\n+second\r\n"));
    let link = link(addr);

    link.send(&Command::from_args(["ANY"]).unwrap()).unwrap();
    let first = link.receive_one().unwrap();
    let second = link.receive_one().unwrap();

    assert_eq!(first.raw.as_ref(), b"*2\r\n:1\r\n:2\r\n");
    assert_eq!(second.reply, Reply::simple("second"));
}

#[test]
fn test_error_reply_is_data() {
    let addr = spawn_backend(|_, out| out.write_all(b"-ERR nope\r\n"));
    let link = link(addr);

    link.send(&Command::from_args(["BAD"]).unwrap()).unwrap();
    let reply = link.receive_one().unwrap();

    assert_eq!(reply.reply, Reply::error("ERR nope"));
    assert!(!link.is_dead());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_backend_close_marks_link_dead() {
    // Closes the connection instead of answering
    let addr = spawn_backend(|_, _| Err(io::Error::new(io::ErrorKind::Other, "hang up")));
    let link = link(addr);

    link.send(&Command::from_args(["GET", "k"]).unwrap()).unwrap();
    let err = link.receive_one().unwrap_err();

    assert!(err.is_disconnect());
    assert!(link.is_dead());
    assert!(matches!(
        link.send(&Command::from_args(["GET", "k"]).unwrap()),
        Err(ProxyError::Closed)
    ));
}

#[test]
fn test_garbage_reply_marks_link_dead() {
    let addr = spawn_backend(|_, out| out.write_all(b"!garbage\r\n"));
    let link = link(addr);

    link.send(&Command::from_args(["GET", "k"]).unwrap()).unwrap();

    assert!(matches!(link.receive_one(), Err(ProxyError::Framing(_))));
    assert!(link.is_dead());
}

#[test]
fn test_shutdown_unblocks_reader() {
    // Never answers
    let addr = spawn_backend(|_, _| Ok(()));
    let link = Arc::new(link(addr));

    let reader = Arc::clone(&link);
    let handle = std::thread::spawn(move || reader.receive_one());

    std::thread::sleep(Duration::from_millis(50));
    link.shutdown();

    assert!(handle.join().unwrap().is_err());
    assert!(link.is_dead());
}
