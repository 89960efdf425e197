//! Config Tests
//!
//! Defaults, builder, JSON loading and validation.

use std::io::Write;

use rwsplit::protocol::CodecLimits;
use rwsplit::router::Route;
use rwsplit::{BackendConfig, Config, ProxyError};
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.listen_addr, "127.0.0.1:8889");
    assert_eq!(config.primary.addr, "127.0.0.1:6379");
    assert_eq!(config.replica.addr, "127.0.0.1:6380");
    assert_eq!(config.limits, CodecLimits::default());
    assert!(config.read_only_commands.iter().any(|c| c == "GET"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder() {
    let config = Config::builder()
        .listen_addr("0.0.0.0:7000")
        .primary(BackendConfig::new("10.0.0.1:6379").with_password("pw"))
        .replica(BackendConfig::new("10.0.0.2:6379").with_db(2))
        .read_only_commands(["MGET"])
        .max_connections(8)
        .connect_timeout_ms(0)
        .build();

    assert_eq!(config.listen_addr, "0.0.0.0:7000");
    assert_eq!(config.primary.password.as_deref(), Some("pw"));
    assert_eq!(config.replica.db, 2);
    assert_eq!(config.max_connections, 8);
    assert_eq!(config.connect_timeout(), None);

    let classifier = config.classifier().unwrap();
    assert_eq!(classifier.route_keyword(b"MGET"), Route::Replica);
    assert_eq!(classifier.route_keyword(b"GET"), Route::Primary);
}

#[test]
fn test_from_file_partial() {
    let file = write_config(
        r#"{
            "listen_addr": "127.0.0.1:9000",
            "primary": { "addr": "db1:6379", "password": "secret" },
            "read_only_commands": ["get", "mget"],
            "limits": { "max_nesting_depth": 8, "max_line_len": 4096 }
        }"#,
    );

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.listen_addr, "127.0.0.1:9000");
    assert_eq!(config.primary.addr, "db1:6379");
    assert_eq!(config.primary.password.as_deref(), Some("secret"));
    assert_eq!(config.primary.db, 0);
    // Untouched sections keep their defaults
    assert_eq!(config.replica, Config::default().replica);
    assert_eq!(config.max_connections, Config::default().max_connections);
    assert_eq!(config.limits.max_nesting_depth, 8);
    assert_eq!(config.limits.max_line_len, 4096);
    assert_eq!(config.limits.max_bulk_len, CodecLimits::default().max_bulk_len);
    assert_eq!(config.limits.max_frame_len, CodecLimits::default().max_frame_len);
    assert_eq!(config.read_only_commands, vec!["get", "mget"]);
}

#[test]
fn test_from_file_missing() {
    let result = Config::from_file("/definitely/not/here.json");
    assert!(matches!(result, Err(ProxyError::Config(_))));
}

#[test]
fn test_invalid_json() {
    let file = write_config("{ not json");
    let result = Config::from_file(file.path());
    assert!(result.unwrap_err().to_string().contains("invalid config"));
}

#[test]
fn test_validate_rejects_empty_keyword() {
    let result = Config::from_json(r#"{ "read_only_commands": ["GET", " "] }"#);
    assert!(matches!(result, Err(ProxyError::Config(_))));
}

#[test]
fn test_validate_rejects_empty_addresses() {
    let config = Config::builder().primary(BackendConfig::new("")).build();
    assert!(config.validate().is_err());

    let config = Config::builder().listen_addr(" ").build();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_zero_limits() {
    let config = Config::builder()
        .limits(CodecLimits {
            max_bulk_len: 0,
            ..CodecLimits::default()
        })
        .build();
    assert!(config.validate().is_err());

    let config = Config::builder()
        .limits(CodecLimits {
            max_frame_len: 0,
            ..CodecLimits::default()
        })
        .build();
    assert!(config.validate().is_err());

    let config = Config::builder().max_connections(0).build();
    assert!(config.validate().is_err());
}

#[test]
fn test_debug_hides_password() {
    let backend = BackendConfig::new("db:6379").with_password("hunter2");
    let shown = format!("{:?}", backend);

    assert!(shown.contains("db:6379"));
    assert!(!shown.contains("hunter2"));
}
