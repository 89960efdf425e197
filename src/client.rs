//! Client library
//!
//! Single-connection helpers for issuing one command at a time and
//! decoding its reply. No routing happens here; point it at a backend or
//! at the proxy.

use std::time::Duration;

use bytes::Bytes;

use crate::config::BackendConfig;
use crate::error::{ProxyError, Result};
use crate::network::BackendLink;
use crate::protocol::{CodecLimits, Reply};

/// Expiry option for [`Client::set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    None,

    /// `EX <seconds>`
    Seconds(u64),

    /// `PX <milliseconds>`
    Millis(u64),
}

/// Dial timeout used by [`Client::connect`]
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// A blocking client over one connection
pub struct Client {
    link: BackendLink,
}

impl Client {
    /// Connect and authenticate
    ///
    /// `password` is sent with `AUTH`, a non-zero `db` with `SELECT`.
    pub fn connect(addr: &str, password: Option<&str>, db: u32) -> Result<Self> {
        let mut backend = BackendConfig::new(addr).with_db(db);
        if let Some(password) = password {
            backend = backend.with_password(password);
        }
        Self::connect_with(&backend, Some(CONNECT_TIMEOUT))
    }

    pub fn connect_with(backend: &BackendConfig, timeout: Option<Duration>) -> Result<Self> {
        let link = BackendLink::connect(backend, &CodecLimits::default(), timeout)?;
        Ok(Self { link })
    }

    /// Send any command and return its reply
    ///
    /// Error replies come back as `Reply::Error`, not as `Err`.
    pub fn run<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<Reply> {
        self.link.execute(args)
    }

    /// `GET key`
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let reply = self.call(&[&b"GET"[..], key.as_ref()])?;
        expect_bulk("GET", reply)
    }

    /// `SET key value [EX s | PX ms]`
    pub fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        expiry: Expiry,
    ) -> Result<()> {
        let mut args: Vec<Vec<u8>> = vec![
            b"SET".to_vec(),
            key.as_ref().to_vec(),
            value.as_ref().to_vec(),
        ];
        match expiry {
            Expiry::None => {}
            Expiry::Seconds(s) => {
                args.push(b"EX".to_vec());
                args.push(s.to_string().into_bytes());
            }
            Expiry::Millis(ms) => {
                args.push(b"PX".to_vec());
                args.push(ms.to_string().into_bytes());
            }
        }

        match self.call(&args)? {
            Reply::SimpleString(_) => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// `HSET key field value`, returns the number of fields added
    pub fn hset(
        &self,
        key: impl AsRef<[u8]>,
        field: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<i64> {
        let reply = self.call(&[&b"HSET"[..], key.as_ref(), field.as_ref(), value.as_ref()])?;
        match reply {
            Reply::Integer(n) => Ok(n),
            other => Err(unexpected("HSET", &other)),
        }
    }

    /// `HGET key field`
    pub fn hget(&self, key: impl AsRef<[u8]>, field: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let reply = self.call(&[&b"HGET"[..], key.as_ref(), field.as_ref()])?;
        expect_bulk("HGET", reply)
    }

    /// `HGETALL key` as field/value pairs
    pub fn hgetall(&self, key: impl AsRef<[u8]>) -> Result<Vec<(Bytes, Bytes)>> {
        let items = match self.call(&[&b"HGETALL"[..], key.as_ref()])? {
            Reply::Array(items) => items,
            other => return Err(unexpected("HGETALL", &other)),
        };
        if items.len() % 2 != 0 {
            return Err(ProxyError::UnexpectedReply(format!(
                "HGETALL returned {} elements",
                items.len()
            )));
        }

        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            let field = expect_bulk("HGETALL", field)?.unwrap_or_default();
            let value = expect_bulk("HGETALL", value)?.unwrap_or_default();
            pairs.push((field, value));
        }
        Ok(pairs)
    }

    /// Close the connection
    pub fn close(self) {
        self.link.shutdown();
    }

    /// Run a command; an error reply becomes `Err(Upstream)`
    fn call<A: AsRef<[u8]>>(&self, args: &[A]) -> Result<Reply> {
        self.link.execute(args)?.into_result()
    }
}

fn expect_bulk(command: &str, reply: Reply) -> Result<Option<Bytes>> {
    match reply {
        Reply::BulkString(value) => Ok(value),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &str, reply: &Reply) -> ProxyError {
    ProxyError::UnexpectedReply(format!("{} got {:?}", command, reply))
}
