//! Blocking TCP client for the attest protocol, plus the adapters that plug
//! it into the verification engine's store traits.

use std::io::BufReader;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use attest::{KvConnector, KvStore, StoreError};

use crate::{ErrorCode, ProtoError, Request, Response, read_message, write_message};

/// Resolve a `HOST:PORT` string to a socket address.
pub fn resolve(server: &str) -> Result<SocketAddr, ProtoError> {
    server
        .to_socket_addrs()
        .map_err(|_| ProtoError::BadAddress(server.to_string()))?
        .next()
        .ok_or_else(|| ProtoError::BadAddress(server.to_string()))
}

/// One blocking connection to a store: a request/response pair per call.
#[derive(Debug)]
pub struct KvConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl KvConnection {
    /// Connect with `timeout` applied to the dial and to every subsequent
    /// read and write.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, ProtoError> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: stream,
        })
    }

    /// Send one request and wait for its response.
    pub fn call(&mut self, request: &Request) -> Result<Response, ProtoError> {
        write_message(&mut self.writer, request)?;
        read_message(&mut self.reader)
    }
}

fn transport(err: ProtoError) -> StoreError {
    match err {
        ProtoError::Codec(cause) => StoreError::protocol(cause.to_string()),
        other => StoreError::transport(other.to_string()),
    }
}

fn check(response: Response, key: &str) -> Result<Response, StoreError> {
    match response.error {
        ErrorCode::Success => Ok(response),
        ErrorCode::KeyNotFound => Err(StoreError::key_not_found(key)),
        ErrorCode::Error => Err(StoreError::protocol(response.error_text)),
    }
}

impl KvStore for KvConnection {
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let request = Request::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        check(self.call(&request).map_err(transport)?, key).map(|_| ())
    }

    fn get(&mut self, key: &str) -> Result<String, StoreError> {
        let request = Request::Get {
            key: key.to_string(),
        };
        check(self.call(&request).map_err(transport)?, key).map(|response| response.value)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        let request = Request::Delete {
            key: key.to_string(),
        };
        check(self.call(&request).map_err(transport)?, key).map(|_| ())
    }
}

/// Connector handing each verifier worker its own TCP connection.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for `addr` with a per-call `timeout`.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// The target address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl KvConnector for TcpConnector {
    type Store = KvConnection;

    fn connect(&self) -> Result<KvConnection, StoreError> {
        KvConnection::connect(self.addr, self.timeout).map_err(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_accepts_host_port() {
        let addr = resolve("127.0.0.1:9090").expect("resolves");
        assert_eq!(addr.port(), 9090);
    }

    #[test]
    fn test_resolve_rejects_garbage() {
        match resolve("not an address") {
            Err(ProtoError::BadAddress(text)) => assert_eq!(text, "not an address"),
            other => panic!("expected bad address, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_to_unreachable_address_is_a_transport_error() {
        // Port 1 on loopback is essentially never listening.
        let connector = TcpConnector::new(
            resolve("127.0.0.1:1").expect("resolves"),
            Duration::from_millis(200),
        );
        match connector.connect() {
            Err(StoreError::Transport { .. }) => {}
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
