//! In-memory reference server for the attest protocol.
//!
//! The normal mode applies every operation under one lock and is atomic by
//! construction. The faulty mode acknowledges writes *before* applying them,
//! handing the application to a detached thread that sleeps a random delay
//! first — an easy-to-observe atomicity violation, and the intended target
//! for demonstrating what the verifier catches.

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use attest_proto::{ProtoError, Request, Response, read_message, write_message};
use rand::Rng;
use tracing::{debug, info, warn};

/// Bounds of the artificial apply delay in faulty mode.
#[derive(Debug, Clone, Copy)]
pub struct FaultDelay {
    /// Minimum delay before an acknowledged write is applied.
    pub min: Duration,
    /// Maximum delay (exclusive).
    pub max: Duration,
}

impl FaultDelay {
    /// Delay bounds in milliseconds.
    pub fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..self.max)
    }
}

/// The shared key-value state behind every connection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
    fault: Option<FaultDelay>,
}

impl MemoryStore {
    /// A store that applies operations atomically.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that acknowledges writes before applying them after a random
    /// delay.
    pub fn faulty(delay: FaultDelay) -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
            fault: Some(delay),
        }
    }

    /// Serve one request.
    pub fn apply(&self, request: Request) -> Response {
        match request {
            Request::Set { key, value } => self.set(key, value),
            Request::Get { key } => self.get(&key),
            Request::Delete { key } => self.delete(&key),
        }
    }

    fn set(&self, key: String, value: String) -> Response {
        info!(%key, %value, "kvset");
        match self.fault {
            Some(delay) => {
                let map = Arc::clone(&self.map);
                let pause = delay.sample();
                thread::spawn(move || {
                    thread::sleep(pause);
                    map.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(key, value);
                });
            }
            None => {
                self.map
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, value);
            }
        }
        Response::ok("")
    }

    fn get(&self, key: &str) -> Response {
        let value = self
            .map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        match value {
            Some(value) => {
                info!(%key, %value, "kvget");
                Response::ok(value)
            }
            None => {
                warn!(%key, "kvget: key not found");
                Response::key_not_found("kvget", key)
            }
        }
    }

    fn delete(&self, key: &str) -> Response {
        info!(%key, "kvdelete");
        let removed = self
            .map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(_) => Response::ok(""),
            None => Response::key_not_found("kvdelete", key),
        }
    }
}

/// Accepts connections and serves each on its own thread.
#[derive(Debug)]
pub struct KvServer {
    listener: TcpListener,
    store: MemoryStore,
}

impl KvServer {
    /// Bind `addr` and prepare to serve `store`.
    pub fn bind(addr: impl ToSocketAddrs, store: MemoryStore) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            store,
        })
    }

    /// The bound address; useful after binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until the listener fails.
    pub fn run(self) -> std::io::Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let store = self.store.clone();
                    thread::spawn(move || {
                        if let Err(err) = serve_connection(stream, store) {
                            debug!(%err, "connection ended");
                        }
                    });
                }
                Err(err) => warn!(%err, "accept failed"),
            }
        }
        Ok(())
    }
}

fn serve_connection(stream: TcpStream, store: MemoryStore) -> Result<(), ProtoError> {
    let peer = stream.peer_addr()?;
    debug!(%peer, "client connected");

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    loop {
        let request: Request = match read_message(&mut reader) {
            Ok(request) => request,
            Err(ProtoError::ConnectionClosed) => {
                debug!(%peer, "client disconnected");
                return Ok(());
            }
            Err(ProtoError::Codec(err)) => {
                let response = Response::error(format!("malformed request: {}", err));
                write_message(&mut writer, &response)?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let response = store.apply(request);
        write_message(&mut writer, &response)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_proto::ErrorCode;

    #[test]
    fn test_set_then_get_round_trips() {
        let store = MemoryStore::new();
        let set = store.apply(Request::Set {
            key: "k".to_string(),
            value: "v".to_string(),
        });
        assert_eq!(set.error, ErrorCode::Success);

        let get = store.apply(Request::Get {
            key: "k".to_string(),
        });
        assert_eq!(get.error, ErrorCode::Success);
        assert_eq!(get.value, "v");
    }

    #[test]
    fn test_missing_key_reports_not_found() {
        let store = MemoryStore::new();
        let get = store.apply(Request::Get {
            key: "absent".to_string(),
        });
        assert_eq!(get.error, ErrorCode::KeyNotFound);
        assert!(get.error_text.contains("absent"));

        let del = store.apply(Request::Delete {
            key: "absent".to_string(),
        });
        assert_eq!(del.error, ErrorCode::KeyNotFound);
    }

    #[test]
    fn test_delete_removes_the_key() {
        let store = MemoryStore::new();
        store.apply(Request::Set {
            key: "k".to_string(),
            value: "v".to_string(),
        });
        let del = store.apply(Request::Delete {
            key: "k".to_string(),
        });
        assert_eq!(del.error, ErrorCode::Success);
        let get = store.apply(Request::Get {
            key: "k".to_string(),
        });
        assert_eq!(get.error, ErrorCode::KeyNotFound);
    }

    #[test]
    fn test_faulty_store_acknowledges_before_applying() {
        let store = MemoryStore::faulty(FaultDelay::from_millis(30, 60));
        let set = store.apply(Request::Set {
            key: "k".to_string(),
            value: "v".to_string(),
        });
        assert_eq!(set.error, ErrorCode::Success);

        // The write is acknowledged but not yet visible.
        let early = store.apply(Request::Get {
            key: "k".to_string(),
        });
        assert_eq!(early.error, ErrorCode::KeyNotFound);

        // After the delay window it must land.
        thread::sleep(Duration::from_millis(200));
        let late = store.apply(Request::Get {
            key: "k".to_string(),
        });
        assert_eq!(late.error, ErrorCode::Success);
        assert_eq!(late.value, "v");
    }
}
