//! The engine's view of the system under test.
//!
//! The verifier drives any store reachable through these two traits: a
//! [`KvConnector`] hands each worker thread its own [`KvStore`] handle, and
//! every call either succeeds or reports a [`StoreError`] the caller treats
//! as a discarded attempt. The wire client in `attest-proto` implements both;
//! tests substitute in-memory fakes.

use std::fmt;

/// A non-success outcome of a store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store answered, but the key does not exist.
    KeyNotFound { key: String },
    /// The call never completed: connection refused, timeout, broken pipe.
    Transport { message: String },
    /// The store answered with something the protocol does not allow.
    Protocol { message: String },
}

impl StoreError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a key-not-found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::KeyNotFound { key } => write!(f, "key '{}' not found", key),
            StoreError::Transport { message } => write!(f, "transport error: {}", message),
            StoreError::Protocol { message } => write!(f, "protocol error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Blocking operations against one tracked key-value object.
pub trait KvStore {
    /// Write `value` under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read the value under `key`.
    fn get(&mut self, key: &str) -> Result<String, StoreError>;

    /// Remove `key`.
    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Factory yielding one store handle per worker thread.
///
/// Mirrors the one-connection-per-worker structure of the load generator:
/// handles are not shared, so implementations need no interior locking of
/// their own transport.
pub trait KvConnector: Send + Sync {
    /// The store handle type produced by this connector.
    type Store: KvStore + Send;

    /// Open a fresh handle.
    fn connect(&self) -> Result<Self::Store, StoreError>;
}
