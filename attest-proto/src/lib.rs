//! Wire schema for the attest key-value protocol.
//!
//! Messages are newline-delimited JSON over TCP: one [`Request`] per line from
//! the client, one [`Response`] per line from the server. The response triple
//! (value, error code, error text) is deliberately flat so that any client can
//! check `error` without decoding further structure.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;

pub use client::{KvConnection, TcpConnector, resolve};

/// A protocol-level failure: transport, codec, or an orderly close.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Underlying socket failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The peer sent something that does not decode.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The server string did not resolve to an address.
    #[error("invalid server address '{0}'")]
    BadAddress(String),
}

/// A client request against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Write `value` under `key`.
    Set { key: String, value: String },
    /// Read the value under `key`.
    Get { key: String },
    /// Remove `key`.
    Delete { key: String },
}

/// Outcome class of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The operation was applied.
    Success,
    /// The key does not exist.
    KeyNotFound,
    /// Anything else; see the error text.
    Error,
}

impl ErrorCode {
    /// Numeric code, also used as a process exit status by the one-shot
    /// client.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::KeyNotFound => 1,
            ErrorCode::Error => 2,
        }
    }
}

/// The server's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The value read; empty for writes and deletes.
    pub value: String,
    /// Outcome class.
    pub error: ErrorCode,
    /// Human-readable detail for non-success outcomes; empty otherwise.
    pub error_text: String,
}

impl Response {
    /// A successful response carrying `value` (possibly empty).
    pub fn ok(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            error: ErrorCode::Success,
            error_text: String::new(),
        }
    }

    /// A key-not-found response named after the operation that failed.
    pub fn key_not_found(operation: &str, key: &str) -> Self {
        Self {
            value: String::new(),
            error: ErrorCode::KeyNotFound,
            error_text: format!("{}: key '{}' not found", operation, key),
        }
    }

    /// A generic error response.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            value: String::new(),
            error: ErrorCode::Error,
            error_text: text.into(),
        }
    }
}

/// Write one message as a single JSON line and flush.
pub fn write_message<W: Write, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtoError> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one JSON line and decode it. EOF is an orderly close.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtoError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(ProtoError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}
