#![allow(clippy::result_large_err)]

//! # Attest - Atomicity Verification for Key-Value Stores
//!
//! Attest drives concurrent read/write traffic against a remote key-value
//! object, records each operation's logical-clock window and observed value,
//! and then decides - via a precedence-graph construction and cycle
//! detection - whether the recorded history could have arisen from *any*
//! valid total order of operations. If no such order exists, the store is
//! provably non-atomic.
//!
//! The engine is store-agnostic: anything implementing [`KvConnector`] and
//! [`KvStore`] can be verified, from the bundled TCP client in
//! `attest-proto` to an in-memory fake.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use attest::{KvConnector, KvStore, RunConfig, StoreError, WorkloadConfig};
//!
//! // A trivially correct in-memory store.
//! #[derive(Clone, Default)]
//! struct Memory(Arc<Mutex<HashMap<String, String>>>);
//!
//! impl KvStore for Memory {
//!     fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
//!         self.0.lock().unwrap().insert(key.into(), value.into());
//!         Ok(())
//!     }
//!     fn get(&mut self, key: &str) -> Result<String, StoreError> {
//!         self.0.lock().unwrap().get(key).cloned()
//!             .ok_or_else(|| StoreError::key_not_found(key))
//!     }
//!     fn delete(&mut self, key: &str) -> Result<(), StoreError> {
//!         self.0.lock().unwrap().remove(key).map(|_| ())
//!             .ok_or_else(|| StoreError::key_not_found(key))
//!     }
//! }
//!
//! impl KvConnector for Memory {
//!     type Store = Memory;
//!     fn connect(&self) -> Result<Memory, StoreError> {
//!         Ok(self.clone())
//!     }
//! }
//!
//! let config = RunConfig {
//!     workload: WorkloadConfig {
//!         workers: 4,
//!         max_ops: 500,
//!         send_window: Duration::from_secs(5),
//!         ..WorkloadConfig::default()
//!     },
//!     ..RunConfig::default()
//! };
//! let outcome = attest::verify(&Memory::default(), &config).unwrap();
//! assert!(!outcome.verdict.is_violation());
//! ```

// Public modules
pub mod analyst;
pub mod checker;
pub mod clock;
pub mod config;
pub mod graph;
pub mod record;
pub mod runner;
pub mod store;
pub mod verdict;
pub mod watchdog;
pub mod workload;

// Re-export the main public API
pub use analyst::{AnalysisReport, ConsistencyAnalyst};
pub use checker::FastChecker;
pub use clock::{LogicalClock, ValueSequence};
pub use config::{ConfigError, RunConfig, WorkloadConfig};
pub use graph::{
    CycleDetected, DfsVisitor, DirectedGraph, NoopVisitor, VertexId, VisitState, VisitTable,
};
pub use record::{OpKind, OpRecord};
pub use runner::verify;
pub use store::{KvConnector, KvStore, StoreError};
pub use verdict::{
    EXIT_INCONCLUSIVE, EXIT_NO_VIOLATION, EXIT_SETUP_FAILURE, EXIT_VIOLATION, RunError,
    RunOutcome, Verdict, Violation,
};
pub use watchdog::Watchdog;
pub use workload::{INITIAL_VALUE, Workload, WorkloadError, WorkloadReport};
