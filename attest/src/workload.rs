//! Concurrent load generation against the tracked key.
//!
//! A pool of worker threads hammers one key with randomly chosen reads and
//! writes, each call bracketed by two logical-clock readings. Completed
//! operations become vertices of the shared precedence graph; the graph's
//! mutex is the only cross-worker critical section. Generation stops when
//! the target operation count is exhausted or the sending window elapses,
//! whichever comes first.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::{LogicalClock, ValueSequence};
use crate::config::WorkloadConfig;
use crate::graph::DirectedGraph;
use crate::record::{OpKind, OpRecord};
use crate::store::{KvConnector, KvStore, StoreError};

/// The known initial value written before load generation starts. Disjoint
/// from generated values, which are decimal counters.
pub const INITIAL_VALUE: &str = "init";

/// Pause between retries of the initialization write/read loop.
const SETUP_RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Load generation failed before any verdict was possible.
#[derive(Debug)]
pub enum WorkloadError {
    /// The initial write/read never succeeded; there is no known starting
    /// state to verify against.
    Setup(StoreError),
    /// A worker thread panicked.
    Internal(String),
}

impl fmt::Display for WorkloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadError::Setup(err) => write!(f, "initialization failed: {}", err),
            WorkloadError::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for WorkloadError {}

/// The collected history of one sending phase.
#[derive(Debug)]
pub struct WorkloadReport {
    /// One vertex per successful operation, plus the synthetic initial write.
    pub graph: DirectedGraph<OpRecord>,
    /// Operation attempts issued, successful or not.
    pub attempted: u64,
    /// Vertices actually recorded.
    pub recorded: usize,
    /// Wall time of the whole phase including initialization.
    pub elapsed: Duration,
}

/// The concurrent load generator.
#[derive(Debug, Clone)]
pub struct Workload {
    config: WorkloadConfig,
}

impl Workload {
    /// Create a generator from a validated configuration.
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Run the sending phase to completion and hand back the filled graph.
    pub fn run<C: KvConnector>(&self, connector: &C) -> Result<WorkloadReport, WorkloadError> {
        let started = Instant::now();
        let clock = LogicalClock::new();
        let values = ValueSequence::new();

        let initial = self.initialize(connector, &clock)?;
        let mut history = DirectedGraph::new();
        history.add_vertex(initial);

        let graph = Mutex::new(history);
        let stop = AtomicBool::new(false);
        let remaining = AtomicU64::new(self.config.max_ops);
        let attempted = AtomicU64::new(0);
        let base_seed = self.config.seed.unwrap_or_else(rand::random);

        info!(
            workers = self.config.workers,
            max_ops = self.config.max_ops,
            send_window_secs = self.config.send_window.as_secs_f64(),
            "sending requests"
        );

        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let scope_result = crossbeam::scope(|s| {
            let graph = &graph;
            let stop = &stop;
            let remaining = &remaining;
            let attempted = &attempted;
            let clock = &clock;
            let values = &values;
            let key = self.config.key.as_str();

            for worker in 0..self.config.workers {
                let rng = StdRng::seed_from_u64(base_seed.wrapping_add(worker as u64));
                let done = done_tx.clone();
                s.spawn(move |_| {
                    // Held for the worker's lifetime; the timer thread sees a
                    // disconnect once every worker has exited.
                    let _done = done;
                    run_worker(connector, key, rng, graph, stop, remaining, attempted, clock, values);
                });
            }
            drop(done_tx);

            let send_window = self.config.send_window;
            s.spawn(move |_| match done_rx.recv_timeout(send_window) {
                Err(RecvTimeoutError::Timeout) => {
                    stop.store(true, Ordering::SeqCst);
                    info!("sending window elapsed, stopping workers");
                }
                // Disconnected: every worker already finished on its own.
                _ => {}
            });
        });
        scope_result
            .map_err(|_| WorkloadError::Internal("worker thread panicked".to_string()))?;

        let graph = graph
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let recorded = graph.len();
        let attempted = attempted.into_inner();
        info!(recorded, attempted, "collected history");

        Ok(WorkloadReport {
            graph,
            attempted,
            recorded,
            elapsed: started.elapsed(),
        })
    }

    /// Fix a deterministic starting state: write the known initial value and
    /// poll-read until it is observed, retrying any failure until the setup
    /// budget runs out. Returns the synthetic record for the initial write.
    fn initialize<C: KvConnector>(
        &self,
        connector: &C,
        clock: &LogicalClock,
    ) -> Result<OpRecord, WorkloadError> {
        let deadline = Instant::now() + self.config.setup_timeout;
        let start = clock.tick();
        let mut last_error = StoreError::transport("initialization never attempted");

        info!(key = %self.config.key, "setting initial value for tracked key");
        loop {
            if Instant::now() >= deadline {
                return Err(WorkloadError::Setup(last_error));
            }
            let mut store = match connector.connect() {
                Ok(store) => store,
                Err(err) => {
                    last_error = err;
                    thread::sleep(SETUP_RETRY_PAUSE);
                    continue;
                }
            };
            if let Err(err) = store.set(&self.config.key, INITIAL_VALUE) {
                last_error = err;
                thread::sleep(SETUP_RETRY_PAUSE);
                continue;
            }
            loop {
                if Instant::now() >= deadline {
                    return Err(WorkloadError::Setup(last_error));
                }
                match store.get(&self.config.key) {
                    Ok(value) if value == INITIAL_VALUE => {
                        let end = clock.tick();
                        info!("initialization completed");
                        return Ok(OpRecord::write(start, end, INITIAL_VALUE));
                    }
                    Ok(_) => {
                        last_error = StoreError::protocol("initial value not yet observed");
                        thread::sleep(SETUP_RETRY_PAUSE);
                    }
                    Err(err) => {
                        last_error = err;
                        break;
                    }
                }
            }
        }
    }
}

/// Claim one operation ticket, if any remain.
fn take_ticket(remaining: &AtomicU64) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[allow(clippy::too_many_arguments)]
fn run_worker<C: KvConnector>(
    connector: &C,
    key: &str,
    mut rng: StdRng,
    graph: &Mutex<DirectedGraph<OpRecord>>,
    stop: &AtomicBool,
    remaining: &AtomicU64,
    attempted: &AtomicU64,
    clock: &LogicalClock,
    values: &ValueSequence,
) {
    let mut store = match connector.connect() {
        Ok(store) => store,
        Err(err) => {
            warn!(%err, "worker could not connect, exiting");
            return;
        }
    };

    while !stop.load(Ordering::SeqCst) && take_ticket(remaining) {
        attempted.fetch_add(1, Ordering::SeqCst);

        let is_write = rng.gen_bool(0.5);
        let start = clock.tick();
        let result = if is_write {
            let value = values.next_value();
            store.set(key, &value).map(|()| (OpKind::Write, value))
        } else {
            store.get(key).map(|value| (OpKind::Read, value))
        };
        let end = clock.tick();

        match result {
            Ok((kind, value)) => {
                let record = OpRecord {
                    start,
                    end,
                    value,
                    kind,
                };
                debug!(%record, "recorded");
                graph
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .add_vertex(record);
            }
            Err(err) => {
                debug!(%err, "discarding failed attempt");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Shared in-memory store with optional randomized per-call delays.
    #[derive(Clone)]
    struct FakeConnector {
        map: Arc<Mutex<HashMap<String, String>>>,
        max_delay: Duration,
        next_seed: Arc<AtomicU64>,
    }

    impl FakeConnector {
        fn new(max_delay: Duration) -> Self {
            Self {
                map: Arc::new(Mutex::new(HashMap::new())),
                max_delay,
                next_seed: Arc::new(AtomicU64::new(1)),
            }
        }
    }

    struct FakeStore {
        map: Arc<Mutex<HashMap<String, String>>>,
        max_delay: Duration,
        rng: StdRng,
    }

    impl FakeStore {
        fn pause(&mut self) {
            if !self.max_delay.is_zero() {
                let micros = self.rng.gen_range(0..self.max_delay.as_micros() as u64);
                thread::sleep(Duration::from_micros(micros));
            }
        }
    }

    impl KvStore for FakeStore {
        fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.pause();
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&mut self, key: &str) -> Result<String, StoreError> {
            self.pause();
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::key_not_found(key))
        }

        fn delete(&mut self, key: &str) -> Result<(), StoreError> {
            self.pause();
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| StoreError::key_not_found(key))
        }
    }

    impl KvConnector for FakeConnector {
        type Store = FakeStore;

        fn connect(&self) -> Result<FakeStore, StoreError> {
            let seed = self.next_seed.fetch_add(1, Ordering::SeqCst);
            Ok(FakeStore {
                map: Arc::clone(&self.map),
                max_delay: self.max_delay,
                rng: StdRng::seed_from_u64(seed),
            })
        }
    }

    /// Connector whose every connection attempt is refused.
    struct RefusingConnector;

    impl KvConnector for RefusingConnector {
        type Store = FakeStore;

        fn connect(&self) -> Result<FakeStore, StoreError> {
            Err(StoreError::transport("connection refused"))
        }
    }

    fn config(workers: usize, max_ops: u64) -> WorkloadConfig {
        WorkloadConfig {
            workers,
            max_ops,
            send_window: Duration::from_secs(30),
            setup_timeout: Duration::from_secs(5),
            key: "test".to_string(),
            seed: Some(42),
        }
    }

    #[test]
    fn test_every_successful_operation_becomes_one_vertex() {
        // Repeated runs with randomized scheduling delays: the vertex count
        // must be exactly the attempt count plus the synthetic initial write.
        for seed in [1u64, 2, 3] {
            let connector = FakeConnector::new(Duration::from_micros(300));
            let mut cfg = config(8, 200);
            cfg.seed = Some(seed);
            let workload = Workload::new(cfg);

            let report = workload.run(&connector).expect("workload must complete");
            assert_eq!(report.attempted, 200);
            assert_eq!(report.recorded, 201);
            assert_eq!(report.graph.len(), 201);
        }
    }

    #[test]
    fn test_first_vertex_is_the_initial_write() {
        let connector = FakeConnector::new(Duration::ZERO);
        let workload = Workload::new(config(2, 20));
        let report = workload.run(&connector).expect("workload must complete");

        let first = report.graph.vertex_ids().next().expect("graph is non-empty");
        let record = report.graph.value(first);
        assert_eq!(record.kind, OpKind::Write);
        assert_eq!(record.value, INITIAL_VALUE);
        assert!(record.start < record.end);
    }

    #[test]
    fn test_deadline_stops_workers_before_count() {
        let connector = FakeConnector::new(Duration::from_millis(5));
        let mut cfg = config(2, 1_000_000);
        cfg.send_window = Duration::from_millis(100);
        let workload = Workload::new(cfg);

        let report = workload.run(&connector).expect("workload must complete");
        // Two workers at ~2.5 ms per call cannot get anywhere near the
        // ticket count inside a 100 ms window.
        assert!(report.recorded < 1000);
        assert!(report.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn test_unreachable_store_is_a_fatal_setup_error() {
        let mut cfg = config(2, 10);
        cfg.setup_timeout = Duration::from_millis(50);
        let workload = Workload::new(cfg);

        match workload.run(&RefusingConnector) {
            Err(WorkloadError::Setup(StoreError::Transport { .. })) => {}
            other => panic!("expected setup failure, got {:?}", other),
        }
    }
}
