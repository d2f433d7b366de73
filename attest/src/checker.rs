//! The fast checker: a single-threaded write-then-read probe.
//!
//! Runs on a key disjoint from the tracked key, so it is the key's only
//! writer: every read must observe the immediately preceding write, and any
//! other observation is an instant violation. It trades completeness (it
//! cannot see violations that need multiple concurrent writers) for speed,
//! and only ever runs alongside the batch analyst, never instead of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::store::{KvConnector, KvStore, StoreError};
use crate::verdict::Violation;

/// Pause before reconnecting after a transport failure.
const RECONNECT_PAUSE: Duration = Duration::from_millis(10);

/// Single-threaded stale-read probe.
#[derive(Debug, Clone)]
pub struct FastChecker {
    key: String,
}

impl FastChecker {
    /// Create a probe for `key`, which must be disjoint from the tracked key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Write incrementing values and read each straight back until `stop` is
    /// set. Returns the number of completed probe iterations, or the
    /// violation that ended the run early.
    ///
    /// Transport failures skip the iteration and reconnect; a successful read
    /// observing anything but the just-written value (including a missing
    /// key after an acknowledged write) is conclusive.
    pub fn run<C: KvConnector>(
        &self,
        connector: &C,
        stop: &AtomicBool,
    ) -> Result<u64, Violation> {
        let mut store: Option<C::Store> = None;
        let mut counter = 0u64;
        let mut iterations = 0u64;

        while !stop.load(Ordering::SeqCst) {
            let Some(handle) = store.as_mut() else {
                match connector.connect() {
                    Ok(fresh) => store = Some(fresh),
                    Err(err) => {
                        debug!(%err, "fast checker could not connect");
                        thread::sleep(RECONNECT_PAUSE);
                    }
                }
                continue;
            };

            counter += 1;
            let value = counter.to_string();

            if let Err(err) = handle.set(&self.key, &value) {
                debug!(%err, "fast checker write failed, skipping iteration");
                store = None;
                continue;
            }

            match handle.get(&self.key) {
                Ok(observed) if observed == value => {
                    iterations += 1;
                }
                Ok(observed) => {
                    return Err(Violation::StaleRead {
                        key: self.key.clone(),
                        expected: value,
                        observed: Some(observed),
                    });
                }
                Err(StoreError::KeyNotFound { .. }) => {
                    return Err(Violation::StaleRead {
                        key: self.key.clone(),
                        expected: value,
                        observed: None,
                    });
                }
                Err(err) => {
                    debug!(%err, "fast checker read failed, skipping iteration");
                    store = None;
                }
            }
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, PoisonError};

    /// A store that faithfully applies writes.
    #[derive(Clone, Default)]
    struct FaithfulConnector {
        map: Arc<Mutex<HashMap<String, String>>>,
    }

    struct FaithfulStore {
        map: Arc<Mutex<HashMap<String, String>>>,
    }

    impl KvStore for FaithfulStore {
        fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&mut self, key: &str) -> Result<String, StoreError> {
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::key_not_found(key))
        }

        fn delete(&mut self, key: &str) -> Result<(), StoreError> {
            self.map
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| StoreError::key_not_found(key))
        }
    }

    impl KvConnector for FaithfulConnector {
        type Store = FaithfulStore;

        fn connect(&self) -> Result<FaithfulStore, StoreError> {
            Ok(FaithfulStore {
                map: Arc::clone(&self.map),
            })
        }
    }

    /// A store whose reads lag one write behind: the classic
    /// acknowledged-before-applied fault.
    #[derive(Clone, Default)]
    struct LaggyConnector;

    #[derive(Default)]
    struct LaggyStore {
        applied: Option<String>,
        acknowledged: Option<String>,
    }

    impl KvStore for LaggyStore {
        fn set(&mut self, _key: &str, value: &str) -> Result<(), StoreError> {
            self.applied = self.acknowledged.take();
            self.acknowledged = Some(value.to_string());
            Ok(())
        }

        fn get(&mut self, key: &str) -> Result<String, StoreError> {
            self.applied
                .clone()
                .ok_or_else(|| StoreError::key_not_found(key))
        }

        fn delete(&mut self, _key: &str) -> Result<(), StoreError> {
            self.applied = None;
            self.acknowledged = None;
            Ok(())
        }
    }

    impl KvConnector for LaggyConnector {
        type Store = LaggyStore;

        fn connect(&self) -> Result<LaggyStore, StoreError> {
            Ok(LaggyStore::default())
        }
    }

    #[test]
    fn test_faithful_store_never_trips_the_checker() {
        let connector = FaithfulConnector::default();
        let stop = Arc::new(AtomicBool::new(false));
        let checker = FastChecker::new("probe");

        let handle = {
            let connector = connector.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || checker.run(&connector, &stop))
        };
        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);

        let iterations = handle
            .join()
            .expect("checker thread panicked")
            .expect("faithful store must pass");
        assert!(iterations > 0);
    }

    #[test]
    fn test_lagging_store_trips_the_checker_immediately() {
        let stop = AtomicBool::new(false);
        let checker = FastChecker::new("probe");

        match checker.run(&LaggyConnector, &stop) {
            Err(Violation::StaleRead { key, expected, observed }) => {
                assert_eq!(key, "probe");
                assert_eq!(expected, "1");
                // The first acknowledged write was never applied.
                assert_eq!(observed, None);
            }
            other => panic!("expected stale read, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_value_is_reported_with_the_observation() {
        // Pre-seed the lag so the second read observes the first value.
        let stop = AtomicBool::new(false);
        let checker = FastChecker::new("probe");

        struct PreSeeded;
        impl KvConnector for PreSeeded {
            type Store = LaggyStore;

            fn connect(&self) -> Result<LaggyStore, StoreError> {
                Ok(LaggyStore {
                    applied: None,
                    acknowledged: Some("0".to_string()),
                })
            }
        }

        match checker.run(&PreSeeded, &stop) {
            Err(Violation::StaleRead { expected, observed, .. }) => {
                assert_eq!(expected, "1");
                assert_eq!(observed, Some("0".to_string()));
            }
            other => panic!("expected stale read, got {:?}", other),
        }
    }
}
