//! The program watchdog: a ceiling on total run time.
//!
//! If the whole run exceeds its budget, the watchdog fires a caller-supplied
//! callback; the tester's callback reports a "no violation found within
//! budget" verdict and exits. A run that settles first disarms the timer.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

/// A one-shot deadline timer running on its own thread.
#[derive(Debug)]
pub struct Watchdog {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Arm the timer: unless disarmed first, `on_expire` runs on the timer
    /// thread after `timeout`. Dropping the returned handle also disarms.
    pub fn arm<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, expired) = channel::bounded::<()>(1);
        let handle = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = expired.recv_timeout(timeout) {
                on_expire();
            }
        });
        Self { cancel, handle }
    }

    /// Cancel the timer and wait for its thread to retire.
    pub fn disarm(self) {
        let _ = self.cancel.send(());
        let _ = self.handle.join();
    }
}
