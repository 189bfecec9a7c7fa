//! Simulated independent watchdog.
//!
//! Nothing resets the process. The watchdog only records that it would have
//! fired, which tests observe through [`SimWatchdog::expired`] and
//! [`timeouts_invoked`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chimera::status::watchdog as codes;
use chimera::watchdog::{Channel, Driver, DriverHandle, DriverRegistry};
use chimera::Status;
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::{info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Shortest window the simulated hardware accepts.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Longest window the simulated hardware accepts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(32);

static WATCHDOG: Lazy<Arc<SimWatchdog>> = Lazy::new(|| Arc::new(SimWatchdog::new()));

static TIMEOUTS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Countdown {
    timeout: Duration,
    running: bool,
    last_kick: Instant,
}

/// Simulated watchdog
#[derive(Debug)]
pub struct SimWatchdog {
    mutex: RecursiveTimedMutex,
    countdown: Mutex<Countdown>,
    kicks: AtomicUsize,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self {
            mutex: RecursiveTimedMutex::new(),
            countdown: Mutex::new(Countdown {
                timeout: MAX_TIMEOUT,
                running: false,
                last_kick: Instant::now(),
            }),
            kicks: AtomicUsize::new(0),
        }
    }

    /// Kicks since creation.
    pub fn kicks(&self) -> usize {
        self.kicks.load(Ordering::SeqCst)
    }

    /// True if running and not kicked within the timeout window.
    pub fn expired(&self) -> bool {
        let countdown = self.countdown.lock();
        countdown.running && countdown.last_kick.elapsed() > countdown.timeout
    }
}

impl Default for SimWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for SimWatchdog {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl Driver for SimWatchdog {
    fn configure(&self, timeout: Duration) -> Status {
        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&timeout) {
            return codes::TIMEOUT_OUT_OF_RANGE;
        }
        let _guard = self.lock_guard();
        self.countdown.lock().timeout = timeout;
        Status::OK
    }

    fn start(&self) -> Status {
        let _guard = self.lock_guard();
        let mut countdown = self.countdown.lock();
        countdown.running = true;
        countdown.last_kick = Instant::now();
        info!("watchdog: started with {:?} window", countdown.timeout);
        Status::OK
    }

    fn stop(&self) -> Status {
        let _guard = self.lock_guard();
        self.countdown.lock().running = false;
        Status::OK
    }

    fn kick(&self) -> Status {
        let mut countdown = self.countdown.lock();
        if !countdown.running {
            return Status::NOT_READY;
        }
        countdown.last_kick = Instant::now();
        self.kicks.fetch_add(1, Ordering::SeqCst);
        Status::OK
    }

    fn timeout(&self) -> Duration {
        self.countdown.lock().timeout
    }
}

/// Number of forced timeouts requested through the facade.
pub fn timeouts_invoked() -> usize {
    TIMEOUTS.load(Ordering::SeqCst)
}

fn get_driver(channel: Channel) -> Option<DriverHandle> {
    (channel == 0).then(|| Arc::clone(&WATCHDOG) as DriverHandle)
}

fn invoke_timeout() {
    warn!("watchdog: forced timeout, a real target would reset here");
    TIMEOUTS.fetch_add(1, Ordering::SeqCst);
}

fn initialize() -> Status {
    Lazy::force(&WATCHDOG);
    Status::OK
}

fn reset() -> Status {
    WATCHDOG.stop()
}

/// Registration hook for the watchdog facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.get_driver = Some(get_driver);
    registry.invoke_timeout = Some(invoke_timeout);
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn window_bounds() {
        let dog = SimWatchdog::new();
        assert_eq!(dog.configure(Duration::ZERO), codes::TIMEOUT_OUT_OF_RANGE);
        assert_eq!(dog.configure(Duration::from_secs(60)), codes::TIMEOUT_OUT_OF_RANGE);
        assert_eq!(dog.configure(Duration::from_millis(100)), Status::OK);
        assert_eq!(dog.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn expires_without_kicks() {
        let dog = SimWatchdog::new();
        assert_eq!(dog.kick(), Status::NOT_READY);
        assert_eq!(dog.configure(Duration::from_millis(10)), Status::OK);
        assert_eq!(dog.start(), Status::OK);
        assert_eq!(dog.kick(), Status::OK);
        assert!(!dog.expired());

        thread::sleep(Duration::from_millis(30));
        assert!(dog.expired());
        assert_eq!(dog.kick(), Status::OK);
        assert!(!dog.expired());
        assert_eq!(dog.kicks(), 2);

        dog.stop();
        thread::sleep(Duration::from_millis(30));
        assert!(!dog.expired());
    }
}
