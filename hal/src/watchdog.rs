//! Watchdog facade.

use std::sync::Arc;
use std::time::Duration;

use chimera_threading::Lockable;

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::Status;

/// Watchdog instance.
pub type Channel = u8;

/// One watchdog timer.
pub trait Driver: Lockable + Send + Sync {
    /// Sets the timeout window.
    ///
    /// Returns `TIMEOUT_OUT_OF_RANGE` if the hardware cannot express
    /// `timeout`.
    fn configure(&self, timeout: Duration) -> Status;

    fn start(&self) -> Status;

    fn stop(&self) -> Status;

    /// Restarts the countdown.
    fn kick(&self) -> Status;

    /// Configured timeout window.
    fn timeout(&self) -> Duration;
}

pub type DriverHandle = Arc<dyn Driver>;

driver_registry! {
    /// Watchdog capability record.
    pub struct DriverRegistry {
        pub get_driver: fn(Channel) -> Option<DriverHandle>,
        /// Forces an immediate watchdog reset
        pub invoke_timeout: fn(),
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("watchdog", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

pub fn get_driver(channel: Channel) -> Option<DriverHandle> {
    FACADE.entry(|r| r.get_driver).and_then(|get| get(channel))
}

/// Trips the watchdog on purpose.
pub fn invoke_timeout() -> Status {
    match FACADE.entry(|r| r.invoke_timeout) {
        Some(invoke) => {
            invoke();
            Status::OK
        }
        None => Status::NOT_SUPPORTED,
    }
}

pub fn is_supported() -> bool {
    FACADE.is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::FACADE_LOCK;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TRIPS: AtomicUsize = AtomicUsize::new(0);

    fn trip() {
        TRIPS.fetch_add(1, Ordering::SeqCst);
    }

    fn init_ok() -> Status {
        Status::OK
    }

    fn trip_only(registry: &mut DriverRegistry) -> Status {
        registry.is_supported = true;
        registry.initialize = Some(init_ok);
        registry.invoke_timeout = Some(trip);
        Status::OK
    }

    #[test]
    fn invoke_timeout_dispatches() {
        let _serial = FACADE_LOCK.lock();
        backend::uninstall();
        assert_eq!(invoke_timeout(), Status::NOT_SUPPORTED);

        backend::install(trip_only);
        assert_eq!(initialize(), Status::OK);
        let before = TRIPS.load(Ordering::SeqCst);
        assert_eq!(invoke_timeout(), Status::OK);
        assert_eq!(TRIPS.load(Ordering::SeqCst), before + 1);
        assert!(get_driver(0).is_none());

        backend::uninstall();
    }
}
