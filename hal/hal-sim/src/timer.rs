//! Host time base.

use std::thread;
use std::time::{Duration, Instant};

use chimera::timer::DriverRegistry;
use chimera::Status;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

static EPOCH: Lazy<RwLock<Instant>> = Lazy::new(|| RwLock::new(Instant::now()));

fn millis() -> u64 {
    let elapsed = EPOCH.read().elapsed().as_millis();
    u64::try_from(elapsed).unwrap_or(u64::MAX)
}

fn delay_milliseconds(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

fn delay_microseconds(us: u64) {
    thread::sleep(Duration::from_micros(us));
}

fn initialize() -> Status {
    Lazy::force(&EPOCH);
    Status::OK
}

/// Restarts the millisecond count from zero.
fn reset() -> Status {
    *EPOCH.write() = Instant::now();
    Status::OK
}

/// Registration hook for the timer facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.millis = Some(millis);
    registry.delay_milliseconds = Some(delay_milliseconds);
    registry.delay_microseconds = Some(delay_microseconds);
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_is_monotonic() {
        let before = millis();
        delay_milliseconds(15);
        let after = millis();
        assert!(after >= before + 15, "{before} -> {after}");
    }
}
