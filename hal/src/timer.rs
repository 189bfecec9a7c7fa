//! Timer facade: system time base and timer type definitions.

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::Status;

/// Counter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Counts up from min, overflows, then starts again
    #[default]
    CountUp,
    /// Counts down from max, underflows, then starts again
    CountDown,
    /// Alternates between counting up and down
    CountUpDown,
}

/// What a timer channel is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Function {
    #[default]
    Invalid,
    InputCapture,
    OutputCompare,
    PwmOutput,
    OnePulseOutput,
    Encoder,
}

/// Timer peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Peripheral {
    #[default]
    Timer1,
    Timer2,
    Timer3,
    Timer4,
    Timer5,
    Timer6,
    Timer7,
    Timer8,
    Timer9,
    Timer10,
    Timer11,
    Timer12,
    Timer13,
    Timer14,
    Timer15,
    Timer16,
    LpTimer1,
    LpTimer2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Invalid,
    Channel1,
    Channel2,
    Channel3,
    Channel4,
    Channel5,
    Channel6,
}

/// Timer peripheral configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverConfig {
    pub validity: bool,
    /// Allow the config to rewrite the whole peripheral, which several
    /// channels may share
    pub overwrite: bool,
    pub peripheral: Peripheral,
    pub count_direction: Direction,
    /// Loaded when the counter wraps
    pub reload_value: u32,
}

pub mod pwm {
    use super::{Channel, Peripheral};

    /// Output level while the signal is asserted
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub enum Polarity {
        #[default]
        ActiveHigh,
        ActiveLow,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Config {
        pub peripheral: Peripheral,
        pub output_channel: Channel,
        /// Initial duty cycle in percent
        pub duty_cycle: u8,
        /// Initial output frequency in Hz
        pub frequency: u32,
        pub polarity: Polarity,
        pub validity: bool,
    }
}

driver_registry! {
    /// Timer capability record.
    pub struct DriverRegistry {
        /// Milliseconds since the backend came up
        pub millis: fn() -> u64,
        pub delay_milliseconds: fn(u64),
        pub delay_microseconds: fn(u64),
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("timer", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

/// Milliseconds elapsed on the system time base, `None` if unbacked.
pub fn millis() -> Option<u64> {
    FACADE.entry(|r| r.millis).map(|millis| millis())
}

/// Blocks the caller for `ms` milliseconds.
pub fn delay_milliseconds(ms: u64) -> Status {
    match FACADE.entry(|r| r.delay_milliseconds) {
        Some(delay) => {
            delay(ms);
            Status::OK
        }
        None => Status::NOT_SUPPORTED,
    }
}

/// Blocks the caller for `us` microseconds.
pub fn delay_microseconds(us: u64) -> Status {
    match FACADE.entry(|r| r.delay_microseconds) {
        Some(delay) => {
            delay(us);
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
    use std::sync::atomic::{AtomicU64, Ordering};

    static SLEPT_US: AtomicU64 = AtomicU64::new(0);

    fn fixed_clock() -> u64 {
        1234
    }

    fn record_delay_us(us: u64) {
        SLEPT_US.fetch_add(us, Ordering::SeqCst);
    }

    fn init_ok() -> Status {
        Status::OK
    }

    fn clock_only(registry: &mut DriverRegistry) -> Status {
        registry.is_supported = true;
        registry.initialize = Some(init_ok);
        registry.millis = Some(fixed_clock);
        registry.delay_microseconds = Some(record_delay_us);
        Status::OK
    }

    #[test]
    fn time_base_dispatch() {
        let _serial = FACADE_LOCK.lock();
        backend::uninstall();
        assert_eq!(millis(), None);
        assert_eq!(delay_microseconds(5), Status::NOT_SUPPORTED);

        backend::install(clock_only);
        assert_eq!(initialize(), Status::OK);
        assert_eq!(millis(), Some(1234));

        let before = SLEPT_US.load(Ordering::SeqCst);
        assert_eq!(delay_microseconds(50), Status::OK);
        assert_eq!(SLEPT_US.load(Ordering::SeqCst), before + 50);
        assert_eq!(delay_milliseconds(1), Status::NOT_SUPPORTED);

        backend::uninstall();
    }
}
