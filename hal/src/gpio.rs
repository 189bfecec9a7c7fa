//! GPIO facade.

use std::sync::Arc;

use chimera_threading::Lockable;

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::Status;

/// Pin number on a port.
pub type Pin = u16;

/// GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Port {
    #[default]
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
}

impl Port {
    pub const ALL: [Port; 12] = [
        Port::A,
        Port::B,
        Port::C,
        Port::D,
        Port::E,
        Port::F,
        Port::G,
        Port::H,
        Port::I,
        Port::J,
        Port::K,
        Port::L,
    ];
}

/// Pin drive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Drive {
    #[default]
    Input,
    OutputPushPull,
    OutputOpenDrain,
    AlternatePushPull,
    AlternateOpenDrain,
    Analog,
    /// High impedance
    HiZ,
}

/// Logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Low,
    High,
}

impl State {
    pub const ON: State = State::High;
    pub const OFF: State = State::Low;

    /// The opposite level.
    pub fn toggled(self) -> State {
        match self {
            State::Low => State::High,
            State::High => State::Low,
        }
    }
}

impl From<bool> for State {
    fn from(high: bool) -> Self {
        if high {
            State::High
        } else {
            State::Low
        }
    }
}

/// Pull resistor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pull {
    #[default]
    NoPull,
    PullUp,
    PullDown,
}

/// Pin initialization record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinInit {
    /// Pull-up/down configuration
    pub pull: Pull,
    /// Pin IO port
    pub port: Port,
    /// Pin IO drive type
    pub drive: Drive,
    /// Logic level applied on init
    pub state: State,
    /// Pin number on the port
    pub pin: Pin,
    /// Board-specific alternate function selector
    pub alternate: u32,
    /// Set once the record has been filled in
    pub validity: bool,
}

/// A single GPIO pin.
pub trait Driver: Lockable + Send + Sync {
    /// Applies `init`. Fails with `INVAL_FUNC_PARAM` if it is not valid.
    fn init(&self, init: &PinInit) -> Status;

    fn set_mode(&self, drive: Drive, pull: Pull) -> Status;

    fn set_state(&self, state: State) -> Status;

    fn get_state(&self) -> Result<State, Status>;

    fn toggle(&self) -> Status {
        match self.get_state() {
            Ok(state) => self.set_state(state.toggled()),
            Err(status) => status,
        }
    }
}

/// Shared handle to a pin driver.
pub type DriverHandle = Arc<dyn Driver>;

driver_registry! {
    /// GPIO capability record.
    pub struct DriverRegistry {
        /// Looks up the driver for a port and pin
        pub get_driver: fn(Port, Pin) -> Option<DriverHandle>,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("gpio", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

/// Registers the backend and brings it up.
pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

/// Driver for `pin` on `port`, or `None` if unbacked or out of range.
pub fn get_driver(port: Port, pin: Pin) -> Option<DriverHandle> {
    FACADE.entry(|r| r.get_driver).and_then(|get| get(port, pin))
}

pub fn is_supported() -> bool {
    FACADE.is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::FACADE_LOCK;

    #[test]
    fn unbacked_gpio() {
        let _serial = FACADE_LOCK.lock();
        backend::uninstall();

        assert_eq!(reset(), Status::NOT_SUPPORTED);
        assert_eq!(initialize(), Status::NOT_SUPPORTED);
        assert!(get_driver(Port::A, 0).is_none());
        assert!(!is_supported());
    }

    #[test]
    fn state_helpers() {
        assert_eq!(State::from(true), State::High);
        assert_eq!(State::High.toggled(), State::Low);
        assert_eq!(State::OFF, State::Low);
        assert!(!PinInit::default().validity);
    }
}
