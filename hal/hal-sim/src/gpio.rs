//! Simulated GPIO pins.

use std::collections::HashMap;
use std::sync::Arc;

use chimera::gpio::{
    Drive, Driver, DriverHandle, DriverRegistry, Pin, PinInit, Port, Pull, State,
};
use chimera::{LightFlatMap, Status};
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::trace;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Pins available on each simulated port.
static PORT_WIDTH: LightFlatMap<Port, Pin, 8> = LightFlatMap::new([
    (Port::A, 16),
    (Port::B, 16),
    (Port::C, 16),
    (Port::D, 16),
    (Port::E, 16),
    (Port::F, 16),
    (Port::G, 16),
    (Port::H, 2),
]);

static PINS: Lazy<Mutex<HashMap<(Port, Pin), Arc<SimPin>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, Copy, Default)]
struct PinState {
    configured: bool,
    drive: Drive,
    pull: Pull,
    level: State,
}

/// Simulated pin
#[derive(Debug)]
pub struct SimPin {
    port: Port,
    pin: Pin,
    mutex: RecursiveTimedMutex,
    state: Mutex<PinState>,
}

impl SimPin {
    fn new(port: Port, pin: Pin) -> Self {
        Self {
            port,
            pin,
            mutex: RecursiveTimedMutex::new(),
            state: Mutex::new(PinState::default()),
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn pin_number(&self) -> Pin {
        self.pin
    }

    pub fn drive(&self) -> Drive {
        self.state.lock().drive
    }

    /// Applies an external level to an input pin, as a connected device would.
    pub fn drive_input(&self, level: State) {
        let mut state = self.state.lock();
        if matches!(state.drive, Drive::Input | Drive::HiZ) {
            state.level = level;
        }
    }

    /// Level an unconnected input floats to.
    fn idle_level(pull: Pull) -> State {
        match pull {
            Pull::PullUp => State::High,
            Pull::PullDown | Pull::NoPull => State::Low,
        }
    }
}

impl Lockable for SimPin {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl Driver for SimPin {
    fn init(&self, init: &PinInit) -> Status {
        if !init.validity || init.port != self.port || init.pin != self.pin {
            return Status::INVAL_FUNC_PARAM;
        }

        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        state.configured = true;
        state.drive = init.drive;
        state.pull = init.pull;
        state.level = match init.drive {
            Drive::Input | Drive::HiZ => Self::idle_level(init.pull),
            _ => init.state,
        };
        trace!("gpio {:?}{}: init {:?}", self.port, self.pin, init.drive);
        Status::OK
    }

    fn set_mode(&self, drive: Drive, pull: Pull) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        state.configured = true;
        state.drive = drive;
        state.pull = pull;
        Status::OK
    }

    fn set_state(&self, level: State) -> Status {
        let _guard = self.lock_guard();
        let mut state = self.state.lock();
        if !state.configured {
            return Status::NOT_INITIALIZED;
        }
        if matches!(state.drive, Drive::Input | Drive::Analog) {
            return Status::FAIL;
        }
        state.level = level;
        Status::OK
    }

    fn get_state(&self) -> Result<State, Status> {
        let state = self.state.lock();
        if state.configured {
            Ok(state.level)
        } else {
            Err(Status::NOT_INITIALIZED)
        }
    }

    fn toggle(&self) -> Status {
        let _guard = self.lock_guard();
        match self.get_state() {
            Ok(level) => self.set_state(level.toggled()),
            Err(status) => status,
        }
    }
}

/// Shared simulated pin, or `None` if the port lacks it.
pub fn pin(port: Port, pin: Pin) -> Option<Arc<SimPin>> {
    let width = PORT_WIDTH.get(&port)?;
    if pin >= *width {
        return None;
    }
    let mut pins = PINS.lock();
    let entry = pins
        .entry((port, pin))
        .or_insert_with(|| Arc::new(SimPin::new(port, pin)));
    Some(Arc::clone(entry))
}

fn get_driver(port: Port, number: Pin) -> Option<DriverHandle> {
    pin(port, number).map(|p| p as DriverHandle)
}

fn initialize() -> Status {
    Status::OK
}

fn reset() -> Status {
    PINS.lock().clear();
    Status::OK
}

/// Registration hook for the GPIO facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.get_driver = Some(get_driver);
    Status::OK
}
