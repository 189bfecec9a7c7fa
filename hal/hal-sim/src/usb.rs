//! Simulated USB device controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chimera::usb::{Channel, Driver, DriverHandle, DriverRegistry};
use chimera::Status;
use chimera_threading::{Lockable, RecursiveTimedMutex};
use log::debug;
use once_cell::sync::Lazy;

static CONTROLLER: Lazy<Arc<SimUsb>> = Lazy::new(|| Arc::new(SimUsb::new()));

/// Simulated USB controller
#[derive(Debug, Default)]
pub struct SimUsb {
    mutex: RecursiveTimedMutex,
    open: AtomicBool,
    cable: AtomicBool,
}

impl SimUsb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs or unplugs the simulated host cable.
    pub fn set_cable(&self, connected: bool) {
        debug!("usb: cable {}", if connected { "in" } else { "out" });
        self.cable.store(connected, Ordering::SeqCst);
    }
}

impl Lockable for SimUsb {
    fn lockable_mutex(&self) -> &RecursiveTimedMutex {
        &self.mutex
    }
}

impl Driver for SimUsb {
    fn open(&self) -> Status {
        let _guard = self.lock_guard();
        if self.open.swap(true, Ordering::SeqCst) {
            return Status::BUSY;
        }
        Status::OK
    }

    fn close(&self) -> Status {
        let _guard = self.lock_guard();
        self.open.store(false, Ordering::SeqCst);
        Status::OK
    }

    fn is_attached(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.cable.load(Ordering::SeqCst)
    }
}

/// The single simulated controller.
pub fn controller() -> Arc<SimUsb> {
    Arc::clone(&CONTROLLER)
}

fn get_driver(channel: Channel) -> Option<DriverHandle> {
    (channel == 0).then(|| controller() as DriverHandle)
}

fn initialize() -> Status {
    Lazy::force(&CONTROLLER);
    Status::OK
}

fn reset() -> Status {
    CONTROLLER.close()
}

/// Registration hook for the USB facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.get_driver = Some(get_driver);
    Status::OK
}
