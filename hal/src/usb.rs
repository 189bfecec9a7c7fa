//! USB facade.

use std::sync::Arc;

use chimera_threading::Lockable;

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::Status;

/// USB controller instance.
pub type Channel = u8;

/// One USB device controller.
pub trait Driver: Lockable + Send + Sync {
    fn open(&self) -> Status;

    fn close(&self) -> Status;

    /// True while a host is connected.
    fn is_attached(&self) -> bool;
}

pub type DriverHandle = Arc<dyn Driver>;

driver_registry! {
    /// USB capability record.
    pub struct DriverRegistry {
        pub get_driver: fn(Channel) -> Option<DriverHandle>,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("usb", backend::register_driver);

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

pub fn is_supported() -> bool {
    FACADE.is_supported()
}
