//! UART facade.

use std::sync::Arc;

use crate::registry::{driver_registry, facade_backend, Facade};
use crate::serial::{Channel, SerialDriver};
use crate::status::Status;

/// Shared UART handle.
pub type SharedDriver = Arc<dyn SerialDriver>;

/// Uniquely owned UART handle.
pub type UniqueDriver = Box<dyn SerialDriver>;

driver_registry! {
    /// UART capability record.
    pub struct DriverRegistry {
        /// True if the channel is driven by a UART
        pub is_channel_uart: fn(Channel) -> bool,
        pub create_shared: fn(Channel) -> Option<SharedDriver>,
        pub create_unique: fn(Channel) -> Option<UniqueDriver>,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("uart", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

/// Returns false when the facade is unbacked.
pub fn is_channel_uart(channel: Channel) -> bool {
    FACADE
        .entry(|r| r.is_channel_uart)
        .map_or(false, |check| check(channel))
}

/// Creates a shared driver for `channel`.
pub fn create_shared(channel: Channel) -> Option<SharedDriver> {
    FACADE.entry(|r| r.create_shared).and_then(|create| create(channel))
}

/// Creates a driver owned by the caller alone.
pub fn create_unique(channel: Channel) -> Option<UniqueDriver> {
    FACADE.entry(|r| r.create_unique).and_then(|create| create(channel))
}

pub fn is_supported() -> bool {
    FACADE.is_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::FACADE_LOCK;

    fn init_ok() -> Status {
        Status::OK
    }

    fn low_channels(channel: Channel) -> bool {
        channel < 2
    }

    fn partial_backend(registry: &mut DriverRegistry) -> Status {
        registry.is_supported = true;
        registry.initialize = Some(init_ok);
        registry.is_channel_uart = Some(low_channels);
        Status::OK
    }

    #[test]
    fn missing_entries_degrade() {
        let _serial = FACADE_LOCK.lock();
        backend::install(partial_backend);
        assert_eq!(initialize(), Status::OK);

        assert!(is_channel_uart(1));
        assert!(!is_channel_uart(2));
        assert!(create_shared(0).is_none());
        assert!(create_unique(0).is_none());
        assert_eq!(reset(), Status::NOT_SUPPORTED);

        backend::uninstall();
        assert!(!is_channel_uart(1));
    }
}
