//! Interrupt facade.
//!
//! Handlers are attached per peripheral and signal. The `isr` half runs in
//! interrupt context and must not block; the `user` half is deferred to
//! thread context by the backend.

use crate::peripheral::PeripheralType;
use crate::registry::{driver_registry, facade_backend, Facade};
use crate::status::Status;

/// Peripheral-specific interrupt signal number.
pub type Signal = u32;

/// Interrupt handler, given the source peripheral and signal.
pub type Callback = fn(PeripheralType, Signal);

/// Handlers attached to one signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalCallback {
    /// Runs in interrupt context
    pub isr: Option<Callback>,
    /// Runs in thread context after the ISR
    pub user: Option<Callback>,
}

impl SignalCallback {
    pub const fn is_empty(&self) -> bool {
        self.isr.is_none() && self.user.is_none()
    }
}

driver_registry! {
    /// Interrupt capability record.
    pub struct DriverRegistry {
        pub register_isr_handler: fn(PeripheralType, Signal, SignalCallback) -> Status,
    }
}

static FACADE: Facade<DriverRegistry> = Facade::new("interrupt", backend::register_driver);

facade_backend!(FACADE, DriverRegistry);

pub fn initialize() -> Status {
    FACADE.initialize()
}

pub fn reset() -> Status {
    FACADE.reset()
}

/// Attaches `callback` to `signal` of `periph`.
pub fn register_isr_handler(
    periph: PeripheralType,
    signal: Signal,
    callback: SignalCallback,
) -> Status {
    match FACADE.entry(|r| r.register_isr_handler) {
        Some(register) => register(periph, signal, callback),
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

    fn noop(_periph: PeripheralType, _signal: Signal) {}

    #[test]
    fn unbacked_registration_is_refused() {
        let _serial = FACADE_LOCK.lock();
        backend::uninstall();

        let callback = SignalCallback {
            isr: Some(noop),
            user: None,
        };
        assert!(!callback.is_empty());
        assert_eq!(
            register_isr_handler(PeripheralType::Spi, 3, callback),
            Status::NOT_SUPPORTED
        );
    }
}
