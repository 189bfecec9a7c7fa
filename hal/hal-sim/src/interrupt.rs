//! Simulated interrupt controller.
//!
//! Handlers are kept in a table keyed by peripheral and signal. Tests and
//! other simulated drivers raise a signal with [`trigger`], which runs the
//! ISR half inside an [`IsrContext`] and the user half afterwards.

use std::collections::HashMap;

use chimera::interrupt::{DriverRegistry, Signal, SignalCallback};
use chimera::{PeripheralType, Status};
use chimera_threading::IsrContext;
use log::{debug, trace};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static HANDLERS: Lazy<Mutex<HashMap<(PeripheralType, Signal), SignalCallback>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn register_isr_handler(
    periph: PeripheralType,
    signal: Signal,
    callback: SignalCallback,
) -> Status {
    if callback.is_empty() {
        return Status::INVAL_FUNC_PARAM;
    }
    debug!("interrupt: handler attached to {} signal {}", periph, signal);
    HANDLERS.lock().insert((periph, signal), callback);
    Status::OK
}

/// Raises `signal` on `periph`. Returns false if no handler is attached.
pub fn trigger(periph: PeripheralType, signal: Signal) -> bool {
    let Some(callback) = HANDLERS.lock().get(&(periph, signal)).copied() else {
        trace!("interrupt: {} signal {} unhandled", periph, signal);
        return false;
    };

    if let Some(isr) = callback.isr {
        let _isr = IsrContext::enter();
        isr(periph, signal);
    }
    if let Some(user) = callback.user {
        user(periph, signal);
    }
    true
}

fn initialize() -> Status {
    Status::OK
}

fn reset() -> Status {
    HANDLERS.lock().clear();
    Status::OK
}

/// Registration hook for the interrupt facade.
pub fn register_driver(registry: &mut DriverRegistry) -> Status {
    registry.is_supported = true;
    registry.initialize = Some(initialize);
    registry.reset = Some(reset);
    registry.register_isr_handler = Some(register_isr_handler);
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_threading::in_isr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ISR_HITS: AtomicUsize = AtomicUsize::new(0);
    static USER_HITS: AtomicUsize = AtomicUsize::new(0);

    fn isr(_periph: PeripheralType, signal: Signal) {
        assert!(in_isr());
        ISR_HITS.fetch_add(signal as usize, Ordering::SeqCst);
    }

    fn user(_periph: PeripheralType, _signal: Signal) {
        assert!(!in_isr());
        USER_HITS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn trigger_runs_both_halves() {
        let callback = SignalCallback {
            isr: Some(isr),
            user: Some(user),
        };
        assert_eq!(
            register_isr_handler(PeripheralType::Dma, 4, callback),
            Status::OK
        );
        assert_eq!(
            register_isr_handler(PeripheralType::Dma, 5, SignalCallback::default()),
            Status::INVAL_FUNC_PARAM
        );

        assert!(trigger(PeripheralType::Dma, 4));
        assert!(!trigger(PeripheralType::Dma, 5));
        assert_eq!(ISR_HITS.load(Ordering::SeqCst), 4);
        assert_eq!(USER_HITS.load(Ordering::SeqCst), 1);
    }
}
