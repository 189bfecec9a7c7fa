//! RTOS hook forwarding.
//!
//! The RTOS reports stack overflow, tick, allocation failure and idle through
//! fixed C-ABI callbacks. Applications install an [`RtosHooks`] record and the
//! callbacks forward to it. With the `freertos-hooks` feature this crate also
//! exports the `vApplication*Hook` symbols FreeRTOS links against.

use std::fmt;

use log::error;

use crate::sync::RwLock;

/// Opaque task handle as passed by the RTOS.
pub type RawTaskHandle = usize;

/// Application hook table. Absent entries are skipped.
#[derive(Clone, Copy, Default)]
pub struct RtosHooks {
    pub stack_overflow: Option<fn(RawTaskHandle, &str)>,
    pub tick: Option<fn()>,
    pub malloc_failed: Option<fn()>,
    pub idle: Option<fn()>,
}

impl RtosHooks {
    pub const EMPTY: Self = Self {
        stack_overflow: None,
        tick: None,
        malloc_failed: None,
        idle: None,
    };
}

impl fmt::Debug for RtosHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtosHooks")
            .field("stack_overflow", &self.stack_overflow.is_some())
            .field("tick", &self.tick.is_some())
            .field("malloc_failed", &self.malloc_failed.is_some())
            .field("idle", &self.idle.is_some())
            .finish()
    }
}

static HOOKS: RwLock<RtosHooks> = parking_lot::const_rwlock(RtosHooks::EMPTY);

/// Replaces the installed hook table.
pub fn install(hooks: RtosHooks) {
    *HOOKS.write() = hooks;
}

/// Removes every installed hook.
pub fn uninstall() {
    *HOOKS.write() = RtosHooks::EMPTY;
}

/// Currently installed hook table.
pub fn installed() -> RtosHooks {
    *HOOKS.read()
}

/// Parks the caller in a spin loop so a debugger can inspect the failure.
#[cfg(debug_assertions)]
fn trap() {
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(not(debug_assertions))]
fn trap() {}

/// A task overflowed its stack.
///
/// Traps in debug builds when no handler is installed.
pub fn on_stack_overflow(task: RawTaskHandle, name: &str) {
    error!("stack overflow in task `{}` ({:#x})", name, task);
    match installed().stack_overflow {
        Some(hook) => hook(task, name),
        None => trap(),
    }
}

/// The RTOS tick fired.
pub fn on_tick() {
    if let Some(hook) = installed().tick {
        hook();
    }
}

/// A kernel allocation failed.
///
/// Traps in debug builds when no handler is installed.
pub fn on_malloc_failed() {
    error!("RTOS heap allocation failed");
    match installed().malloc_failed {
        Some(hook) => hook(),
        None => trap(),
    }
}

/// The idle task ran.
pub fn on_idle() {
    if let Some(hook) = installed().idle {
        hook();
    }
}

#[cfg(feature = "freertos-hooks")]
#[allow(non_snake_case)]
mod ffi {
    use core::ffi::{c_char, c_void, CStr};

    #[no_mangle]
    pub extern "C" fn vApplicationStackOverflowHook(task: *mut c_void, name: *mut c_char) {
        let name = if name.is_null() {
            "<unknown>"
        } else {
            // SAFETY: FreeRTOS passes the NUL-terminated name stored in the TCB.
            unsafe { CStr::from_ptr(name) }
                .to_str()
                .unwrap_or("<invalid>")
        };
        super::on_stack_overflow(task as usize, name);
    }

    #[no_mangle]
    pub extern "C" fn vApplicationTickHook() {
        super::on_tick();
    }

    #[no_mangle]
    pub extern "C" fn vApplicationMallocFailedHook() {
        super::on_malloc_failed();
    }

    #[no_mangle]
    pub extern "C" fn vApplicationIdleHook() {
        super::on_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TICKS: AtomicUsize = AtomicUsize::new(0);
    static OVERFLOWS: AtomicUsize = AtomicUsize::new(0);
    static ALLOC_FAILURES: AtomicUsize = AtomicUsize::new(0);

    fn count_tick() {
        TICKS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_overflow(task: RawTaskHandle, name: &str) {
        assert_eq!(task, 0x2000_0100);
        assert_eq!(name, "sensor");
        OVERFLOWS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_alloc_failure() {
        ALLOC_FAILURES.fetch_add(1, Ordering::SeqCst);
    }

    // The hook table is process-wide, so one test drives the whole sequence.
    #[test]
    fn hooks_forward_to_installed_handlers() {
        uninstall();
        on_tick();
        on_idle();
        assert_eq!(TICKS.load(Ordering::SeqCst), 0);

        install(RtosHooks {
            stack_overflow: Some(count_overflow),
            tick: Some(count_tick),
            malloc_failed: Some(count_alloc_failure),
            idle: None,
        });
        assert!(installed().tick.is_some());

        on_tick();
        on_tick();
        on_idle();
        on_stack_overflow(0x2000_0100, "sensor");
        on_malloc_failed();

        assert_eq!(TICKS.load(Ordering::SeqCst), 2);
        assert_eq!(OVERFLOWS.load(Ordering::SeqCst), 1);
        assert_eq!(ALLOC_FAILURES.load(Ordering::SeqCst), 1);

        uninstall();
        assert!(installed().stack_overflow.is_none());
    }
}
