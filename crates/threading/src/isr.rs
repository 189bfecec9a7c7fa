//! Interrupt-context tracking.
//!
//! On the host there are no real interrupts. A simulated ISR marks its scope
//! with [`IsrContext::enter`] so that code which must not block can check
//! [`in_isr`] and choose its `_from_isr` path.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    /// Per-thread interrupt nesting depth.
    static NESTING_LEVEL: Cell<usize> = const { Cell::new(0) };
}

/// RAII marker for a simulated interrupt handler.
///
/// Nesting is allowed; the context ends when the outermost marker drops.
#[derive(Debug)]
#[must_use = "the ISR context ends when the marker is dropped"]
pub struct IsrContext {
    // Tied to the thread whose counter it bumped.
    _not_send: PhantomData<*const ()>,
}

impl IsrContext {
    /// Enters interrupt context on the calling thread.
    pub fn enter() -> Self {
        NESTING_LEVEL.with(|n| n.set(n.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for IsrContext {
    fn drop(&mut self) {
        NESTING_LEVEL.with(|n| {
            let current = n.get();
            debug_assert!(current > 0, "ISR context underflow");
            n.set(current.saturating_sub(1));
        });
    }
}

/// Returns true while the calling thread runs inside an [`IsrContext`].
#[inline]
pub fn in_isr() -> bool {
    NESTING_LEVEL.with(|n| n.get() > 0)
}

/// Current interrupt nesting depth of the calling thread.
#[inline]
pub fn nesting_level() -> usize {
    NESTING_LEVEL.with(Cell::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_nests_and_unwinds() {
        assert!(!in_isr());
        {
            let _outer = IsrContext::enter();
            assert!(in_isr());
            {
                let _inner = IsrContext::enter();
                assert_eq!(nesting_level(), 2);
            }
            assert_eq!(nesting_level(), 1);
        }
        assert!(!in_isr());
    }

    #[test]
    fn context_is_per_thread() {
        let _isr = IsrContext::enter();
        let other = std::thread::spawn(in_isr).join().unwrap();
        assert!(!other);
        assert!(in_isr());
    }
}
