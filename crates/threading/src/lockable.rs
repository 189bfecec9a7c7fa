//! The `Lockable` mixin.
//!
//! A driver becomes thread-safe by embedding a [`RecursiveTimedMutex`] and
//! implementing [`Lockable::lockable_mutex`]. Every other method is provided.
//!
//! ```
//! use chimera_threading::{Lockable, RecursiveTimedMutex};
//!
//! struct Driver {
//!     lock: RecursiveTimedMutex,
//! }
//!
//! impl Lockable for Driver {
//!     fn lockable_mutex(&self) -> &RecursiveTimedMutex {
//!         &self.lock
//!     }
//! }
//!
//! let driver = Driver { lock: RecursiveTimedMutex::new() };
//! driver.lock();
//! driver.lock();
//! driver.unlock().unwrap();
//! driver.unlock().unwrap();
//! ```

use std::time::Duration;

use crate::error::ThreadingError;
use crate::guard::{LockGuard, TimedLockGuard};
use crate::mutex::RecursiveTimedMutex;

/// Capability to be exclusively held by one thread at a time, re-entrantly.
pub trait Lockable {
    /// The embedded mutex.
    fn lockable_mutex(&self) -> &RecursiveTimedMutex;

    /// Blocks until exclusive access is acquired.
    ///
    /// Must not be called from interrupt context; use
    /// [`lock_from_isr`](Lockable::lock_from_isr) there.
    fn lock(&self) {
        self.lockable_mutex().lock();
    }

    /// Non-blocking acquisition attempt.
    fn try_lock(&self) -> bool {
        self.lockable_mutex().try_lock()
    }

    /// Waits at most `timeout` for exclusive access.
    ///
    /// Only [`TIMEOUT_DONT_WAIT`](crate::TIMEOUT_DONT_WAIT) may be used from
    /// interrupt context.
    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.lockable_mutex().try_lock_for(timeout)
    }

    /// Releases one level of ownership.
    fn unlock(&self) -> Result<(), ThreadingError> {
        self.lockable_mutex().unlock()
    }

    /// Interrupt-safe acquisition. Never blocks.
    fn lock_from_isr(&self) -> bool {
        self.lockable_mutex().try_lock()
    }

    /// Interrupt-safe release.
    fn unlock_from_isr(&self) -> Result<(), ThreadingError> {
        self.lockable_mutex().unlock()
    }

    /// Locks and returns a guard that unlocks on drop.
    fn lock_guard(&self) -> LockGuard<'_, RecursiveTimedMutex> {
        LockGuard::new(self.lockable_mutex())
    }

    /// Returns an unlocked timed guard bound to this object.
    fn timed_guard(&self) -> TimedLockGuard<'_, RecursiveTimedMutex> {
        TimedLockGuard::new(self.lockable_mutex())
    }
}
