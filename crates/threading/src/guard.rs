//! Scoped lock guards.

use std::time::Duration;

use log::warn;

use crate::mutex::{BasicLockable, TimedLockable};

/// Holds a lock for the lifetime of the guard.
///
/// The lock is acquired in [`LockGuard::new`] and released when the guard
/// drops, on every exit path including unwinding.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, M: BasicLockable + ?Sized> {
    lock: &'a M,
}

impl<'a, M: BasicLockable + ?Sized> LockGuard<'a, M> {
    /// Blocks until `lock` is acquired.
    pub fn new(lock: &'a M) -> Self {
        lock.lock();
        Self { lock }
    }
}

impl<M: BasicLockable + ?Sized> Drop for LockGuard<'_, M> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock() {
            warn!("lock guard release failed: {}", err);
        }
    }
}

/// Guard whose acquisition is attempted with a timeout.
///
/// Created unlocked. Releases on drop only if an attempt succeeded.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct TimedLockGuard<'a, M: TimedLockable + ?Sized> {
    lock: &'a M,
    locked: bool,
}

impl<'a, M: TimedLockable + ?Sized> TimedLockGuard<'a, M> {
    /// Binds the guard to `lock` without acquiring it.
    pub fn new(lock: &'a M) -> Self {
        Self {
            lock,
            locked: false,
        }
    }

    /// Waits at most `timeout` for the lock.
    ///
    /// Once an attempt has succeeded further calls return true without
    /// acquiring again, so the single release in `drop` stays balanced.
    pub fn try_lock_for(&mut self, timeout: Duration) -> bool {
        if !self.locked {
            self.locked = self.lock.try_lock_for(timeout);
        }
        self.locked
    }

    /// Returns true if the guard currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl<M: TimedLockable + ?Sized> Drop for TimedLockGuard<'_, M> {
    fn drop(&mut self) {
        if self.locked {
            if let Err(err) = self.lock.unlock() {
                warn!("timed lock guard release failed: {}", err);
            }
        }
    }
}
