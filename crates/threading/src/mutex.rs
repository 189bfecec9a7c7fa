//! Mutex family.
//!
//! Four types share one lock core and differ only in which capabilities they
//! expose:
//!
//! | Type | Re-entrant | Timed |
//! |---|---|---|
//! | [`Mutex`] | no | no |
//! | [`RecursiveMutex`] | yes | no |
//! | [`TimedMutex`] | no | yes |
//! | [`RecursiveTimedMutex`] | yes | yes |
//!
//! Unlike `std::sync::Mutex` these do not guard data; they are acquired and
//! released explicitly, matching the semaphore-handle API of an RTOS. Use
//! [`LockGuard`](crate::guard::LockGuard) for scoped release.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::error::ThreadingError;
use crate::isr;
use crate::sync::{Condvar, Mutex as StateLock};

/// Something that can be locked and unlocked.
pub trait BasicLockable {
    /// Blocks until the lock is acquired.
    fn lock(&self);

    /// Releases one level of ownership.
    fn unlock(&self) -> Result<(), ThreadingError>;
}

/// A lock that supports a non-blocking acquisition attempt.
pub trait TryLockable: BasicLockable {
    /// Acquires the lock if it is immediately available.
    fn try_lock(&self) -> bool;
}

/// A lock that supports bounded waiting.
pub trait TimedLockable: TryLockable {
    /// Waits at most `timeout` for the lock.
    fn try_lock_for(&self, timeout: Duration) -> bool;

    /// Waits until `deadline` for the lock.
    fn try_lock_until(&self, deadline: Instant) -> bool;
}

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Host lock core behind every mutex type.
///
/// Tracks the owning thread and the re-entry depth so that ownership errors
/// are reported instead of corrupting the lock.
#[derive(Debug, Default)]
pub struct NativeMutex {
    state: StateLock<LockState>,
    released: Condvar,
}

impl NativeMutex {
    /// Creates an unlocked core.
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_mutex(LockState {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn claim(state: &mut LockState, me: ThreadId, recursive: bool) -> bool {
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
            Some(owner) if owner == me && recursive => {
                state.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    fn acquire(&self, recursive: bool) {
        debug_assert!(!isr::in_isr(), "blocking lock called from ISR context");
        let me = thread::current().id();
        let mut state = self.state.lock();
        while !Self::claim(&mut state, me, recursive) {
            self.released.wait(&mut state);
        }
    }

    fn try_acquire(&self, recursive: bool) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        Self::claim(&mut state, me, recursive)
    }

    /// A deadline already in the past never blocks and is allowed in ISR context.
    fn acquire_until(&self, recursive: bool, deadline: Instant) -> bool {
        debug_assert!(
            !isr::in_isr() || deadline <= Instant::now(),
            "blocking lock called from ISR context"
        );
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            if Self::claim(&mut state, me, recursive) {
                return true;
            }
            if self.released.wait_until(&mut state, deadline).timed_out() {
                // One last look: the holder may have released right at the deadline.
                return Self::claim(&mut state, me, recursive);
            }
        }
    }

    fn release(&self) -> Result<(), ThreadingError> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => return Err(ThreadingError::NotLocked),
            Some(owner) if owner != me => return Err(ThreadingError::NotOwner),
            Some(_) => {}
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_all();
        }
        Ok(())
    }

    /// Returns true while any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Returns true if the calling thread holds the lock.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Current re-entry depth (0 when unlocked).
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }
}

macro_rules! mutex_type {
    ($(#[$meta:meta])* $name:ident, recursive = $recursive:expr) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            raw: NativeMutex,
        }

        impl $name {
            /// Creates an unlocked mutex.
            pub const fn new() -> Self {
                Self {
                    raw: NativeMutex::new(),
                }
            }

            /// Blocks until the mutex is acquired.
            pub fn lock(&self) {
                self.raw.acquire($recursive);
            }

            /// Acquires the mutex if it is immediately available.
            pub fn try_lock(&self) -> bool {
                self.raw.try_acquire($recursive)
            }

            /// Releases the mutex.
            pub fn unlock(&self) -> Result<(), ThreadingError> {
                self.raw.release()
            }

            /// Returns true while any thread holds the mutex.
            pub fn is_locked(&self) -> bool {
                self.raw.is_locked()
            }

            /// Returns true if the calling thread holds the mutex.
            pub fn is_owned_by_current_thread(&self) -> bool {
                self.raw.is_owned_by_current_thread()
            }

            /// Underlying lock core.
            pub fn native_handle(&self) -> &NativeMutex {
                &self.raw
            }
        }

        impl BasicLockable for $name {
            fn lock(&self) {
                $name::lock(self)
            }

            fn unlock(&self) -> Result<(), ThreadingError> {
                $name::unlock(self)
            }
        }

        impl TryLockable for $name {
            fn try_lock(&self) -> bool {
                $name::try_lock(self)
            }
        }
    };
}

macro_rules! timed_mutex_type {
    ($name:ident, recursive = $recursive:expr) => {
        impl $name {
            /// Waits at most `timeout` for the mutex.
            ///
            /// Returns false once the timeout elapses, even if the holder
            /// never releases.
            pub fn try_lock_for(&self, timeout: Duration) -> bool {
                match Instant::now().checked_add(timeout) {
                    Some(deadline) => self.raw.acquire_until($recursive, deadline),
                    None => {
                        self.raw.acquire($recursive);
                        true
                    }
                }
            }

            /// Waits until `deadline` for the mutex.
            pub fn try_lock_until(&self, deadline: Instant) -> bool {
                self.raw.acquire_until($recursive, deadline)
            }
        }

        impl TimedLockable for $name {
            fn try_lock_for(&self, timeout: Duration) -> bool {
                $name::try_lock_for(self, timeout)
            }

            fn try_lock_until(&self, deadline: Instant) -> bool {
                $name::try_lock_until(self, deadline)
            }
        }
    };
}

mutex_type!(
    /// Non-recursive, untimed mutex.
    ///
    /// Locking it twice from the same thread deadlocks, as it would on the
    /// RTOS.
    Mutex,
    recursive = false
);

mutex_type!(
    /// Mutex that the owning thread may re-enter.
    ///
    /// Each `lock` must be balanced by an `unlock` before another thread can
    /// acquire it.
    RecursiveMutex,
    recursive = true
);

mutex_type!(
    /// Non-recursive mutex with bounded waiting.
    TimedMutex,
    recursive = false
);

mutex_type!(
    /// Re-entrant mutex with bounded waiting. Embedded in every
    /// [`Lockable`](crate::lockable::Lockable) object.
    RecursiveTimedMutex,
    recursive = true
);

timed_mutex_type!(TimedMutex, recursive = false);
timed_mutex_type!(RecursiveTimedMutex, recursive = true);
