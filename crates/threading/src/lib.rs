//! # chimera-threading
//!
//! Threading primitives shared by every Chimera peripheral driver:
//! - A mutex family (plain, recursive, timed, recursive-timed) with explicit
//!   `lock`/`unlock` calls in the style of an RTOS semaphore API
//! - The [`Lockable`] mixin that makes any driver thread-safe by composition
//! - Scoped lock guards
//! - A [`Thread`] handle over a host thread
//! - An ordered scheduler bring-up protocol in which each registered task
//!   finishes its setup prelude before the next one is created
//!
//! ## Module Overview
//!
//! - [`mutex`] - Mutex family and the lock traits
//! - [`lockable`] - `Lockable` mixin
//! - [`guard`] - `LockGuard` and `TimedLockGuard`
//! - [`isr`] - Interrupt-context tracking
//! - [`thread`] - Thread handle and `this_thread` helpers
//! - [`scheduler`] - Thread registry, ordered bring-up and task messages
//! - [`hooks`] - RTOS hook forwarding
//! - [`bootstrap`] - System queries usable before any peripheral is up
//!
//! This crate sits strictly below the peripheral layer and never calls into it.

pub mod bootstrap;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod isr;
pub mod lockable;
pub mod mutex;
pub mod scheduler;
mod sync;
pub mod thread;

pub use error::{SchedulerError, ThreadingError};
pub use guard::{LockGuard, TimedLockGuard};
pub use isr::{in_isr, IsrContext};
pub use lockable::Lockable;
pub use mutex::{
    BasicLockable, Mutex, NativeMutex, RecursiveMutex, RecursiveTimedMutex, TimedLockable,
    TimedMutex, TryLockable,
};
pub use scheduler::{
    await_task_message, await_task_message_for, current_task, signal_setup_complete, HaltPolicy,
    HaltReason, Scheduler, SchedulerConfig, SchedulerConfigBuilder, SchedulerState, TaskHandle,
    TaskMessage, TaskPhase, ThreadDescriptor, INIT_THREAD_NAME, MAX_REGISTERED_THREADS,
};
pub use thread::{this_thread, Priority, Thread, ThreadName, MAX_NAME_LEN};

/// Timeout value meaning "do not block at all".
pub const TIMEOUT_DONT_WAIT: core::time::Duration = core::time::Duration::ZERO;
