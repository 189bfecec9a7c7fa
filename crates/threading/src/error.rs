//! Error types for the threading layer.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::HaltReason;

/// Misuse of a mutex or thread handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadingError {
    /// `unlock` was called on a mutex nobody holds.
    #[error("mutex is not locked")]
    NotLocked,
    /// `unlock` was called by a thread other than the owner.
    #[error("mutex is held by another thread")]
    NotOwner,
    /// The thread has already been started.
    #[error("thread `{0}` was already started")]
    AlreadyStarted(String),
    /// The OS refused to create the thread.
    #[error("failed to spawn thread `{name}`: {reason}")]
    Spawn { name: String, reason: String },
    /// There is nothing to join.
    #[error("thread is not joinable")]
    NotJoinable,
    /// The joined thread panicked.
    #[error("thread `{0}` panicked")]
    Panicked(String),
}

/// Errors reported by the scheduler bring-up protocol.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The pre-start registry is at capacity.
    #[error("thread registry is full ({capacity} entries)")]
    RegistryFull { capacity: usize },
    /// `start_scheduler` was called twice.
    #[error("scheduler already started")]
    AlreadyStarted,
    /// Bring-up failed earlier and the scheduler is suspended.
    #[error("scheduler halted: {0}")]
    Halted(HaltReason),
    /// Task creation failed.
    #[error("failed to create thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The calling thread was not created by a scheduler.
    #[error("calling thread is not managed by a scheduler")]
    NoScheduler,
    /// The calling thread is not part of an ordered bring-up.
    #[error("thread `{0}` is not awaited by the init thread")]
    NotAwaited(String),
    /// `wait_until_settled` ran out of time.
    #[error("scheduler did not settle within {0:?}")]
    SettleTimeout(Duration),
    /// `end_scheduler` was called.
    #[error("scheduler has ended")]
    Ended,
    /// The task is not registered with this scheduler, or was deleted.
    #[error("task `{0}` is not known to this scheduler")]
    UnknownTask(String),
    /// The task is registered but has not been created yet.
    #[error("task `{0}` has not been created yet")]
    TaskNotCreated(String),
    /// The task finished or was deleted.
    #[error("task `{0}` is gone")]
    TaskGone(String),
    /// No matching message arrived in time.
    #[error("no matching message within {0:?}")]
    MessageTimeout(Duration),
    /// A task tried to wait on its own mailbox.
    #[error("task `{0}` cannot wait for its own message")]
    WouldDeadlock(String),
}
