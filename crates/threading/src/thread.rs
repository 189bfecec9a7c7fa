//! Thread handle.
//!
//! A [`Thread`] is created with its entry closure and started later with a
//! priority, stack depth and name, mirroring RTOS task creation. On the host
//! the priority is advisory and the stack depth sets a lower bound on the
//! host stack.

use std::fmt;
use std::mem;
use std::thread::{self as std_thread, JoinHandle, ThreadId};

use log::{debug, trace};

use crate::bootstrap;
use crate::error::ThreadingError;
use crate::sync::{Arc, Mutex};

/// Maximum thread name length in bytes. Longer names are truncated.
pub const MAX_NAME_LEN: usize = 16;

/// Smallest host stack handed to a spawned thread.
pub const MIN_HOST_STACK_SIZE: usize = 64 * 1024;

/// Bounded thread name.
pub type ThreadName = heapless::String<MAX_NAME_LEN>;

/// Task priority. Higher values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub u8);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Truncates `name` to [`MAX_NAME_LEN`] bytes on a character boundary.
pub fn truncate_name(name: &str) -> ThreadName {
    let mut out = ThreadName::new();
    for ch in name.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Host stack size for a task asking for `stack_depth` machine words.
pub(crate) fn host_stack_size(stack_depth: usize) -> usize {
    stack_depth
        .saturating_mul(mem::size_of::<usize>())
        .max(MIN_HOST_STACK_SIZE)
}

type Entry = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a host thread standing in for an RTOS task.
pub struct Thread {
    entry: Option<Entry>,
    handle: Option<JoinHandle<()>>,
    name: ThreadName,
    priority: Priority,
}

impl Thread {
    /// Wraps `entry` without starting it.
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            entry: Some(Box::new(entry)),
            handle: None,
            name: ThreadName::new(),
            priority: Priority::default(),
        }
    }

    /// Creates the task and lets it run.
    pub fn start(
        &mut self,
        priority: Priority,
        stack_depth: usize,
        name: &str,
    ) -> Result<(), ThreadingError> {
        let entry = self
            .entry
            .take()
            .ok_or_else(|| ThreadingError::AlreadyStarted(self.name.to_string()))?;

        self.name = truncate_name(name);
        self.priority = priority;

        // The entry stays reachable from here so a failed spawn can hand it back.
        let slot = Arc::new(Mutex::new(Some(entry)));
        let runner = Arc::clone(&slot);
        let spawned = std_thread::Builder::new()
            .name(self.name.to_string())
            .stack_size(host_stack_size(stack_depth))
            .spawn(move || {
                let entry = runner.lock().take();
                if let Some(entry) = entry {
                    entry();
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.entry = slot.lock().take();
                return Err(ThreadingError::Spawn {
                    name: self.name.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        debug!(
            "thread `{}` started (priority {}, {} words)",
            self.name, priority, stack_depth
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Waits for the thread to finish.
    pub fn join(&mut self) -> Result<(), ThreadingError> {
        let handle = self.handle.take().ok_or(ThreadingError::NotJoinable)?;
        trace!("joining thread `{}`", self.name);
        handle
            .join()
            .map_err(|_| ThreadingError::Panicked(self.name.to_string()))
    }

    /// Returns true if the thread was started and has not been joined.
    pub fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Identifier of the running thread, if started and not yet joined.
    pub fn get_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }

    /// Underlying host handle.
    pub fn native_handle(&self) -> Option<&JoinHandle<()>> {
        self.handle.as_ref()
    }

    /// Name given at start, truncated.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority given at start.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Number of hardware threads available.
    pub fn hardware_concurrency() -> usize {
        bootstrap::hardware_concurrency()
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("started", &self.entry.is_none())
            .field("joinable", &self.joinable())
            .finish()
    }
}

/// Operations on the calling thread.
pub mod this_thread {
    use std::thread::{self, ThreadId};
    use std::time::{Duration, Instant};

    /// Identifier of the calling thread.
    pub fn get_id() -> ThreadId {
        thread::current().id()
    }

    /// Blocks the calling thread for at least `duration`.
    pub fn sleep_for(duration: Duration) {
        thread::sleep(duration);
    }

    /// Blocks the calling thread until `deadline`. Returns at once if it has passed.
    pub fn sleep_until(deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }

    /// Offers the rest of the time slice to other threads.
    pub fn yield_now() {
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn names_are_truncated() {
        let name = truncate_name("a_very_long_thread_name");
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert_eq!(name.as_str(), "a_very_long_thre");

        // Multi-byte characters are never split.
        let name = truncate_name("ééééééééé");
        assert_eq!(name.len(), 16);
    }

    #[test]
    fn stack_size_has_a_floor() {
        assert_eq!(host_stack_size(10), MIN_HOST_STACK_SIZE);
        assert_eq!(
            host_stack_size(100_000),
            100_000 * mem::size_of::<usize>()
        );
    }

    #[test]
    fn start_and_join() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        let mut thread = Thread::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!thread.joinable());
        assert!(thread.get_id().is_none());

        thread.start(Priority(3), 256, "worker").unwrap();
        assert!(thread.joinable());
        assert!(thread.get_id().is_some());
        assert_eq!(thread.name(), "worker");
        assert_eq!(thread.priority(), Priority(3));

        thread.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert!(!thread.joinable());
        assert_eq!(thread.join(), Err(ThreadingError::NotJoinable));
    }

    #[test]
    fn second_start_is_rejected() {
        let mut thread = Thread::new(|| {});
        thread.start(Priority(1), 128, "once").unwrap();
        assert_eq!(
            thread.start(Priority(1), 128, "twice"),
            Err(ThreadingError::AlreadyStarted("once".into()))
        );
        thread.join().unwrap();
    }

    #[test]
    fn failed_spawn_keeps_the_entry() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let mut thread = Thread::new(move || flag.store(true, Ordering::SeqCst));

        // No host can map a stack this large.
        let result = thread.start(Priority(1), usize::MAX / 64, "huge");
        assert!(matches!(result, Err(ThreadingError::Spawn { .. })));
        assert!(!thread.joinable());

        thread.start(Priority(1), 128, "retry").unwrap();
        thread.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_thread_reports_on_join() {
        let mut thread = Thread::new(|| panic!("task failure"));
        thread.start(Priority(1), 128, "doomed").unwrap();
        assert_eq!(thread.join(), Err(ThreadingError::Panicked("doomed".into())));
    }

    #[test]
    fn sleep_until_past_deadline_returns() {
        let start = Instant::now();
        this_thread::sleep_until(start);
        this_thread::sleep_until(Instant::now() + Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn hardware_concurrency_is_positive() {
        assert!(Thread::hardware_concurrency() >= 1);
    }
}
