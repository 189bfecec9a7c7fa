//! Thread registry and ordered scheduler bring-up.
//!
//! Tasks are registered with [`Scheduler::add_thread`] before the scheduler
//! starts. [`Scheduler::start_scheduler`] then spawns a single init thread
//! that creates them in registration order.
//!
//! ## Bring-up modes
//!
//! - **Free-running**: every registered task is created and runs at once.
//! - **Ordered**: task *i* is created, and the init thread waits for it to
//!   call [`signal_setup_complete`] before creating task *i + 1*. A task that
//!   signals is suspended until every task has signaled, then the init thread
//!   resumes them in registration order and exits.
//!
//! If a task cannot be created, or a task does not signal within
//! [`SchedulerConfig::max_thread_init_timeout`], bring-up halts for good.
//! Nothing further is created and suspended tasks are never resumed. Host
//! threads cannot be suspended from outside, so a task that never signals
//! keeps running its own code after the halt.
//!
//! ## Task messages
//!
//! Every task owns a single-value mailbox. [`Scheduler::send_message`]
//! overwrites any unread value, [`await_task_message`] blocks the calling
//! task until a given value arrives and discards the others.
//!
//! ## Deletion and shutdown
//!
//! [`Scheduler::delete_thread`] drops a task from the registry. A task that
//! was never created never will be; a running task is told through its
//! mailbox and [`TaskHandle::is_deleted`], since host threads stop
//! cooperatively. [`Scheduler::end_scheduler`] deletes every task and ends
//! the scheduler for good.
//!
//! ## Init thread state machine
//!
//! ```text
//! Create(0) -> AwaitSetup(0) -> Create(1) -> ... -> ResumeAll -> Done
//!     |              |
//!     +--------------+--> Halt(reason)
//! ```
//!
//! In free-running mode `AwaitSetup` and `ResumeAll` are skipped.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::mem;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self as std_thread, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use once_cell::sync::Lazy;

use crate::error::SchedulerError;
use crate::sync::{Arc, Condvar, Mutex};
use crate::thread::{host_stack_size, truncate_name, Priority, ThreadName};

/// Capacity of the pre-start thread registry.
pub const MAX_REGISTERED_THREADS: usize = 16;

/// Name of the bring-up thread.
pub const INIT_THREAD_NAME: &str = "chimera_init";

/// What the init thread does once bring-up has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltPolicy {
    /// Record the halt and park the init thread until `end_scheduler`.
    #[default]
    Park,
    /// Abort the process.
    Abort,
}

/// Scheduler bring-up configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest a task may take to signal setup completion.
    pub max_thread_init_timeout: Duration,
    /// Polling interval of the init thread while it waits for a signal.
    pub thread_init_check_delay: Duration,
    /// Stack depth of the init thread, in machine words.
    pub init_thread_stack_depth: usize,
    /// Priority of the init thread. Advisory on the host.
    pub init_thread_priority: Priority,
    /// Terminal action after a failed bring-up.
    pub halt_policy: HaltPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_thread_init_timeout: Duration::from_millis(1000),
            thread_init_check_delay: Duration::from_millis(10),
            init_thread_stack_depth: 500,
            init_thread_priority: Priority(1),
            halt_policy: HaltPolicy::Park,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new scheduler configuration builder.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for [`SchedulerConfig`].
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Sets the per-task setup timeout.
    pub fn max_thread_init_timeout(mut self, timeout: Duration) -> Self {
        self.config.max_thread_init_timeout = timeout;
        self
    }

    /// Sets the init thread polling interval.
    pub fn thread_init_check_delay(mut self, delay: Duration) -> Self {
        self.config.thread_init_check_delay = delay;
        self
    }

    /// Sets the init thread stack depth in machine words.
    pub fn init_thread_stack_depth(mut self, depth: usize) -> Self {
        self.config.init_thread_stack_depth = depth;
        self
    }

    /// Sets the init thread priority.
    pub fn init_thread_priority(mut self, priority: Priority) -> Self {
        self.config.init_thread_priority = priority;
        self
    }

    /// Sets the terminal action after a failed bring-up.
    pub fn halt_policy(mut self, policy: HaltPolicy) -> Self {
        self.config.halt_policy = policy;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

/// Why bring-up halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// A task could not be created.
    OutOfMemory { thread: String },
    /// A task did not signal setup completion in time.
    SetupTimeout { thread: String, waited: Duration },
}

impl HaltReason {
    /// Name of the task that caused the halt.
    pub fn thread(&self) -> &str {
        match self {
            Self::OutOfMemory { thread } | Self::SetupTimeout { thread, .. } => thread,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { thread } => write!(f, "could not create task `{}`", thread),
            Self::SetupTimeout { thread, waited } => write!(
                f,
                "task `{}` did not finish setup within {:?}",
                thread, waited
            ),
        }
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// Tasks are being registered.
    NotStarted,
    /// The init thread is creating tasks.
    Initializing,
    /// Bring-up finished and the init thread is gone.
    Running,
    /// Bring-up failed. Terminal.
    Halted(HaltReason),
    /// `end_scheduler` was called. Terminal.
    Ended,
}

impl SchedulerState {
    /// Returns true once `start_scheduler` has been called.
    pub fn is_started(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }
}

/// Lifecycle of one task as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPhase {
    /// Waiting in the registry.
    #[default]
    Registered,
    /// Created and running its setup prelude.
    Created,
    /// Signaled setup completion and suspended until resumed.
    SetupComplete,
    /// Running its main body.
    Running,
    /// The entry function returned.
    Finished,
    /// Removed by `delete_thread` or `end_scheduler`.
    Deleted,
}

/// Value carried by a task message.
pub type TaskMessage = u32;

/// Task to be created by the scheduler.
pub struct ThreadDescriptor {
    entry: Box<dyn FnOnce() + Send + 'static>,
    priority: Priority,
    stack_depth: usize,
    name: ThreadName,
}

impl ThreadDescriptor {
    /// Describes a task. The entry closure carries whatever argument the task
    /// needs; `name` is truncated to [`MAX_NAME_LEN`](crate::thread::MAX_NAME_LEN).
    pub fn new<F>(name: &str, priority: Priority, stack_depth: usize, entry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            entry: Box::new(entry),
            priority,
            stack_depth,
            name: truncate_name(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }
}

impl fmt::Debug for ThreadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("stack_depth", &self.stack_depth)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct TaskRecord {
    id: Option<ThreadId>,
    phase: TaskPhase,
    resume_index: Option<usize>,
}

#[derive(Debug, Default)]
struct MailboxState {
    value: Option<TaskMessage>,
    sent: u64,
    taken: u64,
    closed: bool,
}

#[derive(Debug)]
enum Delivery {
    Received,
    TimedOut,
    Closed,
}

/// Single-value mailbox. A new message overwrites an unread one.
#[derive(Debug, Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    changed: Condvar,
}

impl Mailbox {
    /// Stores `message` and returns its ticket, or `None` once closed.
    fn post(&self, message: TaskMessage) -> Option<u64> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.value = Some(message);
        state.sent += 1;
        let ticket = state.sent;
        drop(state);
        self.changed.notify_all();
        Some(ticket)
    }

    /// Waits until the message with `ticket`, or one that overwrote it, was
    /// taken. Returns false if the mailbox closed first.
    fn wait_taken(&self, ticket: u64) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.taken >= ticket {
                return true;
            }
            if state.closed {
                return false;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Takes messages until `expected` arrives. Other values are discarded.
    fn receive(&self, expected: TaskMessage, deadline: Option<Instant>) -> Delivery {
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(value) = state.value.take() {
                state.taken = state.sent;
                self.changed.notify_all();
                if value == expected {
                    return Delivery::Received;
                }
                trace!("discarding message {} while waiting for {}", value, expected);
                continue;
            }
            if state.closed {
                return Delivery::Closed;
            }
            if timed_out {
                return Delivery::TimedOut;
            }
            timed_out = match deadline {
                Some(deadline) => self.changed.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.changed.wait(&mut state);
                    false
                }
            };
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.value = None;
        drop(state);
        self.changed.notify_all();
    }
}

#[derive(Debug)]
struct TaskSlot {
    name: ThreadName,
    priority: Priority,
    record: Mutex<TaskRecord>,
    mailbox: Mailbox,
}

/// Handle to a registered task, filled in as the task is created.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    slot: Arc<TaskSlot>,
}

impl TaskHandle {
    fn new(descriptor: &ThreadDescriptor) -> Self {
        Self {
            slot: Arc::new(TaskSlot {
                name: descriptor.name.clone(),
                priority: descriptor.priority,
                record: Mutex::new(TaskRecord::default()),
                mailbox: Mailbox::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn priority(&self) -> Priority {
        self.slot.priority
    }

    /// Host thread id, once the task has been created.
    pub fn id(&self) -> Option<ThreadId> {
        self.slot.record.lock().id
    }

    pub fn phase(&self) -> TaskPhase {
        self.slot.record.lock().phase
    }

    pub fn is_created(&self) -> bool {
        self.id().is_some()
    }

    /// Position in which the init thread resumed this task after an ordered
    /// bring-up. `None` for free-running and late-added tasks.
    pub fn resume_index(&self) -> Option<usize> {
        self.slot.record.lock().resume_index
    }

    /// Returns true once the task was deleted or its scheduler ended.
    pub fn is_deleted(&self) -> bool {
        self.phase() == TaskPhase::Deleted
    }

    /// Moves to `phase` unless the task was deleted. Returns false if it was.
    fn set_phase(&self, phase: TaskPhase) -> bool {
        let mut record = self.slot.record.lock();
        if record.phase == TaskPhase::Deleted {
            return false;
        }
        record.phase = phase;
        true
    }

    fn set_id(&self, id: ThreadId) {
        self.slot.record.lock().id = Some(id);
    }

    fn mark_resumed(&self, index: usize) {
        let mut record = self.slot.record.lock();
        if record.phase != TaskPhase::Deleted {
            record.phase = TaskPhase::Running;
        }
        record.resume_index = Some(index);
    }

    fn mark_finished(&self) {
        self.slot.mailbox.close();
        self.set_phase(TaskPhase::Finished);
    }

    fn mark_deleted(&self) {
        self.slot.record.lock().phase = TaskPhase::Deleted;
        self.slot.mailbox.close();
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Eq for TaskHandle {}

/// One-shot gate a signaled task waits on until the init thread resumes it.
#[derive(Debug, Default)]
struct ResumeGate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl ResumeGate {
    fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}

/// How a task takes part in the setup handshake.
enum Handshake {
    /// Free-running bring-up. Signaling is a no-op.
    Free,
    /// Ordered bring-up. The init thread waits for this task's signal.
    Ordered {
        index: usize,
        notify: Sender<usize>,
        gate: Arc<ResumeGate>,
    },
    /// Added after an ordered start, or already signaled. Nobody waits.
    Unawaited,
}

impl Handshake {
    fn take(&mut self) -> Handshake {
        match self {
            Handshake::Free => Handshake::Free,
            Handshake::Unawaited => Handshake::Unawaited,
            Handshake::Ordered { .. } => mem::replace(self, Handshake::Unawaited),
        }
    }
}

struct TaskContext {
    handle: TaskHandle,
    handshake: Handshake,
}

thread_local! {
    static TASK_CONTEXT: RefCell<Option<TaskContext>> = const { RefCell::new(None) };
}

/// Handle of the calling task, if it was created by a scheduler.
pub fn current_task() -> Option<TaskHandle> {
    TASK_CONTEXT.with(|cell| cell.borrow().as_ref().map(|ctx| ctx.handle.clone()))
}

/// Reports that the calling task finished its setup prelude.
///
/// In ordered mode the init thread is notified and the caller is suspended
/// until every registered task has signaled and the init thread resumes it.
/// In free-running mode this returns at once.
pub fn signal_setup_complete() -> Result<(), SchedulerError> {
    let (handle, handshake) = TASK_CONTEXT
        .with(|cell| {
            cell.borrow_mut()
                .as_mut()
                .map(|ctx| (ctx.handle.clone(), ctx.handshake.take()))
        })
        .ok_or(SchedulerError::NoScheduler)?;

    match handshake {
        Handshake::Free => Ok(()),
        Handshake::Unawaited => Err(SchedulerError::NotAwaited(handle.name().to_string())),
        Handshake::Ordered {
            index,
            notify,
            gate,
        } => {
            handle.set_phase(TaskPhase::SetupComplete);
            debug!("task `{}` finished setup", handle.name());
            if notify.send(index).is_err() {
                warn!("init thread is gone; `{}` stays suspended", handle.name());
            }
            gate.wait();
            if handle.is_deleted() {
                return Err(SchedulerError::TaskGone(handle.name().to_string()));
            }
            trace!("task `{}` resumed", handle.name());
            Ok(())
        }
    }
}

/// Blocks the calling task until `expected` arrives in its mailbox.
///
/// Any other message received meanwhile is discarded, so the mailbox is
/// empty on return.
pub fn await_task_message(expected: TaskMessage) -> Result<(), SchedulerError> {
    receive_message(expected, None)
}

/// Like [`await_task_message`], giving up after `timeout`.
pub fn await_task_message_for(
    expected: TaskMessage,
    timeout: Duration,
) -> Result<(), SchedulerError> {
    receive_message(expected, Some(timeout))
}

fn receive_message(
    expected: TaskMessage,
    timeout: Option<Duration>,
) -> Result<(), SchedulerError> {
    let handle = current_task().ok_or(SchedulerError::NoScheduler)?;
    let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
    match handle.slot.mailbox.receive(expected, deadline) {
        Delivery::Received => Ok(()),
        Delivery::TimedOut => Err(SchedulerError::MessageTimeout(
            timeout.unwrap_or_default(),
        )),
        Delivery::Closed => Err(SchedulerError::TaskGone(handle.name().to_string())),
    }
}

struct Pending {
    descriptor: ThreadDescriptor,
    handle: TaskHandle,
}

/// Creates the task. Returns `Ok(false)` if it was deleted before creation.
fn spawn_task(pending: Pending, handshake: Handshake) -> io::Result<bool> {
    let Pending { descriptor, handle } = pending;
    let ThreadDescriptor {
        entry,
        priority,
        stack_depth,
        name,
    } = descriptor;

    let initial = match handshake {
        Handshake::Ordered { .. } => TaskPhase::Created,
        Handshake::Free | Handshake::Unawaited => TaskPhase::Running,
    };
    if !handle.set_phase(initial) {
        debug!("skipping deleted task `{}`", name);
        return Ok(false);
    }

    let task = handle.clone();
    let join = std_thread::Builder::new()
        .name(name.to_string())
        .stack_size(host_stack_size(stack_depth))
        .spawn(move || {
            TASK_CONTEXT.with(|cell| {
                *cell.borrow_mut() = Some(TaskContext {
                    handle: task.clone(),
                    handshake,
                })
            });
            entry();
            task.mark_finished();
            TASK_CONTEXT.with(|cell| cell.borrow_mut().take());
        })
        .map_err(|err| {
            handle.set_phase(TaskPhase::Registered);
            err
        })?;

    handle.set_id(join.thread().id());
    debug!(
        "created task `{}` (priority {}, {} words)",
        name, priority, stack_depth
    );
    Ok(true)
}

struct Inner {
    state: SchedulerState,
    ordered: bool,
    pending: heapless::Vec<Pending, MAX_REGISTERED_THREADS>,
    tasks: Vec<TaskHandle>,
    init_thread: Option<JoinHandle<()>>,
}

struct Shared {
    config: SchedulerConfig,
    inner: Mutex<Inner>,
    settled: Condvar,
}

impl Shared {
    fn settle(&self, state: SchedulerState) {
        let mut inner = self.inner.lock();
        if inner.state == SchedulerState::Ended {
            return;
        }
        if matches!(state, SchedulerState::Running) {
            inner.init_thread = None;
        }
        inner.state = state;
        drop(inner);
        self.settled.notify_all();
    }

    fn is_ended(&self) -> bool {
        self.inner.lock().state == SchedulerState::Ended
    }
}

/// Thread registry plus the bring-up protocol.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

static GLOBAL: Lazy<Scheduler> = Lazy::new(Scheduler::default);

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    state: SchedulerState::NotStarted,
                    ordered: false,
                    pending: heapless::Vec::new(),
                    tasks: Vec::new(),
                    init_thread: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Process-wide scheduler with the default configuration.
    pub fn global() -> &'static Scheduler {
        &GLOBAL
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.inner.lock().state.clone()
    }

    /// Every task known to the scheduler, in registration order.
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.shared.inner.lock().tasks.clone()
    }

    /// Returns true while the init thread exists.
    pub fn init_thread_active(&self) -> bool {
        self.shared.inner.lock().init_thread.is_some()
    }

    /// Registers a task, or creates it at once if the scheduler has started.
    ///
    /// A task created after start takes no part in the setup handshake.
    pub fn add_thread(&self, descriptor: ThreadDescriptor) -> Result<TaskHandle, SchedulerError> {
        let handle = TaskHandle::new(&descriptor);
        let mut inner = self.shared.inner.lock();

        match &inner.state {
            SchedulerState::Halted(reason) => return Err(SchedulerError::Halted(reason.clone())),
            SchedulerState::Ended => return Err(SchedulerError::Ended),
            SchedulerState::NotStarted
            | SchedulerState::Initializing
            | SchedulerState::Running => {}
        }

        if !inner.state.is_started() {
            let pending = Pending {
                descriptor,
                handle: handle.clone(),
            };
            if inner.pending.push(pending).is_err() {
                warn!(
                    "thread registry full, dropping `{}` (capacity {})",
                    handle.name(),
                    MAX_REGISTERED_THREADS
                );
                return Err(SchedulerError::RegistryFull {
                    capacity: MAX_REGISTERED_THREADS,
                });
            }
            inner.tasks.push(handle.clone());
            debug!("registered task `{}`", handle.name());
            return Ok(handle);
        }

        let handshake = if inner.ordered {
            Handshake::Unawaited
        } else {
            Handshake::Free
        };
        inner.tasks.push(handle.clone());
        drop(inner);

        let pending = Pending {
            descriptor,
            handle: handle.clone(),
        };
        spawn_task(pending, handshake).map_err(|source| SchedulerError::Spawn {
            name: handle.name().to_string(),
            source,
        })?;
        Ok(handle)
    }

    /// Removes a task from the registry.
    ///
    /// A task that has not been created yet is never created. A running task
    /// keeps its host thread: it sees [`TaskHandle::is_deleted`], its mailbox
    /// closes, and a pending [`signal_setup_complete`] returns
    /// [`SchedulerError::TaskGone`] once released.
    pub fn delete_thread(&self, task: &TaskHandle) -> Result<(), SchedulerError> {
        let mut inner = self.shared.inner.lock();
        let position = inner
            .tasks
            .iter()
            .position(|known| known == task)
            .ok_or_else(|| SchedulerError::UnknownTask(task.name().to_string()))?;
        inner.tasks.remove(position);
        if let Some(index) = inner.pending.iter().position(|p| p.handle == *task) {
            inner.pending.remove(index);
        }
        drop(inner);

        task.mark_deleted();
        debug!("deleted task `{}`", task.name());
        Ok(())
    }

    /// Stores `message` in the task's mailbox, overwriting any unread value.
    pub fn send_message(
        &self,
        task: &TaskHandle,
        message: TaskMessage,
    ) -> Result<(), SchedulerError> {
        self.post(task, message).map(|_| ())
    }

    /// Sends `message` and blocks until the task has taken it, or a later
    /// message that overwrote it.
    ///
    /// Fails with [`SchedulerError::TaskGone`] if the task finishes or is
    /// deleted first. A task cannot wait on its own mailbox.
    pub fn send_message_and_wait(
        &self,
        task: &TaskHandle,
        message: TaskMessage,
    ) -> Result<(), SchedulerError> {
        if current_task().as_ref() == Some(task) {
            return Err(SchedulerError::WouldDeadlock(task.name().to_string()));
        }
        let ticket = self.post(task, message)?;
        if task.slot.mailbox.wait_taken(ticket) {
            Ok(())
        } else {
            Err(SchedulerError::TaskGone(task.name().to_string()))
        }
    }

    fn post(&self, task: &TaskHandle, message: TaskMessage) -> Result<u64, SchedulerError> {
        if !self.shared.inner.lock().tasks.contains(task) {
            return Err(SchedulerError::UnknownTask(task.name().to_string()));
        }
        if !task.is_created() {
            return Err(SchedulerError::TaskNotCreated(task.name().to_string()));
        }
        let ticket = task
            .slot
            .mailbox
            .post(message)
            .ok_or_else(|| SchedulerError::TaskGone(task.name().to_string()))?;
        trace!("message {} sent to `{}`", message, task.name());
        Ok(ticket)
    }

    /// Ends the scheduler for good.
    ///
    /// Every task is deleted, nothing further is created, and tasks waiting
    /// in the setup handshake are released so their host threads can exit.
    pub fn end_scheduler(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == SchedulerState::Ended {
            return;
        }
        inner.state = SchedulerState::Ended;
        inner.pending.clear();
        let tasks = mem::take(&mut inner.tasks);
        let init_thread = inner.init_thread.take();
        drop(inner);

        for task in &tasks {
            task.mark_deleted();
        }
        if let Some(init_thread) = init_thread {
            init_thread.thread().unpark();
        }
        self.shared.settled.notify_all();
        info!("scheduler ended, {} task(s) deleted", tasks.len());
    }

    /// Registers several tasks in order. Stops at the first failure.
    pub fn add_threads<I>(&self, descriptors: I) -> Result<Vec<TaskHandle>, SchedulerError>
    where
        I: IntoIterator<Item = ThreadDescriptor>,
    {
        descriptors
            .into_iter()
            .map(|descriptor| self.add_thread(descriptor))
            .collect()
    }

    /// Spawns the init thread, which creates every registered task.
    ///
    /// Returns once the init thread exists; use
    /// [`wait_until_settled`](Self::wait_until_settled) to observe the outcome.
    pub fn start_scheduler(&self, use_setup_callbacks: bool) -> Result<(), SchedulerError> {
        let mut inner = self.shared.inner.lock();
        match &inner.state {
            SchedulerState::NotStarted => {}
            SchedulerState::Halted(reason) => return Err(SchedulerError::Halted(reason.clone())),
            SchedulerState::Ended => return Err(SchedulerError::Ended),
            SchedulerState::Initializing | SchedulerState::Running => {
                return Err(SchedulerError::AlreadyStarted)
            }
        }

        inner.state = SchedulerState::Initializing;
        inner.ordered = use_setup_callbacks;
        let pending: Vec<Option<Pending>> = mem::take(&mut inner.pending)
            .into_iter()
            .map(Some)
            .collect();

        let config = &self.shared.config;
        info!(
            "starting scheduler with {} task(s), {} bring-up",
            pending.len(),
            if use_setup_callbacks { "ordered" } else { "free-running" }
        );

        let (notify, signals) = mpsc::channel();
        let bringup = Bringup {
            shared: Arc::clone(&self.shared),
            pending,
            ordered: use_setup_callbacks,
            notify,
            signals,
            resume_queue: Vec::new(),
        };

        let spawned = std_thread::Builder::new()
            .name(INIT_THREAD_NAME.to_string())
            .stack_size(host_stack_size(config.init_thread_stack_depth))
            .spawn(move || bringup.run());

        match spawned {
            Ok(join) => {
                debug!(
                    "init thread started (priority {})",
                    config.init_thread_priority
                );
                inner.init_thread = Some(join);
                Ok(())
            }
            Err(source) => {
                let reason = HaltReason::OutOfMemory {
                    thread: INIT_THREAD_NAME.to_string(),
                };
                error!("scheduler halted: {}", reason);
                inner.state = SchedulerState::Halted(reason);
                drop(inner);
                self.shared.settled.notify_all();
                Err(SchedulerError::Spawn {
                    name: INIT_THREAD_NAME.to_string(),
                    source,
                })
            }
        }
    }

    /// Blocks until bring-up has finished or halted, or `timeout` elapses.
    pub fn wait_until_settled(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        let mut timed_out = false;
        loop {
            match &inner.state {
                SchedulerState::Running => return Ok(()),
                SchedulerState::Halted(reason) => {
                    return Err(SchedulerError::Halted(reason.clone()))
                }
                SchedulerState::Ended => return Err(SchedulerError::Ended),
                SchedulerState::NotStarted | SchedulerState::Initializing => {}
            }
            if timed_out {
                return Err(SchedulerError::SettleTimeout(timeout));
            }
            timed_out = self
                .shared
                .settled
                .wait_until(&mut inner, deadline)
                .timed_out();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Scheduler")
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .field("tasks", &inner.tasks.len())
            .finish()
    }
}

#[derive(Debug)]
enum Step {
    Create(usize),
    AwaitSetup(usize),
    ResumeAll,
    Done,
    Halt(HaltReason),
    Stop,
}

/// State owned by the init thread.
struct Bringup {
    shared: Arc<Shared>,
    pending: Vec<Option<Pending>>,
    ordered: bool,
    notify: Sender<usize>,
    signals: Receiver<usize>,
    resume_queue: Vec<(TaskHandle, Arc<ResumeGate>)>,
}

impl Bringup {
    fn run(mut self) {
        let mut step = Step::Create(0);
        loop {
            if self.shared.is_ended() {
                step = Step::Stop;
            }
            trace!("init thread: {:?}", step);
            step = match step {
                Step::Create(index) => self.create(index),
                Step::AwaitSetup(index) => self.await_setup(index),
                Step::ResumeAll => self.resume_all(),
                Step::Done => {
                    info!("scheduler bring-up complete");
                    self.shared.settle(SchedulerState::Running);
                    return;
                }
                Step::Halt(reason) => self.halt(reason),
                Step::Stop => {
                    for (handle, gate) in self.resume_queue.drain(..) {
                        trace!("releasing `{}`", handle.name());
                        gate.open();
                    }
                    debug!("init thread stopped by end_scheduler");
                    return;
                }
            };
        }
    }

    fn create(&mut self, index: usize) -> Step {
        let Some(pending) = self.pending.get_mut(index).and_then(Option::take) else {
            return if self.ordered {
                Step::ResumeAll
            } else {
                Step::Done
            };
        };

        let handle = pending.handle.clone();
        let handshake = if self.ordered {
            let gate = Arc::new(ResumeGate::default());
            self.resume_queue.push((handle.clone(), Arc::clone(&gate)));
            Handshake::Ordered {
                index,
                notify: self.notify.clone(),
                gate,
            }
        } else {
            Handshake::Free
        };

        match spawn_task(pending, handshake) {
            Ok(false) => {
                if self.ordered {
                    self.resume_queue.pop();
                }
                Step::Create(index + 1)
            }
            Ok(true) if self.ordered => Step::AwaitSetup(index),
            Ok(true) => Step::Create(index + 1),
            Err(err) => {
                error!("failed to create task `{}`: {}", handle.name(), err);
                Step::Halt(HaltReason::OutOfMemory {
                    thread: handle.name().to_string(),
                })
            }
        }
    }

    fn await_setup(&mut self, index: usize) -> Step {
        let config = &self.shared.config;
        let delay = config.thread_init_check_delay.max(Duration::from_millis(1));
        let mut waited = Duration::ZERO;

        loop {
            match self.signals.recv_timeout(delay) {
                Ok(signaled) if signaled == index => return Step::Create(index + 1),
                Ok(signaled) => warn!("unexpected setup signal from task #{}", signaled),
                // The init thread keeps a sender, so the channel never disconnects.
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    if self.shared.is_ended() {
                        return Step::Stop;
                    }
                    let awaited = self.resume_queue.last().map(|(handle, _)| handle.clone());
                    if awaited.as_ref().is_some_and(TaskHandle::is_deleted) {
                        debug!("awaited task #{} was deleted, moving on", index);
                        return Step::Create(index + 1);
                    }
                    waited += delay;
                    if waited > config.max_thread_init_timeout {
                        let thread = awaited
                            .map(|handle| handle.name().to_string())
                            .unwrap_or_default();
                        return Step::Halt(HaltReason::SetupTimeout { thread, waited });
                    }
                }
            }
        }
    }

    fn resume_all(&mut self) -> Step {
        for (position, (handle, gate)) in self.resume_queue.drain(..).enumerate() {
            trace!("resuming `{}`", handle.name());
            handle.mark_resumed(position);
            gate.open();
        }
        Step::Done
    }

    /// Parks until `end_scheduler` is called, then stops.
    fn halt(&mut self, reason: HaltReason) -> Step {
        error!("scheduler halted: {}", reason);
        self.shared.settle(SchedulerState::Halted(reason));

        match self.shared.config.halt_policy {
            HaltPolicy::Abort => std::process::abort(),
            HaltPolicy::Park => {
                while !self.shared.is_ended() {
                    std_thread::park();
                }
                Step::Stop
            }
        }
    }
}
