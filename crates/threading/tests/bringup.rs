//! Ordered scheduler bring-up, end to end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chimera_threading::{
    await_task_message, await_task_message_for, current_task, signal_setup_complete, HaltReason,
    Priority, Scheduler, SchedulerConfig, SchedulerError, SchedulerState, TaskPhase,
    ThreadDescriptor,
};
use parking_lot::Mutex;

const SETTLE: Duration = Duration::from_secs(5);

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn ordered_bringup_follows_registration_order() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let setup_log = Arc::new(Mutex::new(Vec::new()));
    let body_log = Arc::new(Mutex::new(Vec::new()));

    let names = ["radio", "sensor", "logger"];
    for name in names {
        let setup_log = Arc::clone(&setup_log);
        let body_log = Arc::clone(&body_log);
        scheduler
            .add_thread(ThreadDescriptor::new(name, Priority(3), 512, move || {
                // Every earlier task has already signaled and is suspended.
                setup_log.lock().push(name);
                std::thread::sleep(Duration::from_millis(5));
                signal_setup_complete().unwrap();
                body_log.lock().push(name);
            }))
            .unwrap();
    }

    scheduler.start_scheduler(true).unwrap();
    scheduler.wait_until_settled(SETTLE).unwrap();

    assert_eq!(*setup_log.lock(), names);
    assert!(!scheduler.init_thread_active());

    let tasks = scheduler.tasks();
    let resumed: Vec<_> = tasks.iter().map(|task| task.resume_index()).collect();
    assert_eq!(resumed, vec![Some(0), Some(1), Some(2)]);

    assert!(wait_for(|| body_log.lock().len() == names.len()));
    assert!(wait_for(|| tasks
        .iter()
        .all(|task| task.phase() == TaskPhase::Finished)));
}

#[test]
fn no_task_runs_its_body_before_all_have_signaled() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let signaled = Arc::new(Mutex::new(0usize));
    let early_body = Arc::new(AtomicBool::new(false));

    for name in ["first", "second", "third"] {
        let signaled = Arc::clone(&signaled);
        let early_body = Arc::clone(&early_body);
        scheduler
            .add_thread(ThreadDescriptor::new(name, Priority(2), 256, move || {
                *signaled.lock() += 1;
                signal_setup_complete().unwrap();
                if *signaled.lock() != 3 {
                    early_body.store(true, Ordering::SeqCst);
                }
            }))
            .unwrap();
    }

    scheduler.start_scheduler(true).unwrap();
    scheduler.wait_until_settled(SETTLE).unwrap();
    assert!(wait_for(|| scheduler
        .tasks()
        .iter()
        .all(|task| task.phase() == TaskPhase::Finished)));
    assert!(!early_body.load(Ordering::SeqCst));
}

#[test]
fn missing_signal_halts_bringup() {
    let config = SchedulerConfig::builder()
        .max_thread_init_timeout(Duration::from_millis(100))
        .thread_init_check_delay(Duration::from_millis(10))
        .build();
    let scheduler = Scheduler::new(config);

    let first_body = Arc::new(AtomicBool::new(false));
    let last_ran = Arc::new(AtomicBool::new(false));
    let (released_tx, released_rx) = mpsc::channel();

    let flag = Arc::clone(&first_body);
    scheduler
        .add_thread(ThreadDescriptor::new("first", Priority(2), 256, move || {
            let outcome = signal_setup_complete();
            let resumed = outcome.is_ok();
            let _ = released_tx.send(outcome);
            if resumed {
                flag.store(true, Ordering::SeqCst);
            }
        }))
        .unwrap();

    scheduler
        .add_thread(ThreadDescriptor::new("stuck", Priority(2), 256, || {
            // Never signals.
        }))
        .unwrap();

    let flag = Arc::clone(&last_ran);
    scheduler
        .add_thread(ThreadDescriptor::new("last", Priority(2), 256, move || {
            flag.store(true, Ordering::SeqCst);
        }))
        .unwrap();

    let started = Instant::now();
    scheduler.start_scheduler(true).unwrap();

    let outcome = scheduler.wait_until_settled(SETTLE);
    assert!(started.elapsed() >= Duration::from_millis(100));
    match outcome {
        Err(SchedulerError::Halted(HaltReason::SetupTimeout { thread, waited })) => {
            assert_eq!(thread, "stuck");
            // The limit itself is still tolerated; the next poll step halts.
            assert_eq!(waited, Duration::from_millis(110));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(matches!(scheduler.state(), SchedulerState::Halted(_)));

    // Give stray threads a chance to misbehave.
    std::thread::sleep(Duration::from_millis(50));

    let tasks = scheduler.tasks();
    assert_eq!(tasks[0].phase(), TaskPhase::SetupComplete);
    assert_eq!(tasks[0].resume_index(), None);
    assert!(!tasks[2].is_created());
    assert!(!first_body.load(Ordering::SeqCst));
    assert!(!last_ran.load(Ordering::SeqCst));

    let rejected = scheduler.add_thread(ThreadDescriptor::new("after", Priority(1), 128, || {}));
    assert!(matches!(rejected, Err(SchedulerError::Halted(_))));
    assert!(matches!(
        scheduler.start_scheduler(true),
        Err(SchedulerError::Halted(_))
    ));
    assert!(released_rx.try_recv().is_err());

    // Ending the scheduler releases the suspended task without resuming it.
    scheduler.end_scheduler();
    assert_eq!(scheduler.state(), SchedulerState::Ended);
    assert!(!scheduler.init_thread_active());
    match released_rx.recv_timeout(SETTLE) {
        Ok(Err(SchedulerError::TaskGone(name))) => assert_eq!(name, "first"),
        other => panic!("unexpected release: {:?}", other),
    }
    assert!(tasks[0].is_deleted());
    assert!(!first_body.load(Ordering::SeqCst));
    assert!(scheduler.tasks().is_empty());
    assert!(matches!(
        scheduler.wait_until_settled(SETTLE),
        Err(SchedulerError::Ended)
    ));
    assert!(matches!(
        scheduler.add_thread(ThreadDescriptor::new("late", Priority(1), 128, || {})),
        Err(SchedulerError::Ended)
    ));
}

#[test]
fn messages_round_trip_through_the_mailbox() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let (tx, rx) = mpsc::channel();

    let echo = scheduler
        .add_thread(ThreadDescriptor::new("echo", Priority(2), 256, move || {
            // 3 arrives first and is discarded.
            await_task_message(7).unwrap();
            let name = current_task().map(|task| task.name().to_string());
            tx.send(name).unwrap();
        }))
        .unwrap();

    assert!(matches!(
        scheduler.send_message(&echo, 7),
        Err(SchedulerError::TaskNotCreated(_))
    ));

    scheduler.start_scheduler(false).unwrap();
    scheduler.wait_until_settled(SETTLE).unwrap();
    assert!(wait_for(|| echo.is_created()));

    scheduler.send_message(&echo, 3).unwrap();
    scheduler.send_message_and_wait(&echo, 7).unwrap();
    assert_eq!(rx.recv_timeout(SETTLE).unwrap().as_deref(), Some("echo"));

    assert!(wait_for(|| echo.phase() == TaskPhase::Finished));
    assert!(matches!(
        scheduler.send_message(&echo, 1),
        Err(SchedulerError::TaskGone(_))
    ));
    assert!(matches!(
        scheduler.send_message_and_wait(&echo, 1),
        Err(SchedulerError::TaskGone(_))
    ));
}

#[test]
fn awaiting_a_message_times_out() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let (tx, rx) = mpsc::channel();

    let waiter = scheduler
        .add_thread(ThreadDescriptor::new("waiter", Priority(2), 256, move || {
            let started = Instant::now();
            let first = await_task_message_for(5, Duration::from_millis(30));
            tx.send((first, started.elapsed())).unwrap();
            let second = await_task_message_for(5, SETTLE);
            tx.send((second, started.elapsed())).unwrap();
        }))
        .unwrap();

    scheduler.start_scheduler(false).unwrap();

    let (first, elapsed) = rx.recv_timeout(SETTLE).unwrap();
    assert!(matches!(
        first,
        Err(SchedulerError::MessageTimeout(timeout)) if timeout == Duration::from_millis(30)
    ));
    assert!(elapsed >= Duration::from_millis(30));

    scheduler.send_message(&waiter, 5).unwrap();
    let (second, _) = rx.recv_timeout(SETTLE).unwrap();
    assert!(second.is_ok());
}

#[test]
fn awaiting_outside_a_task_fails() {
    assert!(matches!(
        await_task_message_for(1, Duration::from_millis(1)),
        Err(SchedulerError::NoScheduler)
    ));
}

#[test]
fn deleted_task_is_never_created() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let dropped_ran = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&dropped_ran);
    let dropped = scheduler
        .add_thread(ThreadDescriptor::new("dropped", Priority(2), 256, move || {
            flag.store(true, Ordering::SeqCst);
        }))
        .unwrap();
    let kept = scheduler
        .add_thread(ThreadDescriptor::new("kept", Priority(2), 256, || {
            signal_setup_complete().unwrap();
        }))
        .unwrap();

    scheduler.delete_thread(&dropped).unwrap();
    assert_eq!(scheduler.tasks(), vec![kept.clone()]);
    assert!(dropped.is_deleted());
    assert!(matches!(
        scheduler.delete_thread(&dropped),
        Err(SchedulerError::UnknownTask(_))
    ));

    scheduler.start_scheduler(true).unwrap();
    scheduler.wait_until_settled(SETTLE).unwrap();

    assert_eq!(kept.resume_index(), Some(0));
    assert!(!dropped.is_created());
    assert!(!dropped_ran.load(Ordering::SeqCst));
}

#[test]
fn deleting_a_running_task_closes_its_mailbox() {
    let scheduler = Scheduler::new(SchedulerConfig::default());
    let (tx, rx) = mpsc::channel();

    let worker = scheduler
        .add_thread(ThreadDescriptor::new("worker", Priority(2), 256, move || {
            tx.send(await_task_message(1)).unwrap();
        }))
        .unwrap();

    scheduler.start_scheduler(false).unwrap();
    scheduler.wait_until_settled(SETTLE).unwrap();
    assert!(wait_for(|| worker.is_created()));

    scheduler.delete_thread(&worker).unwrap();
    match rx.recv_timeout(SETTLE).unwrap() {
        Err(SchedulerError::TaskGone(name)) => assert_eq!(name, "worker"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(worker.is_deleted());
    assert!(scheduler.tasks().is_empty());
    assert!(matches!(
        scheduler.send_message(&worker, 1),
        Err(SchedulerError::UnknownTask(_))
    ));
}

#[test]
fn global_scheduler_is_shared() {
    let a = Scheduler::global();
    let b = Scheduler::global();
    assert!(std::ptr::eq(a, b));
    assert_eq!(a.config().max_thread_init_timeout, Duration::from_millis(1000));
}
