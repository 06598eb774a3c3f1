// Task lifecycle tests
// Run, completion, failure, cancellation and repeated starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use stagebuf::{BoxError, CancellationToken, Error, Task, TaskState};

/// Process that spins until its token is cancelled.
fn until_cancelled(stopped: Arc<AtomicBool>) -> impl FnOnce(CancellationToken) -> Result<u32, BoxError> {
    move |token| {
        while !token.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }
        stopped.store(true, Ordering::SeqCst);
        Ok(0)
    }
}

fn wait_for(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// =============================================================================
// Test 1: A finished process yields its value
// =============================================================================
#[test]
fn run_completes_with_value() {
    let task = Task::new(|_token| Ok(42u32));
    assert_eq!(task.state(), TaskState::Created);

    task.run(&CancellationToken::new()).unwrap();
    assert_eq!(task.outcome().unwrap(), 42);
    assert_eq!(task.state(), TaskState::Completed);
}

// =============================================================================
// Test 2: A process error becomes TaskFailed
// =============================================================================
#[test]
fn failing_process_is_failed() {
    let task: Task<u32> = Task::new(|_token| Err("disk on fire".into()));
    task.run(&CancellationToken::new()).unwrap();

    match task.outcome() {
        Err(Error::TaskFailed(err)) => assert_eq!(err.to_string(), "disk on fire"),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(task.state(), TaskState::Failed);
}

// =============================================================================
// Test 3: Close cancels a running process
// =============================================================================
#[test]
fn close_cancels_running_task() {
    let stopped = Arc::new(AtomicBool::new(false));
    let task = Task::new(until_cancelled(Arc::clone(&stopped)));
    task.run(&CancellationToken::new()).unwrap();
    assert_eq!(task.state(), TaskState::Running);

    task.close();
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(matches!(task.outcome(), Err(Error::Cancelled)));
    assert!(wait_for(|| stopped.load(Ordering::SeqCst)));
    // The process's late Ok(0) is discarded
    assert_eq!(task.state(), TaskState::Cancelled);
}

// =============================================================================
// Test 4: Cancelling the parent token reaches the process
// =============================================================================
#[test]
fn parent_cancellation_propagates() {
    let parent = CancellationToken::new();
    let stopped = Arc::new(AtomicBool::new(false));
    let task = Task::new(until_cancelled(Arc::clone(&stopped)));
    task.run(&parent).unwrap();

    parent.cancel();
    assert!(matches!(task.outcome(), Err(Error::Cancelled)));
    assert!(stopped.load(Ordering::SeqCst));
}

// =============================================================================
// Test 5: A task runs at most once
// =============================================================================
#[test]
fn second_run_is_rejected() {
    let task = Task::new(|_token| Ok(1u32));
    let parent = CancellationToken::new();
    task.run(&parent).unwrap();
    task.outcome().unwrap();

    assert!(matches!(task.run(&parent), Err(Error::TaskAlreadyStarted)));
    assert_eq!(task.state(), TaskState::Completed);
}

// =============================================================================
// Test 6: Closing before running leaves a cancelled task that cannot start
// =============================================================================
#[test]
fn close_before_run() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let task = Task::new(move |_token| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    task.close();
    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(matches!(task.run(&CancellationToken::new()), Err(Error::TaskAlreadyStarted)));
    assert!(!ran.load(Ordering::SeqCst));
}

// =============================================================================
// Test 7: Close after completion keeps the result
// =============================================================================
#[test]
fn close_after_completion_is_noop() {
    let task = Task::new(|_token| Ok("done".to_string()));
    task.run(&CancellationToken::new()).unwrap();
    assert_eq!(task.outcome().unwrap(), "done");

    task.close();
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(task.outcome().unwrap(), "done");
}

// =============================================================================
// Test 8: A panicking process still reaches a final state
// =============================================================================
#[test]
fn panicking_process_is_failed() {
    let task: Task<u32> = Task::new(|_token| panic!("boom"));
    task.run(&CancellationToken::new()).unwrap();

    match task.outcome() {
        Err(Error::TaskFailed(err)) => assert!(err.to_string().contains("boom")),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(task.state(), TaskState::Failed);
}
