//! Bounded executor pool for CPU/IO-heavy work
//!
//! Bounds how many extraction or tag-editing jobs run concurrently, queuing
//! excess work in FIFO order. Dispatch happens on `submit` and again whenever
//! an executor finishes, so queued work drains as soon as capacity frees up
//! without any external polling.
//!
//! Each task runs in its own spawned executor with a panic guard; a crashing
//! or misbehaving task surfaces an error through its result channel and
//! cannot affect other queued or active tasks.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Executes one task to completion
///
/// Implementations match on the task variant and perform the actual work
/// (invoking the external extraction tool, editing tags, ...). The pool
/// treats the task as opaque beyond success or failure.
#[async_trait]
pub trait TaskRunner<T>: Send + Sync + 'static {
    /// Run a single task
    async fn run(&self, task: T) -> Result<()>;
}

struct QueuedTask<T> {
    task: T,
    result_tx: oneshot::Sender<Result<()>>,
}

struct PoolState<T> {
    queue: VecDeque<QueuedTask<T>>,
    active: usize,
}

/// FIFO task pool with a hard bound on concurrently active executors
pub struct WorkerPool<T> {
    runner: Arc<dyn TaskRunner<T>>,
    max_workers: usize,
    state: Mutex<PoolState<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool running at most `max_workers` tasks at once
    pub fn new(max_workers: usize, runner: Arc<dyn TaskRunner<T>>) -> Self {
        Self {
            runner,
            max_workers: max_workers.max(1),
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
            }),
        }
    }

    /// Maximum number of concurrently active executors
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of executors currently running
    pub fn active_workers(&self) -> usize {
        self.lock_state().active
    }

    /// Number of tasks waiting for a free executor
    pub fn queued_tasks(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Queue a task and return the channel its result will arrive on
    ///
    /// The task starts immediately if an executor slot is free, otherwise it
    /// waits its turn in submission order. Every submitted task eventually
    /// receives exactly one result.
    pub fn submit(self: &Arc<Self>, task: T) -> oneshot::Receiver<Result<()>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.lock_state()
            .queue
            .push_back(QueuedTask { task, result_tx });
        self.dispatch();
        result_rx
    }

    /// Submit a task and await its result
    pub async fn execute(self: &Arc<Self>, task: T) -> Result<()> {
        match self.submit(task).await {
            Ok(result) => result,
            // The executor dropped the channel without sending, which only
            // happens if its task was aborted mid-flight (runtime shutdown)
            Err(_) => Err(Error::Other(
                "executor dropped its result channel".to_string(),
            )),
        }
    }

    /// Pop tasks off the queue head and start executors until the queue is
    /// empty or every worker slot is taken
    fn dispatch(self: &Arc<Self>) {
        loop {
            let queued = {
                let mut state = self.lock_state();
                if state.active >= self.max_workers {
                    break;
                }
                let Some(queued) = state.queue.pop_front() else {
                    break;
                };
                state.active += 1;
                queued
            };

            let pool = Arc::clone(self);
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                let outcome = std::panic::AssertUnwindSafe(runner.run(queued.task))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(Error::Other(panic_message(panic))));

                // Release the slot before delivering the result, so a caller
                // that awaited the result observes the freed capacity
                pool.lock_state().active -= 1;

                // Receiver may have been dropped if the submitter gave up;
                // the slot is released either way
                queued.result_tx.send(outcome).ok();

                pool.dispatch();
            });
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<T>> {
        // A poisoned lock means a panic while holding the guard; the state
        // itself (a counter and a queue) is still structurally valid
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("executor panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("executor panicked: {message}")
    } else {
        "executor panicked".to_string()
    }
}
