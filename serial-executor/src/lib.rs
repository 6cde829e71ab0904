//! A single-threaded executor built on a serial callback queue.
//!
//! An [`Executor`] owns a serial queue holding plain callback jobs queued with
//! [`Executor::exec_async`] and the runnables of tasks spawned with [`Executor::spawn_local`].
//! Entries run in the order they were queued. Nothing runs until the owner pumps the executor
//! with [`run_one()`][Executor::run_one], [`run_until_idle()`][Executor::run_until_idle] or
//! [`run_until()`][Executor::run_until], so every job and every poll happens on the owning
//! thread, one at a time.
//!
//! # Example
//!
//! ```
//! use serial_executor::Executor;
//!
//! let executor = Executor::new();
//!
//! let task = executor.spawn_local(async {
//!     println!("Hello, world!");
//!     42
//! });
//!
//! assert_eq!(executor.run_until(task), Some(42));
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_task::Runnable;

type Job = Box<dyn FnOnce()>;

/// An executor that runs callback jobs and async tasks on a serial queue.
///
/// Cloning an `Executor` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct Executor {
    jobs: Rc<RefCell<VecDeque<(u64, Job)>>>,
    runnables: Arc<Mutex<VecDeque<(u64, Runnable)>>>,
    sequence: Arc<AtomicU64>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("jobs", &self.jobs.borrow().len())
            .field("runnables", &self.lock_runnables().len())
            .finish()
    }
}

impl Executor {
    /// Creates an executor with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` to run after every job queued before it.
    pub fn exec_async(&self, job: impl FnOnce() + 'static) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.jobs.borrow_mut().push_back((seq, Box::new(job)));
    }

    /// Spawns a `!Send` future on this executor, returning a [`Task`] that can be used to await
    /// its result.
    ///
    /// Dropping the `Task` will cancel it. If you want the task to run independently, you must
    /// call [`detach()`][Task::detach].
    pub fn spawn_local<R>(&self, future: impl Future<Output = R> + 'static) -> Task<R>
    where
        R: 'static,
    {
        let runnables = self.runnables.clone();
        let sequence = self.sequence.clone();
        let (runnable, task) = async_task::spawn_local(future, move |runnable: Runnable| {
            let seq = sequence.fetch_add(1, Ordering::Relaxed);
            runnables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back((seq, runnable));
        });
        runnable.schedule();
        Task(TaskState::Spawned(task))
    }

    /// Runs the oldest queued entry, either a job or a task poll.
    ///
    /// Returns `false` if there was nothing to run.
    pub fn run_one(&self) -> bool {
        let next_runnable = self.lock_runnables().front().map(|(seq, _)| *seq);
        let next_job = self.jobs.borrow().front().map(|(seq, _)| *seq);

        let run_job = match (next_runnable, next_job) {
            (None, None) => return false,
            (Some(runnable), Some(job)) => job < runnable,
            (None, Some(_)) => true,
            (Some(_), None) => false,
        };

        if run_job {
            let job = self.jobs.borrow_mut().pop_front();
            if let Some((_, job)) = job {
                job();
            }
        } else {
            let runnable = self.lock_runnables().pop_front();
            if let Some((_, runnable)) = runnable {
                runnable.run();
            }
        }
        true
    }

    /// Runs jobs and task polls until both queues are empty, returning how many were run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        count
    }

    /// Spawns `future` and pumps the queues until it completes.
    ///
    /// Returns `None` if the queues drained while the future was still pending, meaning nothing
    /// left on this executor can wake it. The future is cancelled in that case.
    pub fn run_until<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let task = self.spawn_local(future);
        while !task.is_finished() {
            if !self.run_one() {
                return None;
            }
        }
        Some(futures_lite::future::block_on(task))
    }

    /// Returns `true` if no job or task poll is waiting to run.
    pub fn is_idle(&self) -> bool {
        self.jobs.borrow().is_empty() && self.lock_runnables().is_empty()
    }

    fn lock_runnables(&self) -> MutexGuard<'_, VecDeque<(u64, Runnable)>> {
        self.runnables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
enum TaskState<T> {
    Ready(Option<T>),
    Spawned(async_task::Task<T>),
}

/// A future that resolves to the result of an asynchronous task.
///
/// Dropping a [`Task`] cancels it, which means its future won't be polled again. To drop the
/// [`Task`] handle without canceling it, use [`detach()`][`Task::detach()`] instead.
#[derive(Debug)]
pub struct Task<T>(TaskState<T>);

// The output is moved out, never pinned.
impl<T> Unpin for Task<T> {}

impl<T> Task<T> {
    /// Creates a new task that is already completed with the given value.
    pub fn ready(val: T) -> Self {
        Task(TaskState::Ready(Some(val)))
    }

    /// Detaches the task, allowing it to run in the background.
    pub fn detach(self) {
        match self {
            Task(TaskState::Ready(_)) => (),
            Task(TaskState::Spawned(task)) => task.detach(),
        }
    }

    /// Returns `true` if the task has produced its output.
    pub fn is_finished(&self) -> bool {
        match &self.0 {
            TaskState::Ready(val) => val.is_some(),
            TaskState::Spawned(task) => task.is_finished(),
        }
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        match &mut self.get_mut().0 {
            TaskState::Ready(val) => match val.take() {
                Some(val) => Poll::Ready(val),
                None => Poll::Pending,
            },
            TaskState::Spawned(task) => Pin::new(task).poll(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[test]
    fn jobs_run_in_queue_order() {
        let executor = Executor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            executor.exec_async(move || log.borrow_mut().push(i));
        }

        assert!(log.borrow().is_empty());
        assert_eq!(executor.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(executor.is_idle());
    }

    #[test]
    fn jobs_queued_from_jobs_run_later() {
        let executor = Executor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let inner = executor.clone();
            let log = log.clone();
            executor.exec_async(move || {
                log.borrow_mut().push("outer");
                let log = log.clone();
                inner.exec_async(move || log.borrow_mut().push("inner"));
            });
        }
        {
            let log = log.clone();
            executor.exec_async(move || log.borrow_mut().push("sibling"));
        }

        executor.run_until_idle();
        assert_eq!(*log.borrow(), vec!["outer", "sibling", "inner"]);
    }

    #[test]
    fn run_until_interleaves_tasks_and_jobs() {
        let executor = Executor::new();
        let value = Rc::new(Cell::new(None));
        {
            let value = value.clone();
            executor.exec_async(move || value.set(Some(7)));
        }

        let result = executor.run_until(async move {
            while value.get().is_none() {
                futures_lite::future::yield_now().await;
            }
            value.get().unwrap_or_default() * 6
        });
        assert_eq!(result, Some(42));
    }

    #[test]
    fn run_until_reports_a_stalled_future() {
        let executor = Executor::new();
        let result = executor.run_until(futures_lite::future::pending::<()>());
        assert_eq!(result, None);
    }

    #[test]
    fn detached_tasks_keep_running() {
        let executor = Executor::new();
        let done = Rc::new(Cell::new(false));
        {
            let done = done.clone();
            executor
                .spawn_local(async move {
                    futures_lite::future::yield_now().await;
                    done.set(true);
                })
                .detach();
        }

        executor.run_until_idle();
        assert!(done.get());
    }

    #[test]
    fn ready_task_resolves_immediately() {
        let task = Task::ready("done");
        assert!(task.is_finished());
        assert_eq!(futures_lite::future::block_on(task), "done");
    }
}
