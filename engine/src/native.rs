//! A natively-awaitable completion cell.
//!
//! [`Task`] is the concrete asynchronous type coercion adapters convert
//! foreign values into, and the reference implementation of the awaitable
//! protocol. It is a thread-safe completion cell: anything may complete it
//! (a std thread via [`Task::spawn`], a callback, test code calling
//! [`Task::complete`] directly), and queued continuations run on whichever
//! thread completes it.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::bail;
use latebind_types::{Continuation, InvokeError, ShapeBuilder, ShapeRegistry};

struct TaskState<T> {
    result: Option<T>,
    continuations: Vec<Continuation>,
}

/// A future result backed by a completion cell.
pub struct Task<T> {
    state: Arc<Mutex<TaskState<T>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// A task that has not completed yet.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            state: Arc::new(Mutex::new(TaskState {
                result: None,
                continuations: Vec::new(),
            })),
        }
    }

    /// A task that is already complete.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let task = Self::pending();
        task.complete(value);
        task
    }

    /// Run `f` on a new thread and complete the task with its result.
    #[must_use]
    pub fn spawn(f: impl FnOnce() -> T + Send + 'static) -> Self {
        let task = Self::pending();
        let handle = task.clone();
        thread::spawn(move || {
            handle.complete(f());
        });
        task
    }

    /// Complete the task, running queued continuations on the calling
    /// thread. Returns `false` (and does nothing) if already complete.
    pub fn complete(&self, value: T) -> bool {
        let runnable = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.result.is_some() {
                return false;
            }
            state.result = Some(value);
            std::mem::take(&mut state.continuations)
        };
        // Run outside the lock: a continuation may touch the task again.
        for continuation in runnable {
            continuation.run();
        }
        true
    }

    #[must_use]
    pub fn waiter(&self) -> TaskWaiter<T> {
        TaskWaiter {
            state: Arc::clone(&self.state),
        }
    }
}

/// Waiter half of a [`Task`]: completion query, result retrieval, and
/// continuation registration.
pub struct TaskWaiter<T> {
    state: Arc<Mutex<TaskState<T>>>,
}

impl<T: Clone + Send + 'static> TaskWaiter<T> {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .result
            .is_some()
    }

    /// The completed result. Callers must observe completion first, via
    /// [`Self::is_completed`] or a registered continuation.
    pub fn get_result(&self) -> anyhow::Result<T> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.result {
            Some(value) => Ok(value.clone()),
            None => bail!("task result retrieved before completion"),
        }
    }

    /// Register a continuation. Runs inline on the calling thread if the
    /// task is already complete, otherwise queued and run by whichever
    /// thread completes the task.
    pub fn on_completed(&self, continuation: Continuation) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.result.is_none() {
                state.continuations.push(continuation);
                return;
            }
        }
        continuation.run();
    }
}

/// Publish the [`Task<T>`] / [`TaskWaiter<T>`] shapes for one result type.
///
/// The waiter registers `unsafe_on_completed` as well: registration never
/// captures ambient context here, so the basic hook already is the
/// context-eliding one.
pub fn register_task_shapes<T: Clone + Send + Any>(
    shapes: &ShapeRegistry,
    result_name: &str,
) -> Result<(), InvokeError> {
    shapes.register(
        ShapeBuilder::<Task<T>>::new(format!("Task<{result_name}>"))
            .op0("get_awaiter", Task::<T>::waiter)
            .build(),
    )?;
    shapes.register(
        ShapeBuilder::<TaskWaiter<T>>::new(format!("TaskWaiter<{result_name}>"))
            .op0("is_completed", TaskWaiter::<T>::is_completed)
            .try_op0("get_result", TaskWaiter::<T>::get_result)
            .op1("on_completed", |w: &TaskWaiter<T>, k: Continuation| {
                w.on_completed(k);
            })
            .op1(
                "unsafe_on_completed",
                |w: &TaskWaiter<T>, k: Continuation| w.on_completed(k),
            )
            .build(),
    )
}
