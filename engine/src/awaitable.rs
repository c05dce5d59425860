//! Protocol-erased awaitables.
//!
//! [`UniformAwaitable`] pairs the raw (possibly coerced) return value with
//! the resolved protocol hooks so callers can wait for completion without
//! knowing the concrete asynchronous type underneath. Produced once per
//! invocation, never reused across calls.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::mpsc;

use latebind_types::{Continuation, InvokeError, Value};

use crate::detect::{GET_AWAITER, IS_COMPLETED, ON_COMPLETED, ProtocolDescriptor};

/// A value that will eventually produce a result, with its protocol erased.
pub struct UniformAwaitable {
    value: Value,
    protocol: Arc<ProtocolDescriptor>,
}

impl std::fmt::Debug for UniformAwaitable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniformAwaitable")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl UniformAwaitable {
    pub(crate) fn new(value: Value, protocol: Arc<ProtocolDescriptor>) -> Self {
        Self { value, protocol }
    }

    /// Declared result type; `()` for awaitables that produce no value.
    #[must_use]
    pub fn result_type(&self) -> TypeId {
        self.protocol.result_type()
    }

    #[must_use]
    pub fn is_void_result(&self) -> bool {
        self.protocol.is_void_result()
    }

    /// Obtain the waiter, invoking the resolved get-waiter hook on the held
    /// concrete value exactly once.
    pub fn get_waiter(self) -> Result<UniformWaiter, InvokeError> {
        let receiver = self
            .value
            .as_dyn()
            .ok_or_else(|| InvokeError::Protocol {
                hook: GET_AWAITER,
                detail: "awaitable value is void".to_string(),
            })?;
        let waiter = (*self.protocol.get_waiter)(receiver, Vec::new())?;
        if waiter.type_id() != self.protocol.awaiter_type() {
            return Err(InvokeError::Protocol {
                hook: GET_AWAITER,
                detail: "hook produced a waiter of an unexpected type".to_string(),
            });
        }
        Ok(UniformWaiter {
            waiter,
            protocol: self.protocol,
        })
    }
}

/// Completion query, result retrieval, and continuation registration over
/// the concrete waiter, all through the cached hooks.
pub struct UniformWaiter {
    waiter: Value,
    protocol: Arc<ProtocolDescriptor>,
}

impl UniformWaiter {
    fn receiver(&self) -> Result<&dyn Any, InvokeError> {
        self.waiter.as_dyn().ok_or_else(|| InvokeError::Protocol {
            hook: GET_AWAITER,
            detail: "waiter value is void".to_string(),
        })
    }

    pub fn is_complete(&self) -> Result<bool, InvokeError> {
        let result = (*self.protocol.is_completed)(self.receiver()?, Vec::new())?;
        result.downcast::<bool>().map_err(|_| InvokeError::Protocol {
            hook: IS_COMPLETED,
            detail: "hook did not produce a boolean".to_string(),
        })
    }

    /// The completed result; a void marker for "no value" result types.
    pub fn get_result(&self) -> Result<Value, InvokeError> {
        (*self.protocol.get_result)(self.receiver()?, Vec::new())
    }

    /// Register a continuation via the basic, context-preserving hook.
    ///
    /// The continuation may run on an arbitrary thread once the underlying
    /// operation completes; the engine performs no synchronization of it.
    pub fn on_complete(&self, continuation: Continuation) -> Result<(), InvokeError> {
        (*self.protocol.on_completed)(self.receiver()?, vec![Value::new(continuation)])?;
        Ok(())
    }

    /// Register a continuation via the context-eliding hook when the waiter
    /// supports it, silently falling back to the basic hook otherwise. The
    /// fallback merely preserves context that nobody needed.
    pub fn on_complete_fast(&self, continuation: Continuation) -> Result<(), InvokeError> {
        let hook = self
            .protocol
            .unsafe_on_completed
            .as_ref()
            .unwrap_or(&self.protocol.on_completed);
        (*hook)(self.receiver()?, vec![Value::new(continuation)])?;
        Ok(())
    }

    /// Block the calling thread until completion, then retrieve the result.
    ///
    /// Caller-side convenience built on the hooks above; the engine still
    /// never schedules work of its own.
    pub fn wait(&self) -> Result<Value, InvokeError> {
        if !self.is_complete()? {
            let (tx, rx) = mpsc::channel();
            self.on_complete(Continuation::new(move || {
                let _ = tx.send(());
            }))?;
            if rx.recv().is_err() {
                return Err(InvokeError::Protocol {
                    hook: ON_COMPLETED,
                    detail: "completion continuation was dropped without running".to_string(),
                });
            }
        }
        self.get_result()
    }
}

#[cfg(test)]
mod tests {
    use crate::detect::ProtocolCache;
    use crate::native::{self, Task};
    use latebind_types::{Continuation, ShapeBuilder, ShapeRegistry, Value};
    use std::any::TypeId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::UniformAwaitable;

    fn wrap_task<T: Clone + Send + 'static>(task: Task<T>, name: &str) -> UniformAwaitable {
        let shapes = ShapeRegistry::new();
        native::register_task_shapes::<T>(&shapes, name).unwrap();
        let protocol = ProtocolCache::new()
            .resolve(&shapes, TypeId::of::<Task<T>>())
            .unwrap();
        UniformAwaitable::new(Value::new(task), protocol)
    }

    #[test]
    fn completion_observed_through_the_waiter() {
        let task = Task::pending();
        let waiter = wrap_task(task.clone(), "i32").get_waiter().unwrap();
        assert!(!waiter.is_complete().unwrap());
        task.complete(11_i32);
        assert!(waiter.is_complete().unwrap());
        assert_eq!(waiter.get_result().unwrap().downcast::<i32>().unwrap(), 11);
    }

    #[test]
    fn void_result_type_still_yields_a_marker() {
        let task = Task::ready(());
        let awaitable = wrap_task(task, "()");
        assert!(awaitable.is_void_result());
        let waiter = awaitable.get_waiter().unwrap();
        assert!(waiter.get_result().unwrap().is_void());
    }

    #[test]
    fn on_complete_delivers_after_completion() {
        let task = Task::pending();
        let waiter = wrap_task(task.clone(), "i32").get_waiter().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        waiter
            .on_complete(Continuation::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        task.complete(1_i32);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fast_path_uses_unsafe_hook_when_available() {
        let task = Task::pending();
        let awaitable = wrap_task(task.clone(), "i32");
        assert!(awaitable.protocol.has_fast_path());
        let waiter = awaitable.get_waiter().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        waiter
            .on_complete_fast(Continuation::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        task.complete(1_i32);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fast_path_falls_back_to_basic_hook_and_delivers_once() {
        // A conformant waiter that never advertises the unsafe hook.
        struct Plain(Task<i32>);
        struct PlainWaiter(Task<i32>);

        let shapes = ShapeRegistry::new();
        shapes
            .register(
                ShapeBuilder::<Plain>::new("Plain")
                    .op0("get_awaiter", |p: &Plain| PlainWaiter(p.0.clone()))
                    .build(),
            )
            .unwrap();
        shapes
            .register(
                ShapeBuilder::<PlainWaiter>::new("PlainWaiter")
                    .op0("is_completed", |w: &PlainWaiter| w.0.waiter().is_completed())
                    .try_op0("get_result", |w: &PlainWaiter| w.0.waiter().get_result())
                    .op1("on_completed", |w: &PlainWaiter, k: Continuation| {
                        w.0.waiter().on_completed(k);
                    })
                    .build(),
            )
            .unwrap();

        let protocol = ProtocolCache::new()
            .resolve(&shapes, TypeId::of::<Plain>())
            .unwrap();
        assert!(!protocol.has_fast_path());

        let task = Task::pending();
        let waiter = UniformAwaitable::new(Value::new(Plain(task.clone())), protocol)
            .get_waiter()
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        waiter
            .on_complete_fast(Continuation::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        task.complete(5_i32);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_blocks_until_another_thread_completes() {
        let task = Task::pending();
        let waiter = wrap_task(task.clone(), "String").get_waiter().unwrap();
        let completer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            task.complete("late".to_string());
        });
        let result = waiter.wait().unwrap();
        assert_eq!(result.downcast::<String>().unwrap(), "late");
        completer.join().unwrap();
    }

    #[test]
    fn wait_returns_immediately_when_already_complete() {
        let waiter = wrap_task(Task::ready(3_i32), "i32").get_waiter().unwrap();
        assert_eq!(waiter.wait().unwrap().downcast::<i32>().unwrap(), 3);
    }
}
