//! Late-bound invocation with asynchronous-result normalization.
//!
//! Given a target instance and a [`MethodDescriptor`] resolved against the
//! shape registry, the engine invokes the method without compile-time
//! knowledge of its signature and, when the return type satisfies the
//! duck-typed awaitable protocol (directly or through a registered
//! coercion), wraps the result in a protocol-erased [`UniformAwaitable`].
//!
//! The engine itself is synchronous and thread-agnostic: it never creates
//! threads or schedules work, it only exposes a uniform way to observe
//! completion of whatever asynchronous machinery the invoked method uses.
//!
//! ```
//! use latebind_engine::{Executor, ShapeBuilder, ShapeRegistry, Value};
//! use latebind_engine::native::{self, Task};
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! let shapes = Arc::new(ShapeRegistry::new());
//! native::register_task_shapes::<String>(&shapes, "String").unwrap();
//! shapes
//!     .register(
//!         ShapeBuilder::<Greeter>::new("Greeter")
//!             .op1("greet", |_g: &Greeter, name: String| Task::ready(format!("hi {name}")))
//!             .build(),
//!     )
//!     .unwrap();
//!
//! let executor = Executor::new(Arc::clone(&shapes));
//! let descriptor = executor.resolve::<Greeter>("greet").unwrap();
//! let awaitable = executor
//!     .execute_async(&descriptor, &Greeter, vec![Value::new(String::from("ada"))])
//!     .unwrap();
//! let waiter = awaitable.get_waiter().unwrap();
//! assert_eq!(waiter.wait().unwrap().downcast::<String>().unwrap(), "hi ada");
//! ```

pub mod awaitable;
pub mod coerce;
pub mod detect;
pub mod executor;
pub mod invoker;
pub mod native;

pub use awaitable::{UniformAwaitable, UniformWaiter};
pub use coerce::{CoercionAdapter, CoercionDescriptor, CoercionRegistry, OpCoercion};
pub use detect::{ProtocolCache, ProtocolDescriptor};
pub use executor::{Executor, ExecutorBuilder};
pub use invoker::{Invoker, MethodDescriptor};
pub use latebind_types::{
    Continuation, ErasedOp, InvokeError, OpShape, ShapeBuilder, ShapeRegistry, TypeShape, Value,
};
