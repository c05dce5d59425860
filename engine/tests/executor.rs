//! End-to-end invocation scenarios through the public API.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use latebind_engine::native::{self, Task};
use latebind_engine::{
    Continuation, Executor, InvokeError, OpCoercion, ShapeBuilder, ShapeRegistry, Value,
};

/// A repository-style service with synchronous, asynchronous, and foreign
/// asynchronous methods.
struct Store;

/// Foreign asynchronous type convertible to a native task.
struct Deferred(Task<String>);

/// Foreign asynchronous type with no registered conversion.
struct Opaque;

fn store_shapes() -> Arc<ShapeRegistry> {
    let shapes = Arc::new(ShapeRegistry::new());
    native::register_task_shapes::<String>(&shapes, "String").unwrap();
    shapes
        .register(
            ShapeBuilder::<Deferred>::new("Deferred")
                .op0("into_awaitable", |d: &Deferred| d.0.clone())
                .build(),
        )
        .unwrap();
    shapes
        .register(ShapeBuilder::<Opaque>::new("Opaque").build())
        .unwrap();
    shapes
        .register(
            ShapeBuilder::<Store>::new("Store")
                .op1("label", |_s: &Store, id: i32| format!("item {id}"))
                .op0("flush", |_s: &Store| ())
                .op1("load", |_s: &Store, id: i32| {
                    Task::spawn(move || {
                        thread::sleep(Duration::from_millis(10));
                        format!("row {id}")
                    })
                })
                .op0("load_deferred", |_s: &Store| {
                    Deferred(Task::ready("converted".to_string()))
                })
                .op0("load_opaque", |_s: &Store| Opaque)
                .try_op0("fail", |_s: &Store| -> anyhow::Result<String> {
                    anyhow::bail!("store unavailable")
                })
                .build(),
        )
        .unwrap();
    shapes
}

fn executor() -> Executor {
    Executor::builder()
        .shapes(store_shapes())
        .coercion(Box::new(OpCoercion::into_awaitable()))
        .build()
}

#[test]
fn async_method_completes_on_another_thread() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("load").unwrap();
    assert!(executor.is_awaitable(&descriptor));

    let awaitable = executor
        .execute_async(&descriptor, &Store, vec![Value::new(5_i32)])
        .unwrap();
    let waiter = awaitable.get_waiter().unwrap();
    let result = waiter.wait().unwrap();
    assert!(waiter.is_complete().unwrap());
    assert_eq!(result.downcast::<String>().unwrap(), "row 5");
}

#[test]
fn completion_state_transitions_through_the_waiter() {
    let shapes = store_shapes();
    let task: Task<String> = Task::pending();
    let handle = task.clone();
    shapes
        .register(
            ShapeBuilder::<u8>::new("Trigger")
                .op0("start", move |_t: &u8| handle.clone())
                .build(),
        )
        .unwrap();

    let executor = Executor::new(shapes);
    let descriptor = executor.resolve::<u8>("start").unwrap();
    let waiter = executor
        .execute_async(&descriptor, &0_u8, Vec::new())
        .unwrap()
        .get_waiter()
        .unwrap();

    assert!(!waiter.is_complete().unwrap());
    task.complete("ok".to_string());
    assert!(waiter.is_complete().unwrap());
    assert_eq!(
        waiter.get_result().unwrap().downcast::<String>().unwrap(),
        "ok"
    );
}

#[test]
fn coerced_and_native_awaitables_are_observably_identical() {
    let executor = executor();

    let direct = executor.resolve::<Store>("load").unwrap();
    let coerced = executor.resolve::<Store>("load_deferred").unwrap();
    assert!(executor.is_awaitable(&direct));
    assert!(executor.is_awaitable(&coerced));

    let waiter = executor
        .execute_async(&coerced, &Store, Vec::new())
        .unwrap()
        .get_waiter()
        .unwrap();
    assert!(waiter.is_complete().unwrap());
    assert_eq!(
        waiter.wait().unwrap().downcast::<String>().unwrap(),
        "converted"
    );
}

#[test]
fn unconvertible_return_type_stays_synchronous() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("load_opaque").unwrap();
    assert!(!executor.is_awaitable(&descriptor));

    let err = executor
        .execute_async(&descriptor, &Store, Vec::new())
        .unwrap_err();
    assert!(matches!(err, InvokeError::UnsupportedOperation { .. }));

    // The direct path still hands back the raw value.
    let raw = executor.execute(&descriptor, &Store, Vec::new()).unwrap();
    assert!(raw.downcast::<Opaque>().is_ok());
}

#[test]
fn void_method_returns_the_void_marker() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("flush").unwrap();
    let result = executor.execute(&descriptor, &Store, Vec::new()).unwrap();
    assert!(result.is_void());
}

#[test]
fn direct_execution_of_an_async_method_returns_the_raw_awaitable() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("load").unwrap();
    let raw = executor
        .execute(&descriptor, &Store, vec![Value::new(9_i32)])
        .unwrap();
    let task = raw.downcast::<Task<String>>().unwrap();

    let waiter = task.waiter();
    let (tx, rx) = mpsc::channel();
    waiter.on_completed(Continuation::new(move || {
        let _ = tx.send(());
    }));
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(waiter.get_result().unwrap(), "row 9");
}

#[test]
fn synchronous_invocation_checks_arguments() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("label").unwrap();

    let ok = executor
        .execute(&descriptor, &Store, vec![Value::new(3_i32)])
        .unwrap();
    assert_eq!(ok.downcast::<String>().unwrap(), "item 3");

    let err = executor
        .execute(&descriptor, &Store, vec![Value::new("three".to_string())])
        .unwrap_err();
    assert!(matches!(err, InvokeError::InvalidArgument { .. }));
}

#[test]
fn application_errors_surface_with_their_message() {
    let executor = executor();
    let descriptor = executor.resolve::<Store>("fail").unwrap();
    let err = executor.execute(&descriptor, &Store, Vec::new()).unwrap_err();
    assert!(matches!(err, InvokeError::Application(_)));
    assert!(err.to_string().contains("store unavailable"));
}
