//! Opaque values and continuations for late-bound calls.

use std::any::{Any, TypeId};
use std::fmt;

/// An opaque value crossing a late-bound call boundary.
///
/// Either a boxed `dyn Any + Send` payload or an explicit void marker.
/// `Value::new(())` normalizes to void so "returns nothing" and "returns
/// unit" are the same observable outcome.
pub struct Value {
    inner: Option<Box<dyn Any + Send>>,
}

impl Value {
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        if TypeId::of::<T>() == TypeId::of::<()>() {
            return Self::void();
        }
        Self {
            inner: Some(Box::new(value)),
        }
    }

    /// The "no value" marker returned by void methods.
    #[must_use]
    pub const fn void() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.inner.is_none()
    }

    /// Type identity of the payload; void reports as `()`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.inner
            .as_deref()
            .map_or(TypeId::of::<()>(), |boxed| Any::type_id(boxed))
    }

    /// Take the payload out by concrete type. On mismatch (or void) the
    /// value is handed back untouched.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.inner {
            Some(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Self { inner: Some(boxed) }),
            },
            None => Err(Self::void()),
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner
            .as_deref()
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Borrow the payload as a shared receiver for an erased operation.
    /// Returns `None` for void.
    #[must_use]
    pub fn as_dyn(&self) -> Option<&dyn Any> {
        self.inner.as_deref().map(|boxed| boxed as &dyn Any)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(boxed) => write!(f, "Value({:?})", (**boxed).type_id()),
            None => write!(f, "Value(void)"),
        }
    }
}

/// A zero-argument completion callback.
///
/// The single parameter type accepted by notify-on-completion operations.
/// May run on an arbitrary thread once the underlying operation completes;
/// the engine performs no synchronization on the callback's behalf.
pub struct Continuation(Box<dyn FnOnce() + Send>);

impl Continuation {
    #[must_use]
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)();
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation")
    }
}

#[cfg(test)]
mod tests {
    use super::{Continuation, Value};
    use std::any::TypeId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn new_unit_normalizes_to_void() {
        let value = Value::new(());
        assert!(value.is_void());
        assert_eq!(value.type_id(), TypeId::of::<()>());
    }

    #[test]
    fn downcast_round_trips_payload() {
        let value = Value::new(String::from("ok"));
        assert_eq!(value.type_id(), TypeId::of::<String>());
        assert_eq!(value.downcast::<String>().unwrap(), "ok");
    }

    #[test]
    fn downcast_mismatch_returns_value_intact() {
        let value = Value::new(5_i32);
        let back = value.downcast::<String>().unwrap_err();
        assert_eq!(back.downcast::<i32>().unwrap(), 5);
    }

    #[test]
    fn downcast_ref_borrows_payload() {
        let value = Value::new(5_i32);
        assert_eq!(value.downcast_ref::<i32>(), Some(&5));
        assert_eq!(value.downcast_ref::<String>(), None);
    }

    #[test]
    fn void_has_no_receiver() {
        assert!(Value::void().as_dyn().is_none());
    }

    #[test]
    fn continuation_runs_once_when_driven() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let continuation = Continuation::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        continuation.run();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
