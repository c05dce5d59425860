//! Type-shape metadata: the single source of truth for what operations a
//! registered type exposes at runtime.
//!
//! Rust has no runtime reflection, so anything invoked late-bound must first
//! publish a [`TypeShape`]: its name plus a table of operations, each carrying
//! the parameter/return type identities and an erased caller. Downstream code
//! (method resolution, awaitable-protocol detection) works purely against
//! these tables and never re-inspects concrete types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::InvokeError;
use crate::value::Value;

/// An erased operation: shared receiver plus positional arguments.
///
/// Receivers are shared references; concrete types that mutate on a call
/// (completion cells, lazily started work) use interior mutability.
pub type ErasedOp =
    Arc<dyn Fn(&dyn Any, Vec<Value>) -> Result<Value, InvokeError> + Send + Sync>;

/// One operation on a registered type.
pub struct OpShape {
    pub name: &'static str,
    /// Positional parameter types, receiver excluded.
    pub params: Vec<TypeId>,
    /// Return type; `TypeId::of::<()>()` means void.
    pub returns: TypeId,
    pub call: ErasedOp,
}

impl OpShape {
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.returns == TypeId::of::<()>()
    }
}

/// A registered type: identity, display name, and operation table.
pub struct TypeShape {
    type_id: TypeId,
    name: String,
    ops: Vec<OpShape>,
}

impl TypeShape {
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ops(&self) -> &[OpShape] {
        &self.ops
    }

    /// Exact-name lookup, used for method resolution.
    #[must_use]
    pub fn op(&self, name: &str) -> Option<&OpShape> {
        self.ops.iter().find(|op| op.name == name)
    }
}

fn expect_arity(op: &'static str, args: &[Value], expected: usize) -> Result<(), InvokeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(InvokeError::InvalidArgument {
            detail: format!(
                "op `{op}` expects {expected} argument(s), got {}",
                args.len()
            ),
        })
    }
}

fn downcast_receiver<'a, T: Any>(
    op: &'static str,
    receiver: &'a dyn Any,
) -> Result<&'a T, InvokeError> {
    receiver
        .downcast_ref::<T>()
        .ok_or_else(|| InvokeError::InvalidArgument {
            detail: format!("op `{op}` called with a receiver of the wrong type"),
        })
}

fn take_arg<A: Any>(op: &'static str, index: usize, args: &mut Vec<Value>) -> Result<A, InvokeError> {
    args.remove(0)
        .downcast::<A>()
        .map_err(|_| InvokeError::InvalidArgument {
            detail: format!("op `{op}`: argument {index} has an unexpected type"),
        })
}

/// Builds a [`TypeShape`] for `T` out of typed closures.
///
/// The fallible `try_op*` variants accept `anyhow::Result` returns; failures
/// surface to callers untranslated through [`InvokeError::Application`].
pub struct ShapeBuilder<T: Any> {
    name: String,
    ops: Vec<OpShape>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Any> ShapeBuilder<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn op0<R, F>(self, name: &'static str, f: F) -> Self
    where
        R: Any + Send,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        self.try_op0(name, move |recv: &T| Ok(f(recv)))
    }

    #[must_use]
    pub fn try_op0<R, F>(mut self, name: &'static str, f: F) -> Self
    where
        R: Any + Send,
        F: Fn(&T) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let call: ErasedOp = Arc::new(move |receiver, args| {
            expect_arity(name, &args, 0)?;
            let receiver = downcast_receiver::<T>(name, receiver)?;
            f(receiver).map(Value::new).map_err(InvokeError::Application)
        });
        self.ops.push(OpShape {
            name,
            params: Vec::new(),
            returns: TypeId::of::<R>(),
            call,
        });
        self
    }

    #[must_use]
    pub fn op1<A, R, F>(self, name: &'static str, f: F) -> Self
    where
        A: Any + Send,
        R: Any + Send,
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        self.try_op1(name, move |recv: &T, a: A| Ok(f(recv, a)))
    }

    #[must_use]
    pub fn try_op1<A, R, F>(mut self, name: &'static str, f: F) -> Self
    where
        A: Any + Send,
        R: Any + Send,
        F: Fn(&T, A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let call: ErasedOp = Arc::new(move |receiver, mut args| {
            expect_arity(name, &args, 1)?;
            let receiver = downcast_receiver::<T>(name, receiver)?;
            let a = take_arg::<A>(name, 0, &mut args)?;
            f(receiver, a).map(Value::new).map_err(InvokeError::Application)
        });
        self.ops.push(OpShape {
            name,
            params: vec![TypeId::of::<A>()],
            returns: TypeId::of::<R>(),
            call,
        });
        self
    }

    #[must_use]
    pub fn op2<A, B, R, F>(self, name: &'static str, f: F) -> Self
    where
        A: Any + Send,
        B: Any + Send,
        R: Any + Send,
        F: Fn(&T, A, B) -> R + Send + Sync + 'static,
    {
        self.try_op2(name, move |recv: &T, a: A, b: B| Ok(f(recv, a, b)))
    }

    #[must_use]
    pub fn try_op2<A, B, R, F>(mut self, name: &'static str, f: F) -> Self
    where
        A: Any + Send,
        B: Any + Send,
        R: Any + Send,
        F: Fn(&T, A, B) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let call: ErasedOp = Arc::new(move |receiver, mut args| {
            expect_arity(name, &args, 2)?;
            let receiver = downcast_receiver::<T>(name, receiver)?;
            let a = take_arg::<A>(name, 0, &mut args)?;
            let b = take_arg::<B>(name, 1, &mut args)?;
            f(receiver, a, b)
                .map(Value::new)
                .map_err(InvokeError::Application)
        });
        self.ops.push(OpShape {
            name,
            params: vec![TypeId::of::<A>(), TypeId::of::<B>()],
            returns: TypeId::of::<R>(),
            call,
        });
        self
    }

    #[must_use]
    pub fn build(self) -> TypeShape {
        TypeShape {
            type_id: TypeId::of::<T>(),
            name: self.name,
            ops: self.ops,
        }
    }
}

/// Process-scoped registry of type shapes, keyed by type identity.
///
/// Read-heavy, written rarely (registration at startup). Duplicate
/// registration for a type is rejected.
#[derive(Default)]
pub struct ShapeRegistry {
    shapes: RwLock<HashMap<TypeId, Arc<TypeShape>>>,
}

impl ShapeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, shape: TypeShape) -> Result<(), InvokeError> {
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        if shapes.contains_key(&shape.type_id) {
            return Err(InvokeError::DuplicateShape { name: shape.name });
        }
        shapes.insert(shape.type_id, Arc::new(shape));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, ty: TypeId) -> Option<Arc<TypeShape>> {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ty)
            .cloned()
    }

    #[must_use]
    pub fn get_for<T: Any>(&self) -> Option<Arc<TypeShape>> {
        self.get(TypeId::of::<T>())
    }

    /// Display name for a registered type, for diagnostics.
    #[must_use]
    pub fn name_of(&self, ty: TypeId) -> Option<String> {
        self.get(ty).map(|shape| shape.name.clone())
    }
}
