//! Pluggable coercion of foreign asynchronous types.
//!
//! Adapters recognize types that do not satisfy the awaitable protocol
//! directly and supply a conversion to one that does. The registry is only
//! consulted after direct detection fails, adapters are tried in
//! registration order, first match wins, and at most one coercion layer is
//! ever applied (the engine never coerces a coerced result again).

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use latebind_types::{ErasedOp, InvokeError, ShapeRegistry, Value};
use tracing::debug;

/// A resolved conversion for one foreign type.
pub struct CoercionDescriptor {
    coerced_type: TypeId,
    convert: Arc<dyn Fn(Value) -> Result<Value, InvokeError> + Send + Sync>,
}

impl CoercionDescriptor {
    #[must_use]
    pub fn new(
        coerced_type: TypeId,
        convert: Arc<dyn Fn(Value) -> Result<Value, InvokeError> + Send + Sync>,
    ) -> Self {
        Self {
            coerced_type,
            convert,
        }
    }

    /// The protocol-conformant type the conversion produces; the engine runs
    /// detection against this to resolve the nested protocol descriptor.
    #[must_use]
    pub fn coerced_type(&self) -> TypeId {
        self.coerced_type
    }

    pub fn apply(&self, value: Value) -> Result<Value, InvokeError> {
        (*self.convert)(value)
    }
}

/// Recognizes a foreign asynchronous type and supplies its conversion.
///
/// `try_coerce` is expected to resolve the foreign operations at most once
/// per distinct type and reuse a cached descriptor afterwards; a type that
/// merely looks close but lacks the expected pieces means "adapter does not
/// apply", never a hard error.
pub trait CoercionAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_coerce(
        &self,
        ty: TypeId,
        shapes: &ShapeRegistry,
    ) -> Option<Arc<CoercionDescriptor>>;
}

/// Ordered adapter set, fixed at executor construction.
#[derive(Default)]
pub struct CoercionRegistry {
    adapters: Vec<Box<dyn CoercionAdapter>>,
}

impl CoercionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn CoercionAdapter>) {
        self.adapters.push(adapter);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// First matching adapter wins.
    #[must_use]
    pub fn try_coerce(
        &self,
        ty: TypeId,
        shapes: &ShapeRegistry,
    ) -> Option<Arc<CoercionDescriptor>> {
        self.adapters.iter().find_map(|adapter| {
            let descriptor = adapter.try_coerce(ty, shapes)?;
            debug!(adapter = adapter.name(), "coercion adapter matched");
            Some(descriptor)
        })
    }
}

/// Coerces any type whose shape exposes a zero-argument conversion
/// operation (by default `into_awaitable`) returning a non-void type.
///
/// The operation is resolved from the foreign type's shape once per type
/// identity; both matches and non-matches are remembered, so repeated
/// lookups never re-inspect the shape.
pub struct OpCoercion {
    op_name: &'static str,
    resolved: RwLock<HashMap<TypeId, Option<Arc<CoercionDescriptor>>>>,
}

impl OpCoercion {
    #[must_use]
    pub fn new(op_name: &'static str) -> Self {
        Self {
            op_name,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// The conventional adapter: converts through `into_awaitable`.
    #[must_use]
    pub fn into_awaitable() -> Self {
        Self::new("into_awaitable")
    }

    fn resolve(&self, ty: TypeId, shapes: &ShapeRegistry) -> Option<Arc<CoercionDescriptor>> {
        let shape = shapes.get(ty)?;
        let op = shape
            .ops()
            .iter()
            .find(|op| op.name.eq_ignore_ascii_case(self.op_name) && op.params.is_empty())
            .filter(|op| !op.is_void())?;

        let coerced_type = op.returns;
        let call: ErasedOp = Arc::clone(&op.call);
        let op_name = self.op_name;
        let convert = Arc::new(move |value: Value| {
            let receiver = value.as_dyn().ok_or_else(|| InvokeError::InvalidArgument {
                detail: format!("coercion op `{op_name}` applied to a void value"),
            })?;
            (*call)(receiver, Vec::new())
        });
        Some(Arc::new(CoercionDescriptor::new(coerced_type, convert)))
    }
}

impl CoercionAdapter for OpCoercion {
    fn name(&self) -> &'static str {
        "op-coercion"
    }

    fn try_coerce(
        &self,
        ty: TypeId,
        shapes: &ShapeRegistry,
    ) -> Option<Arc<CoercionDescriptor>> {
        if let Some(hit) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ty)
        {
            return hit.clone();
        }

        let built = self.resolve(ty, shapes);
        let mut resolved = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        resolved.entry(ty).or_insert(built).clone()
    }
}
