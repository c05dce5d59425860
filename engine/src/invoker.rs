//! Method descriptors and compiled invocation plans.
//!
//! A [`MethodDescriptor`] is resolved once against the shape registry and is
//! immutable from then on. The [`Invoker`] built from it holds the direct
//! call path and, when the declared return type resolves to an awaitable
//! (directly or through one coercion layer), an async path that wraps the
//! outcome in a [`UniformAwaitable`]. Once built, an invoker's shape never
//! changes; a new descriptor requires a new invoker.

use std::any::{Any, TypeId};
use std::sync::Arc;

use latebind_types::{ErasedOp, InvokeError, ShapeRegistry, Value};
use tracing::debug;

use crate::awaitable::UniformAwaitable;
use crate::coerce::{CoercionDescriptor, CoercionRegistry};
use crate::detect::{ProtocolCache, ProtocolDescriptor};

/// Producer for a parameter default; producers rather than values because
/// [`Value`] is not `Clone`.
pub type DefaultValue = Arc<dyn Fn() -> Value + Send + Sync>;

/// A resolved target method: identity, signature, erased caller, and
/// optional per-parameter defaults. Immutable once resolved.
pub struct MethodDescriptor {
    target_type: TypeId,
    target_name: String,
    method: &'static str,
    params: Vec<TypeId>,
    returns: TypeId,
    call: ErasedOp,
    defaults: Vec<Option<DefaultValue>>,
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("target_type", &self.target_type)
            .field("target_name", &self.target_name)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl MethodDescriptor {
    /// Resolve a descriptor from a registered shape.
    pub fn resolve(
        shapes: &ShapeRegistry,
        target: TypeId,
        method: &str,
    ) -> Result<Self, InvokeError> {
        let shape = shapes.get(target).ok_or_else(|| InvokeError::UnknownType {
            type_name: format!("{target:?}"),
        })?;
        let op = shape.op(method).ok_or_else(|| InvokeError::UnknownMethod {
            type_name: shape.name().to_string(),
            method: method.to_string(),
        })?;
        Ok(Self {
            target_type: target,
            target_name: shape.name().to_string(),
            method: op.name,
            params: op.params.clone(),
            returns: op.returns,
            call: Arc::clone(&op.call),
            defaults: vec![None; op.params.len()],
        })
    }

    pub fn resolve_for<T: Any>(
        shapes: &ShapeRegistry,
        method: &str,
    ) -> Result<Self, InvokeError> {
        Self::resolve(shapes, TypeId::of::<T>(), method)
    }

    /// Attach a default-value producer for one parameter.
    pub fn with_default(
        mut self,
        index: usize,
        producer: DefaultValue,
    ) -> Result<Self, InvokeError> {
        if index >= self.params.len() {
            return Err(InvokeError::InvalidArgument {
                detail: format!(
                    "method `{}` has {} parameter(s), no default slot {index}",
                    self.method,
                    self.params.len()
                ),
            });
        }
        self.defaults[index] = Some(producer);
        Ok(self)
    }

    #[must_use]
    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    #[must_use]
    pub fn params(&self) -> &[TypeId] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> TypeId {
        self.returns
    }

    #[must_use]
    pub fn default_value(&self, index: usize) -> Option<Value> {
        self.defaults
            .get(index)
            .and_then(Option::as_ref)
            .map(|producer| producer())
    }

    /// Extend a short argument list with trailing defaults. Anything still
    /// missing is caught by the arity check.
    fn fill_defaults(&self, mut args: Vec<Value>) -> Vec<Value> {
        while args.len() < self.params.len() {
            match self.default_value(args.len()) {
                Some(value) => args.push(value),
                None => break,
            }
        }
        args
    }
}

pub(crate) struct AsyncPlan {
    pub(crate) coercion: Option<Arc<CoercionDescriptor>>,
    pub(crate) protocol: Arc<ProtocolDescriptor>,
}

/// Compiled invocation plan for one method descriptor.
pub struct Invoker {
    descriptor: Arc<MethodDescriptor>,
    asyncness: Option<AsyncPlan>,
}

impl Invoker {
    /// Build the plan. Building twice for an equal descriptor is safe and
    /// yields invokers that behave identically.
    pub(crate) fn build(
        descriptor: Arc<MethodDescriptor>,
        shapes: &ShapeRegistry,
        protocols: &ProtocolCache,
        coercions: &CoercionRegistry,
    ) -> Self {
        let asyncness = match protocols.resolve(shapes, descriptor.returns) {
            Some(protocol) => Some(AsyncPlan {
                coercion: None,
                protocol,
            }),
            None => coercions
                .try_coerce(descriptor.returns, shapes)
                .and_then(|coercion| {
                    // One coercion layer at most: the coerced type must pass
                    // detection itself or the whole resolution fails.
                    protocols
                        .resolve(shapes, coercion.coerced_type())
                        .map(|protocol| AsyncPlan {
                            coercion: Some(coercion),
                            protocol,
                        })
                }),
        };
        debug!(
            target = descriptor.target_name(),
            method = descriptor.method(),
            awaitable = asyncness.is_some(),
            "built invoker"
        );
        Self {
            descriptor,
            asyncness,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<MethodDescriptor> {
        &self.descriptor
    }

    /// Whether an async path exists for this method.
    #[must_use]
    pub fn is_awaitable(&self) -> bool {
        self.asyncness.is_some()
    }

    /// Declared async result type, when the method is awaitable.
    #[must_use]
    pub fn async_result_type(&self) -> Option<TypeId> {
        self.asyncness
            .as_ref()
            .map(|plan| plan.protocol.result_type())
    }

    fn check_args(&self, args: &[Value]) -> Result<(), InvokeError> {
        let params = &self.descriptor.params;
        if args.len() != params.len() {
            return Err(InvokeError::InvalidArgument {
                detail: format!(
                    "method `{}` expects {} argument(s), got {}",
                    self.descriptor.method,
                    params.len(),
                    args.len()
                ),
            });
        }
        for (index, (arg, param)) in args.iter().zip(params).enumerate() {
            if arg.type_id() != *param {
                return Err(InvokeError::InvalidArgument {
                    detail: format!(
                        "method `{}`: argument {index} has an incompatible type",
                        self.descriptor.method
                    ),
                });
            }
        }
        Ok(())
    }

    /// Direct path: invoke and return the raw result, no protocol handling.
    pub fn invoke(&self, target: &dyn Any, args: Vec<Value>) -> Result<Value, InvokeError> {
        let args = self.descriptor.fill_defaults(args);
        self.check_args(&args)?;
        (*self.descriptor.call)(target, args)
    }

    /// Async path: invoke, apply coercion if one was resolved, and wrap the
    /// outcome against the cached protocol descriptor.
    pub fn invoke_async(
        &self,
        target: &dyn Any,
        args: Vec<Value>,
    ) -> Result<UniformAwaitable, InvokeError> {
        let Some(plan) = &self.asyncness else {
            return Err(InvokeError::UnsupportedOperation {
                method: self.descriptor.method.to_string(),
            });
        };
        let raw = self.invoke(target, args)?;
        let value = match &plan.coercion {
            Some(coercion) => coercion.apply(raw)?,
            None => raw,
        };
        Ok(UniformAwaitable::new(value, Arc::clone(&plan.protocol)))
    }
}
