//! The invocation façade.
//!
//! [`Executor`] owns the shape registry, the coercion adapters, and the
//! per-type protocol cache, and hands out cached [`MethodDescriptor`]s and
//! [`Invoker`]s so repeated calls to the same method never re-resolve or
//! re-detect anything. Construction goes through [`ExecutorBuilder`] when
//! coercion adapters are needed; [`Executor::new`] covers the common case
//! of natively conformant types only.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use latebind_types::{InvokeError, ShapeRegistry, Value};
use tracing::trace;

use crate::awaitable::UniformAwaitable;
use crate::coerce::{CoercionAdapter, CoercionRegistry};
use crate::detect::ProtocolCache;
use crate::invoker::{Invoker, MethodDescriptor};

/// Entry point for late-bound invocation.
pub struct Executor {
    shapes: Arc<ShapeRegistry>,
    coercions: CoercionRegistry,
    protocols: ProtocolCache,
    descriptors: RwLock<HashMap<(TypeId, String), Arc<MethodDescriptor>>>,
    invokers: RwLock<HashMap<(TypeId, &'static str), Arc<Invoker>>>,
}

impl Executor {
    /// An executor without coercion adapters.
    #[must_use]
    pub fn new(shapes: Arc<ShapeRegistry>) -> Self {
        Self::builder().shapes(shapes).build()
    }

    #[must_use]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    #[must_use]
    pub fn shapes(&self) -> &Arc<ShapeRegistry> {
        &self.shapes
    }

    /// Resolve a method descriptor, reusing the cached one on repeat lookups.
    pub fn resolve<T: Any>(&self, method: &str) -> Result<Arc<MethodDescriptor>, InvokeError> {
        self.resolve_by_id(TypeId::of::<T>(), method)
    }

    pub fn resolve_by_id(
        &self,
        target: TypeId,
        method: &str,
    ) -> Result<Arc<MethodDescriptor>, InvokeError> {
        if let Some(hit) = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(target, method.to_string()))
        {
            return Ok(Arc::clone(hit));
        }

        let built = Arc::new(MethodDescriptor::resolve(&self.shapes, target, method)?);
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            descriptors
                .entry((target, method.to_string()))
                .or_insert(built),
        ))
    }

    /// The compiled plan for a descriptor. Plans for descriptors handed out
    /// by [`Self::resolve`] are cached per `(target type, method)`; a
    /// descriptor customized after resolution gets a fresh uncached plan so
    /// its defaults are honored.
    fn invoker(&self, descriptor: &Arc<MethodDescriptor>) -> Arc<Invoker> {
        let key = (descriptor.target_type(), descriptor.method());
        if let Some(hit) = self
            .invokers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            if Arc::ptr_eq(hit.descriptor(), descriptor) {
                return Arc::clone(hit);
            }
        }

        let built = Arc::new(Invoker::build(
            Arc::clone(descriptor),
            &self.shapes,
            &self.protocols,
            &self.coercions,
        ));
        let cacheable = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(key.0, key.1.to_string()))
            .is_some_and(|resolved| Arc::ptr_eq(resolved, descriptor));
        if !cacheable {
            return built;
        }

        let mut invokers = self.invokers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(invokers.entry(key).or_insert(built))
    }

    /// Whether the method's declared return type resolves to an awaitable.
    #[must_use]
    pub fn is_awaitable(&self, descriptor: &Arc<MethodDescriptor>) -> bool {
        self.invoker(descriptor).is_awaitable()
    }

    /// Invoke directly and return the raw result. Works for any method,
    /// awaitable-returning ones included; no protocol handling is applied.
    pub fn execute(
        &self,
        descriptor: &Arc<MethodDescriptor>,
        target: &dyn Any,
        args: Vec<Value>,
    ) -> Result<Value, InvokeError> {
        trace!(
            target_type = descriptor.target_name(),
            method = descriptor.method(),
            "execute"
        );
        self.invoker(descriptor).invoke(target, args)
    }

    /// Invoke and normalize the outcome into a [`UniformAwaitable`].
    ///
    /// Fails with [`InvokeError::UnsupportedOperation`] when the declared
    /// return type is not awaitable, directly or through a coercion.
    pub fn execute_async(
        &self,
        descriptor: &Arc<MethodDescriptor>,
        target: &dyn Any,
        args: Vec<Value>,
    ) -> Result<UniformAwaitable, InvokeError> {
        trace!(
            target_type = descriptor.target_name(),
            method = descriptor.method(),
            "execute_async"
        );
        self.invoker(descriptor).invoke_async(target, args)
    }
}

/// Configures an [`Executor`]: the shape registry and the ordered coercion
/// adapter list.
#[derive(Default)]
pub struct ExecutorBuilder {
    shapes: Option<Arc<ShapeRegistry>>,
    coercions: CoercionRegistry,
}

impl ExecutorBuilder {
    #[must_use]
    pub fn shapes(mut self, shapes: Arc<ShapeRegistry>) -> Self {
        self.shapes = Some(shapes);
        self
    }

    /// Append a coercion adapter; adapters are consulted in the order they
    /// were added, first match wins.
    #[must_use]
    pub fn coercion(mut self, adapter: Box<dyn CoercionAdapter>) -> Self {
        self.coercions.register(adapter);
        self
    }

    #[must_use]
    pub fn build(self) -> Executor {
        Executor {
            shapes: self.shapes.unwrap_or_default(),
            coercions: self.coercions,
            protocols: ProtocolCache::new(),
            descriptors: RwLock::new(HashMap::new()),
            invokers: RwLock::new(HashMap::new()),
        }
    }
}
