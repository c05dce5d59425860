//! Structural detection of the awaitable protocol.
//!
//! A type is awaitable when its shape, and the shape of its awaiter, carry
//! the conventional operations below. Detection matches shape, not names of
//! concrete types, and is performed once per type identity; the resolved
//! hooks are memoized in a [`ProtocolDescriptor`] and downstream code never
//! re-inspects the type.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use latebind_types::{Continuation, ErasedOp, OpShape, ShapeRegistry, TypeShape};
use tracing::{debug, trace};

/// Conventional operation names, matched case-insensitively.
pub const GET_AWAITER: &str = "get_awaiter";
pub const IS_COMPLETED: &str = "is_completed";
pub const ON_COMPLETED: &str = "on_completed";
pub const UNSAFE_ON_COMPLETED: &str = "unsafe_on_completed";
pub const GET_RESULT: &str = "get_result";

fn void() -> TypeId {
    TypeId::of::<()>()
}

/// Resolved hooks for one awaitable return type.
///
/// Safe to share across every invoker with that return type.
pub struct ProtocolDescriptor {
    pub(crate) awaiter_type: TypeId,
    pub(crate) result_type: TypeId,
    pub(crate) get_waiter: ErasedOp,
    pub(crate) is_completed: ErasedOp,
    pub(crate) get_result: ErasedOp,
    pub(crate) on_completed: ErasedOp,
    pub(crate) unsafe_on_completed: Option<ErasedOp>,
}

impl ProtocolDescriptor {
    #[must_use]
    pub fn awaiter_type(&self) -> TypeId {
        self.awaiter_type
    }

    /// Declared result type; `()` means the awaitable produces no value.
    #[must_use]
    pub fn result_type(&self) -> TypeId {
        self.result_type
    }

    #[must_use]
    pub fn is_void_result(&self) -> bool {
        self.result_type == void()
    }

    /// Whether the context-eliding registration hook was captured.
    #[must_use]
    pub fn has_fast_path(&self) -> bool {
        self.unsafe_on_completed.is_some()
    }
}

fn find_op<'a>(
    shape: &'a TypeShape,
    name: &str,
    params: &[TypeId],
) -> Option<&'a OpShape> {
    shape
        .ops()
        .iter()
        .find(|op| op.name.eq_ignore_ascii_case(name) && op.params == params)
}

/// Run the structural checks against registered shapes.
///
/// Pure and deterministic for a given type; callers go through
/// [`ProtocolCache`] so the work happens once per type identity.
fn detect(shapes: &ShapeRegistry, ty: TypeId) -> Option<ProtocolDescriptor> {
    let awaitable = shapes.get(ty)?;

    // Exactly one parameter-less `get_awaiter` returning some type A.
    let mut candidates = awaitable
        .ops()
        .iter()
        .filter(|op| op.name.eq_ignore_ascii_case(GET_AWAITER) && op.params.is_empty());
    let get_awaiter = candidates.next()?;
    if candidates.next().is_some() {
        trace!(ty = awaitable.name(), "ambiguous get_awaiter, not awaitable");
        return None;
    }
    if get_awaiter.returns == void() {
        trace!(ty = awaitable.name(), "get_awaiter returns void, not awaitable");
        return None;
    }
    let awaiter_type = get_awaiter.returns;

    let Some(awaiter) = shapes.get(awaiter_type) else {
        trace!(ty = awaitable.name(), "awaiter type has no shape");
        return None;
    };

    // A boolean-valued, argument-less completion query.
    let is_completed = find_op(&awaiter, IS_COMPLETED, &[])
        .filter(|op| op.returns == TypeId::of::<bool>())?;

    // Notify-on-completion: one continuation in, nothing out.
    let continuation = [TypeId::of::<Continuation>()];
    let on_completed =
        find_op(&awaiter, ON_COMPLETED, &continuation).filter(|op| op.is_void())?;

    // Result retrieval; the return may be void.
    let get_result = find_op(&awaiter, GET_RESULT, &[])?;

    // Optional context-eliding fast path; absence is a fallback trigger,
    // not an error.
    let unsafe_on_completed = find_op(&awaiter, UNSAFE_ON_COMPLETED, &continuation)
        .filter(|op| op.is_void())
        .map(|op| Arc::clone(&op.call));

    debug!(
        awaitable = awaitable.name(),
        awaiter = awaiter.name(),
        fast_path = unsafe_on_completed.is_some(),
        "resolved awaitable protocol"
    );

    Some(ProtocolDescriptor {
        awaiter_type,
        result_type: get_result.returns,
        get_waiter: Arc::clone(&get_awaiter.call),
        is_completed: Arc::clone(&is_completed.call),
        get_result: Arc::clone(&get_result.call),
        on_completed: Arc::clone(&on_completed.call),
        unsafe_on_completed,
    })
}

/// Process-scoped detection cache, keyed by return type identity.
///
/// Caches non-conformance too: shapes must be registered before the first
/// detection of a type. Population tolerates benign races; a descriptor
/// built concurrently by two threads is equivalent and one copy is simply
/// discarded.
#[derive(Default)]
pub struct ProtocolCache {
    entries: RwLock<HashMap<TypeId, Option<Arc<ProtocolDescriptor>>>>,
}

impl ProtocolCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached detection; `None` means the type is not awaitable.
    #[must_use]
    pub fn resolve(
        &self,
        shapes: &ShapeRegistry,
        ty: TypeId,
    ) -> Option<Arc<ProtocolDescriptor>> {
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ty)
        {
            return hit.clone();
        }

        let built = detect(shapes, ty).map(Arc::new);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(ty).or_insert(built).clone()
    }
}
