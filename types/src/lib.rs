//! Core domain types for latebind.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies: the opaque [`Value`] passed between late-bound calls, the
//! [`Continuation`] callback type, the type-shape metadata layer that stands
//! in for runtime reflection, and the [`InvokeError`] taxonomy.

mod error;
mod shape;
mod value;

pub use error::InvokeError;
pub use shape::{ErasedOp, OpShape, ShapeBuilder, ShapeRegistry, TypeShape};
pub use value::{Continuation, Value};
