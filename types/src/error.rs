//! Error types for late-bound invocation.

use thiserror::Error;

/// Failure surface of the invocation engine.
///
/// Everything here is either a programmer-visible contract violation or a
/// transparent pass-through of an application failure; the engine never
/// swallows, logs, or retries errors raised by invoked method bodies.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Argument list length or types are incompatible with the resolved
    /// method signature, or a receiver of the wrong type was supplied.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// `execute_async` was requested for a method whose return type never
    /// resolves to an awaitable, directly or via coercion.
    #[error("method `{method}` does not return an awaitable, directly or via coercion")]
    UnsupportedOperation { method: String },

    /// A type passed structural detection but a resolved hook misbehaved at
    /// call time in a way only the engine can observe.
    #[error("awaitable hook `{hook}` violated the protocol: {detail}")]
    Protocol { hook: &'static str, detail: String },

    /// No shape registered for the requested type.
    #[error("no shape registered for type {type_name}")]
    UnknownType { type_name: String },

    /// The target type's shape has no operation with the requested name.
    #[error("unknown method `{method}` on `{type_name}`")]
    UnknownMethod { type_name: String, method: String },

    /// A shape was registered twice for the same type.
    #[error("duplicate shape registered: {name}")]
    DuplicateShape { name: String },

    /// Failure raised by an invoked method body or awaitable hook itself,
    /// propagated without translation.
    #[error(transparent)]
    Application(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::InvokeError;

    #[test]
    fn application_errors_display_untranslated() {
        let err = InvokeError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn unsupported_operation_names_the_method() {
        let err = InvokeError::UnsupportedOperation {
            method: "fetch".to_string(),
        };
        assert!(err.to_string().contains("`fetch`"));
    }
}
