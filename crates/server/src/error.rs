//! The binding crate's own error type, distinct from [`llm::error::LlmError`]
//! (spec.md §1: the transport binding is outside the gateway's core).

/// Failures that can occur outside a single request's lifecycle: binding
/// the listener, or the serve loop itself.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured listen address could not be bound.
    #[error("failed to bind to address: {0}")]
    Bind(#[source] std::io::Error),

    /// The serve loop returned an I/O error.
    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}
