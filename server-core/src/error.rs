//! Error taxonomy (§7). Every kind here is data a caller translates into a
//! protocol response; only [`ServerError::Invariant`] is allowed to
//! terminate the owning task, and it does so loudly (logged, then panics)
//! rather than silently corrupting an index.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Bad input: invalid credentials, malformed names, out-of-range values.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// Conflicting state: duplicate email/username, already connected,
    /// already in a room, self-kick.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// Caller lacks the authority for the action (non-host action, banned
    /// login, wrong admin token).
    #[error("not authorized: {0}")]
    Authorization(&'static str),

    /// Network-layer failure (EOF, write error, recv error). The affected
    /// session is torn down; the server process itself continues.
    #[error("transport error: {0}")]
    Transport(&'static str),

    /// A repository call failed. Never leaks internal detail to the client.
    #[error("persistence error")]
    Persistence,

    /// An index/state invariant the server itself is supposed to uphold was
    /// violated. Never constructed as a recoverable value — only ever
    /// observed on its way into [`ServerError::invariant_violation`]'s panic.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl ServerError {
    /// Raises a programmer error: logs at error level and aborts the
    /// current task via panic. Reserved for index invariant violations that
    /// must never be reachable from untrusted input.
    #[track_caller]
    pub fn invariant_violation(detail: &str) -> ! {
        let err = ServerError::Invariant(detail.to_string());
        tracing::error!(%err, "invariant violation — terminating task");
        panic!("{err}");
    }
}
