//! Engine error types.

use crate::store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the merge engine.
///
/// Transport failures are NOT represented here: the engine absorbs them by
/// committing an error-notice message and reporting a `Failed` outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A new stream was requested while one is already active.
    ///
    /// Rejected synchronously, before any state mutation. The caller either
    /// waits for the in-flight stream or cancels it first.
    #[error("a stream is already in flight")]
    StreamInFlight,

    /// The external conversation store rejected the commit.
    #[error("store commit failed: {0}")]
    Store(#[from] StoreError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
