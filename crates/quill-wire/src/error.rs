//! Transport error types.

/// Result type alias for transport operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors surfaced by the transport layer.
///
/// Malformed individual payload lines are NOT errors — they are logged and
/// skipped by the decoder without aborting the stream.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Request construction or dispatch failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        message: String,
    },

    /// Reading the response body failed mid-stream.
    #[error("stream read error: {0}")]
    Read(#[source] reqwest::Error),

    /// The byte source ended before a terminal event arrived.
    ///
    /// An unterminated stream is a failed stream; the consumer must not
    /// treat it as a silent completion.
    #[error("stream closed before terminal event")]
    PrematureClose,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
