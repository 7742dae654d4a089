//! Conversation store boundary.
//!
//! The engine never owns conversation history; it hands each finished
//! message to a [`ConversationStore`] exactly once and forgets it.

use async_trait::async_trait;
use parking_lot::Mutex;
use quill_core::messages::CommittedMessage;

/// Error returned by a store when a commit cannot be accepted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    /// Create a store error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Destination for committed messages.
///
/// Implementations must be idempotent-friendly in the sense that the engine
/// calls `commit` at most once per stream; a returned error surfaces to the
/// engine caller as [`EngineError::Store`](crate::EngineError::Store).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist one finished message.
    async fn commit(&self, message: CommittedMessage) -> Result<(), StoreError>;
}

/// In-memory store, primarily for tests and embedding scenarios that keep
/// history in process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<CommittedMessage>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all committed messages, in commit order.
    #[must_use]
    pub fn messages(&self) -> Vec<CommittedMessage> {
        self.messages.lock().clone()
    }

    /// Number of messages committed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether no message has been committed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn commit(&self, message: CommittedMessage) -> Result<(), StoreError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
