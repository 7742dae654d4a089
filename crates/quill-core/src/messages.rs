//! Message types: the transient streaming view and the committed result.
//!
//! A [`StreamingMessage`] exists only while a response is being produced; the
//! merge engine owns the single live instance and publishes cloned snapshots
//! to observers on every delta. At the terminal event it is consumed exactly
//! once and converted into a [`CommittedMessage`], which is what the external
//! conversation store receives and persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotations::Node;
use crate::citations::CitationRecord;
use crate::ids::MessageId;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user input.
    User,
    /// Model output.
    Assistant,
    /// System instruction.
    System,
}

/// Live partial view of the message currently being produced.
///
/// Published by the merge engine on stream start and after every delta;
/// cleared (published as `None`) on terminal, error, or cancellation.
/// Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamingMessage {
    /// Identifier allocated when the request was dispatched.
    pub id: MessageId,
    /// Text accumulated so far, in delta order.
    pub text: String,
    /// Whether the stream is still producing content.
    pub active: bool,
}

impl StreamingMessage {
    /// Fresh empty message for a newly dispatched request.
    #[must_use]
    pub fn begin(id: MessageId) -> Self {
        Self {
            id,
            text: String::new(),
            active: true,
        }
    }
}

/// A finalized message handed to the external conversation store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedMessage {
    /// Message identifier (from the terminal event when present).
    pub id: MessageId,
    /// Author role.
    pub role: Role,
    /// Full raw text.
    pub text: String,
    /// Resolved annotation spans; concatenating their source text equals `text`.
    pub nodes: Vec<Node>,
    /// Citation set delivered with the terminal event.
    pub citations: Vec<CitationRecord>,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
    /// True for transport-failure notices committed in place of a response.
    #[serde(default)]
    pub error: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
