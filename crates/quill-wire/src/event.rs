//! Wire payloads and protocol events.
//!
//! A `data:` line carries one [`ChatChunk`] JSON object. The decoder lifts
//! chunks into [`StreamEvent`]s, the vocabulary the merge engine consumes:
//! zero or more `Delta`s followed by exactly one `Done`.

use serde::{Deserialize, Serialize};

use quill_core::citations::CitationRecord;

/// Raw JSON payload of a single `data:` line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Content fragment (empty on the terminal chunk).
    #[serde(default)]
    pub content: String,

    /// Terminal flag; `true` ends the stream.
    #[serde(default)]
    pub done: bool,

    /// Final message id, present only when `done = true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Citation set, present only when `done = true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<CitationRecord>>,
}

impl ChatChunk {
    /// Lift the wire payload into a protocol event.
    #[must_use]
    pub fn into_event(self) -> StreamEvent {
        if self.done {
            StreamEvent::Done {
                message_id: self.message_id,
                citations: self.citations.unwrap_or_default(),
            }
        } else {
            StreamEvent::Delta { text: self.content }
        }
    }
}

/// Discrete protocol event derived from the byte stream.
///
/// A well-formed event sequence is zero or more `Delta`s followed by exactly
/// one `Done`; the decoder fuses after `Done`, so nothing follows it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A content fragment to append to the message in progress.
    Delta {
        /// Text fragment.
        text: String,
    },

    /// End of stream, carrying the final citation set.
    Done {
        /// Final message id assigned by the service, when provided.
        message_id: Option<String>,
        /// Citation records referenced by the finished text.
        citations: Vec<CitationRecord>,
    },
}

impl StreamEvent {
    /// Whether this is the terminal event.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
