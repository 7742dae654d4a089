//! Annotated node spans — the reference resolver's output.
//!
//! A resolved message body is a sequence of [`Node`]s alternating plain text
//! and citation markers. Every character of the input appears in exactly one
//! node's source text, so concatenating [`Node::source_text`] over the whole
//! sequence reconstructs the original string byte for byte.
//!
//! Resolution happens once, at commit time; renderers consume the stable node
//! sequence instead of re-scanning the raw text on every paint.

use serde::{Deserialize, Serialize};

use crate::citations::CitationRecord;

/// Which citation syntax a marker was written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// Numeric footnote form, `[^1]`.
    Footnote,
    /// Bracketed label form, `[[topic]]`.
    Label,
}

/// One span of a resolved message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Plain text outside any citation marker.
    Text {
        /// The span's text, verbatim from the input.
        text: String,
    },

    /// A citation marker whose id was found in the table.
    Citation {
        /// Exact matched literal from the input (`"[^1]"`, `"[[topic]]"`).
        raw: String,
        /// Canonical display label (`"[1]"`, `"[topic]"`).
        label: String,
        /// Reference id used for the lookup.
        id: String,
        /// Syntax the marker was written in.
        kind: RefKind,
        /// The resolved citation.
        record: CitationRecord,
    },

    /// A citation marker whose id was absent from the table.
    ///
    /// The literal is preserved verbatim; renderers show it as plain text,
    /// optionally styled via the unresolved tag.
    Unresolved {
        /// Exact matched literal from the input.
        raw: String,
        /// Reference id that failed to resolve.
        id: String,
        /// Syntax the marker was written in.
        kind: RefKind,
    },
}

impl Node {
    /// The span's contribution to the original input text.
    #[must_use]
    pub fn source_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Citation { raw, .. } | Self::Unresolved { raw, .. } => raw,
        }
    }

    /// Whether this node is a resolved citation marker.
    #[must_use]
    pub fn is_citation(&self) -> bool {
        matches!(self, Self::Citation { .. })
    }
}

/// Reassemble the original input from a node sequence.
#[must_use]
pub fn source_string(nodes: &[Node]) -> String {
    nodes.iter().map(Node::source_text).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
