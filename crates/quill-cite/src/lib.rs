//! # quill-cite
//!
//! Reference resolver: rewrites citation syntax in free-form text into a
//! structured, resolvable annotation sequence.
//!
//! Two syntaxes are recognized, scanned left to right in a single pass:
//!
//! - numeric footnote: `[^1]` — reference id is the digit run
//! - bracketed label: `[[topic]]` — reference id is the enclosed text
//!
//! Each match is looked up in a [`CitationSnapshot`]; hits become
//! `Node::Citation` markers, misses become `Node::Unresolved` with the
//! literal preserved verbatim. Code regions (fenced blocks, inline spans)
//! are never rewritten. Resolution is pure and deterministic: same text and
//! snapshot, same output.

#![deny(unsafe_code)]

mod scan;

use quill_core::annotations::Node;
use quill_core::citations::CitationSnapshot;

/// Resolve citation references in `text` against a table snapshot.
///
/// Every character of the input appears in exactly one output node; the
/// sequence concatenates back to `text` exactly. Empty input yields an
/// empty sequence. O(len) single scan.
#[must_use]
pub fn resolve(text: &str, citations: &CitationSnapshot) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut cursor = 0;

    for reference in scan::references(text) {
        if reference.range.start > cursor {
            nodes.push(Node::Text {
                text: text[cursor..reference.range.start].to_owned(),
            });
        }

        let node = match citations.get(reference.id) {
            Some(record) => Node::Citation {
                raw: reference.raw.to_owned(),
                label: format!("[{}]", reference.id),
                id: reference.id.to_owned(),
                kind: reference.kind,
                record: record.clone(),
            },
            None => Node::Unresolved {
                raw: reference.raw.to_owned(),
                id: reference.id.to_owned(),
                kind: reference.kind,
            },
        };
        nodes.push(node);
        cursor = reference.range.end;
    }

    if cursor < text.len() {
        nodes.push(Node::Text {
            text: text[cursor..].to_owned(),
        });
    }

    nodes
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
