//! Reference scanning and code-region masking.
//!
//! Both citation syntaxes are matched by a single alternation so the
//! left-to-right, earliest-match-wins tie-break falls out of the regex
//! engine's leftmost-first semantics — footnote form first, then label form.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use quill_core::annotations::RefKind;

/// `[^digits]` (footnote) or `[[label]]` (bracketed), as one alternation.
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\^(\d+)\]|\[\[([^\]]+)\]\]").expect("reference pattern is valid")
});

/// One matched citation reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RefMatch<'t> {
    /// Byte range of the match in the input.
    pub range: Range<usize>,
    /// Exact matched literal (`"[^1]"` or `"[[topic]]"`).
    pub raw: &'t str,
    /// Reference id (digit run or enclosed text).
    pub id: &'t str,
    /// Which syntax matched.
    pub kind: RefKind,
}

/// Scan `text` left to right for citation references, skipping code regions.
///
/// Matches are non-overlapping and returned in input order.
pub(crate) fn references(text: &str) -> Vec<RefMatch<'_>> {
    let mask = code_mask(text);

    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0).expect("group 0 always present");
            let range = whole.range();
            if mask.iter().any(|m| m.start < range.end && range.start < m.end) {
                return None;
            }
            let (id, kind) = if let Some(digits) = caps.get(1) {
                (digits.as_str(), RefKind::Footnote)
            } else {
                let label = caps.get(2).expect("alternation guarantees group 2");
                (label.as_str(), RefKind::Label)
            };
            Some(RefMatch {
                range,
                raw: whole.as_str(),
                id,
                kind,
            })
        })
        .collect()
}

/// Byte ranges of fenced code blocks and inline code spans.
///
/// Reference syntax inside these regions is never rewritten. Fences are
/// ``` or ~~~ at line start (leading whitespace allowed); an unclosed fence
/// runs to the end of the text. Inline spans pair backtick runs of equal
/// length outside fences.
pub(crate) fn code_mask(text: &str) -> Vec<Range<usize>> {
    let mut mask = Vec::new();

    // Pass 1: fenced blocks, line by line.
    let mut fence_open: Option<(usize, char)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let fence_char = match trimmed.as_bytes().first() {
            Some(b'`') if trimmed.starts_with("```") => Some('`'),
            Some(b'~') if trimmed.starts_with("~~~") => Some('~'),
            _ => None,
        };
        match (fence_open, fence_char) {
            (None, Some(c)) => fence_open = Some((offset, c)),
            (Some((start, open_c)), Some(c)) if c == open_c => {
                mask.push(start..offset + line.len());
                fence_open = None;
            }
            _ => {}
        }
        offset += line.len();
    }
    if let Some((start, _)) = fence_open {
        mask.push(start..text.len());
    }

    // Pass 2: inline backtick spans outside the fenced regions.
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' || mask.iter().any(|m| m.contains(&i)) {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        let run_len = i - run_start;

        // Find the next backtick run of exactly the same length.
        let mut j = i;
        let mut close: Option<usize> = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let close_start = j;
                while j < bytes.len() && bytes[j] == b'`' {
                    j += 1;
                }
                if j - close_start == run_len {
                    close = Some(j);
                    break;
                }
            } else {
                j += 1;
            }
        }
        if let Some(end) = close {
            mask.push(run_start..end);
            i = end;
        }
    }

    mask.sort_by_key(|r| r.start);
    mask
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
