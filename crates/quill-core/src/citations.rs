//! Citation records and the session-wide citation table.
//!
//! The generation service delivers citation metadata as a side-channel on the
//! terminal stream event. Records accumulate in a [`CitationTable`] for the
//! lifetime of a session: merges only ever add or overwrite, never remove.
//!
//! The table is shared across streams. Readers (the reference resolver) work
//! against an immutable [`CitationSnapshot`] taken under the read lock, so a
//! resolver run never observes a partially-merged table.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One citation as delivered by the generation service.
///
/// Identity is `id`; within one terminal event's citation set ids are unique.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    /// Reference identifier (`"1"` for `[^1]`, `"topic"` for `[[topic]]`).
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Citation body shown in tooltips or footnotes.
    pub content: String,
    /// Optional source URL or document name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Append-only keyed store mapping reference ids to citation records.
///
/// Explicitly instantiated and passed in rather than held as ambient global
/// state, so independent sessions (and tests) never interfere.
#[derive(Debug, Default)]
pub struct CitationTable {
    inner: RwLock<HashMap<String, CitationRecord>>,
}

impl CitationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a citation set into the table atomically.
    ///
    /// All records land under a single write lock; a concurrent
    /// [`snapshot`](Self::snapshot) sees either none or all of them.
    /// Later records win on id collision; nothing is ever removed.
    pub fn merge<I>(&self, records: I)
    where
        I: IntoIterator<Item = CitationRecord>,
    {
        let mut map = self.inner.write();
        for record in records {
            let _ = map.insert(record.id.clone(), record);
        }
    }

    /// Take a stable snapshot for the resolver to read against.
    #[must_use]
    pub fn snapshot(&self) -> CitationSnapshot {
        CitationSnapshot {
            records: self.inner.read().clone(),
        }
    }

    /// Look up a single record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<CitationRecord> {
        self.inner.read().get(id).cloned()
    }

    /// Number of accumulated records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Immutable view of the table at one point in time.
///
/// Insertion order is irrelevant; lookups are by id only.
#[derive(Clone, Debug, Default)]
pub struct CitationSnapshot {
    records: HashMap<String, CitationRecord>,
}

impl CitationSnapshot {
    /// Empty snapshot (resolves everything as unresolved).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot directly from records (test and embedder convenience).
    #[must_use]
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CitationRecord>,
    {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
        }
    }

    /// Look up a record by reference id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CitationRecord> {
        self.records.get(id)
    }

    /// Number of records in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
