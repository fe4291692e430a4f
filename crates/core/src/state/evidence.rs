//! # Evidence State
//!
//! Retrieved snippets and the running, de-duplicated collection a
//! research session accumulates.

use serde::{Deserialize, Serialize, Serializer};
use sha1::Digest;
use std::collections::HashMap;

use super::query::Granularity;

/// A single retrieved snippet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceItem {
    pub content: String,
    /// Weak back-reference to the source document
    pub source_id: String,
    /// Always within [0, 1]
    pub relevance: f32,
    pub granularity: Granularity,
}

impl EvidenceItem {
    pub fn new(
        source_id: impl Into<String>,
        content: impl Into<String>,
        relevance: f32,
        granularity: Granularity,
    ) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
            relevance: clamp_unit(relevance),
            granularity,
        }
    }

    /// Identity used for de-duplication: source plus content hash
    pub fn key(&self) -> EvidenceKey {
        let mut hasher = sha1::Sha1::new();
        hasher.update(self.content.as_bytes());
        EvidenceKey {
            source_id: self.source_id.clone(),
            content_hash: format!("{:x}", hasher.finalize()),
        }
    }
}

/// Clamp into [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvidenceKey {
    pub source_id: String,
    pub content_hash: String,
}

/// What happened to one incoming item during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// Replaced a lower-relevance duplicate
    Replaced,
    /// An equal-or-better duplicate was already present
    Discarded,
}

#[derive(Debug, Clone)]
struct Entry {
    /// First-insertion order of this identity, used to break ranking ties
    seq: u64,
    item: EvidenceItem,
}

/// Unique evidence accumulated across the iterations of one session.
///
/// Cardinality never decreases: items are only inserted or replaced by a
/// higher-relevance instance of the same identity.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    entries: Vec<Entry>,
    index: HashMap<EvidenceKey, usize>,
    next_seq: u64,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items in current order (ranked after every merge)
    pub fn iter(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn get(&self, key: &EvidenceKey) -> Option<&EvidenceItem> {
        self.index.get(key).map(|&i| &self.entries[i].item)
    }

    /// Insert or replace by identity, keeping the higher-relevance instance
    pub fn upsert(&mut self, item: EvidenceItem) -> Upsert {
        let key = item.key();
        match self.index.get(&key) {
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(Entry {
                    seq: self.next_seq,
                    item,
                });
                self.next_seq += 1;
                Upsert::Inserted
            }
            Some(&i) if self.entries[i].item.relevance < item.relevance => {
                self.entries[i].item = item;
                Upsert::Replaced
            }
            Some(_) => Upsert::Discarded,
        }
    }

    /// Stable re-rank: relevance descending, ties by first insertion
    pub fn rank(&mut self) {
        self.entries.sort_by(|a, b| {
            b.item
                .relevance
                .total_cmp(&a.item.relevance)
                .then(a.seq.cmp(&b.seq))
        });
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.item.key(), i))
            .collect();
    }

    /// Distinct source ids with their item counts, in current order
    pub fn sources(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = Vec::new();
        for item in self.iter() {
            match out.iter_mut().find(|(id, _)| *id == item.source_id) {
                Some((_, count)) => *count += 1,
                None => out.push((item.source_id.clone(), 1)),
            }
        }
        out
    }

    /// One-line description used to steer re-planning
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no evidence gathered yet".to_string();
        }
        let sources = self
            .sources()
            .into_iter()
            .map(|(id, n)| format!("{} ({} items)", id, n))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} items from: {}", self.len(), sources)
    }
}

impl Serialize for EvidenceSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl FromIterator<EvidenceItem> for EvidenceSet {
    fn from_iter<I: IntoIterator<Item = EvidenceItem>>(iter: I) -> Self {
        let mut set = EvidenceSet::new();
        for item in iter {
            set.upsert(item);
        }
        set.rank();
        set
    }
}
