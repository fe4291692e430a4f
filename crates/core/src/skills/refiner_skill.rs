//! # Refiner Skill
//!
//! Folds freshly retrieved evidence into a session's running set:
//! de-duplicate by identity, keep the higher-relevance instance, re-rank.
//! Deterministic; no model calls.

use crate::state::{EvidenceItem, EvidenceSet, Upsert};

/// Outcome counts of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    pub discarded: usize,
    /// Dropped by the relevance floor before identity lookup
    pub below_floor: usize,
}

impl MergeStats {
    /// Items that entered or improved the set
    pub fn accepted(&self) -> usize {
        self.inserted + self.replaced
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceRefiner {
    min_relevance: f32,
}

impl EvidenceRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard incoming items scored below `min_relevance`
    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn merge(&self, existing: EvidenceSet, new_items: Vec<EvidenceItem>) -> EvidenceSet {
        self.merge_with_stats(existing, new_items).0
    }

    pub fn merge_with_stats(
        &self,
        mut existing: EvidenceSet,
        new_items: Vec<EvidenceItem>,
    ) -> (EvidenceSet, MergeStats) {
        let mut stats = MergeStats::default();
        for item in new_items {
            if item.relevance < self.min_relevance {
                stats.below_floor += 1;
                continue;
            }
            match existing.upsert(item) {
                Upsert::Inserted => stats.inserted += 1,
                Upsert::Replaced => stats.replaced += 1,
                Upsert::Discarded => stats.discarded += 1,
            }
        }
        existing.rank();
        tracing::debug!(
            inserted = stats.inserted,
            replaced = stats.replaced,
            discarded = stats.discarded,
            below_floor = stats.below_floor,
            total = existing.len(),
            "Merged evidence"
        );
        (existing, stats)
    }
}
