//! # Research Session
//!
//! Aggregate root for one `research()` call: the query, its intent, the
//! running evidence set, the pipeline, and one record per iteration.
//! Owned exclusively by the controller task running it.

use std::time::{Duration, Instant};
use uuid::Uuid;

use super::pipeline::Pipeline;
use crate::skills::PlanningContext;
use crate::state::{EvidenceSet, Intent, IterationRecord, Query, SubQuery};

#[derive(Debug)]
pub struct ResearchSession {
    pub id: Uuid,
    pub query: Query,
    pub intent: Option<Intent>,
    pub evidence: EvidenceSet,
    pub pipeline: Pipeline,
    pub records: Vec<IterationRecord>,
    started: Instant,
}

impl ResearchSession {
    pub fn new(query: Query, max_iterations: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            intent: None,
            evidence: EvidenceSet::new(),
            pipeline: Pipeline::new(max_iterations),
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn iteration(&self) -> u32 {
        self.pipeline.iteration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Every sub-query issued by earlier iterations
    pub fn asked(&self) -> Vec<SubQuery> {
        self.records
            .iter()
            .flat_map(|r| r.sub_queries.iter().cloned())
            .collect()
    }

    /// What the planner should know before proposing the next batch
    pub fn planning_context(&self) -> PlanningContext {
        PlanningContext {
            iteration: self.iteration(),
            asked: self.asked(),
            evidence_summary: (!self.records.is_empty()).then(|| self.evidence.summary()),
        }
    }

    /// Take the trace out, leaving the session empty of records
    pub fn take_records(&mut self) -> Vec<IterationRecord> {
        std::mem::take(&mut self.records)
    }
}
