//! # Report State
//!
//! Sufficiency scores, per-iteration trace records, and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evidence::{clamp_unit, EvidenceSet};
use super::query::{Query, SubQuery};

/// How well the accumulated evidence answers the query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SufficiencyScore {
    /// Within [0, 1]
    pub value: f32,
    /// Iteration (0-based) the score was computed at
    pub iteration: u32,
    /// Model's stated reason, when it gave one
    #[serde(default)]
    pub reason: Option<String>,
    /// True when the value is a fallback rather than a model judgement
    #[serde(default)]
    pub fallback: bool,
}

impl SufficiencyScore {
    pub fn new(value: f32, iteration: u32) -> Self {
        Self {
            value: clamp_unit(value),
            iteration,
            reason: None,
            fallback: false,
        }
    }

    /// "Insufficient" stand-in used when the evaluator cannot be trusted
    pub fn insufficient(iteration: u32, reason: impl Into<String>) -> Self {
        Self {
            value: 0.0,
            iteration,
            reason: Some(reason.into()),
            fallback: true,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn meets(&self, threshold: f32) -> bool {
        self.value >= threshold
    }
}

/// Trace of one PLANNING → EVALUATING cycle
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub sub_queries: Vec<SubQuery>,
    /// Items retrieved this iteration, before de-duplication
    pub retrieved: usize,
    /// Items that entered or improved the evidence set
    pub accepted: usize,
    pub failed_sub_queries: usize,
    pub evidence_total: usize,
    pub score: SufficiencyScore,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Synthesized by the model
    Complete,
    /// Deterministic fallback after the model failed
    Degraded,
    /// Session was cancelled; body is the deterministic fallback
    Cancelled,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Complete => "complete",
            ReportStatus::Degraded => "degraded",
            ReportStatus::Cancelled => "cancelled",
        }
    }
}

/// A numbered reference into the evidence used for synthesis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// 1-based, matching the `[n]` markers handed to the model
    pub index: usize,
    pub source_id: String,
    pub relevance: f32,
}

/// Final output of a research session
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Id of the [`Query`] this report answers
    pub query_id: Uuid,
    pub query: String,
    pub body: String,
    pub status: ReportStatus,
    pub citations: Vec<Citation>,
    pub evidence: EvidenceSet,
    /// Completed PLANNING → EVALUATING cycles
    pub iterations: u32,
    pub trace: Vec<IterationRecord>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// A report not yet attached to a session
    pub fn new(
        query: &Query,
        body: impl Into<String>,
        status: ReportStatus,
        citations: Vec<Citation>,
        evidence: EvidenceSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            query_id: query.id,
            query: query.text.clone(),
            body: body.into(),
            status,
            citations,
            evidence,
            iterations: 0,
            trace: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach the producing session and its iteration trace
    pub fn for_session(mut self, session_id: Uuid, trace: Vec<IterationRecord>) -> Self {
        self.session_id = session_id;
        self.iterations = trace.len() as u32;
        self.trace = trace;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.status != ReportStatus::Complete
    }

    pub fn final_score(&self) -> Option<&SufficiencyScore> {
        self.trace.last().map(|r| &r.score)
    }
}
