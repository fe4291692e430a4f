//! # Pipeline Stages
//!
//! The research state machine:
//!
//! ```text
//! INIT → PLANNING → RETRIEVING → REFINING → EVALUATING → (PLANNING | SYNTHESIZING) → DONE
//! ```

use serde::{Deserialize, Serialize};

use crate::state::SufficiencyScore;

/// Stage of a research session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStage {
    /// Session created, nothing run yet
    Init,
    /// Intent (first iteration only) and sub-queries
    Planning,
    /// Fan-out to the retriever
    Retrieving,
    /// Merging the delta into the evidence set
    Refining,
    /// Scoring the accumulated evidence
    Evaluating,
    /// Writing the report
    Synthesizing,
    /// Report produced
    Done,
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current stage
    pub stage: ResearchStage,
    /// Completed PLANNING → EVALUATING cycles
    pub iteration: u32,
    pub max_iterations: u32,
    transitions: Vec<ResearchStage>,
}

impl Pipeline {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            stage: ResearchStage::Init,
            iteration: 0,
            max_iterations,
            transitions: vec![ResearchStage::Init],
        }
    }

    fn enter(&mut self, stage: ResearchStage) -> ResearchStage {
        self.stage = stage;
        self.transitions.push(stage);
        stage
    }

    /// Advance along the fixed edges. EVALUATING only leaves through
    /// [`Pipeline::decide`].
    pub fn advance(&mut self) -> ResearchStage {
        let next = match self.stage {
            ResearchStage::Init => ResearchStage::Planning,
            ResearchStage::Planning => ResearchStage::Retrieving,
            ResearchStage::Retrieving => ResearchStage::Refining,
            ResearchStage::Refining => ResearchStage::Evaluating,
            ResearchStage::Evaluating => return self.stage,
            ResearchStage::Synthesizing => ResearchStage::Done,
            ResearchStage::Done => return self.stage,
        };
        self.enter(next)
    }

    /// Close an iteration. Returns true when another PLANNING round follows:
    /// the score is below threshold and budget remains.
    pub fn decide(&mut self, score: &SufficiencyScore, threshold: f32) -> bool {
        self.iteration += 1;
        let again = !score.meets(threshold) && self.iteration < self.max_iterations;
        self.enter(if again {
            ResearchStage::Planning
        } else {
            ResearchStage::Synthesizing
        });
        again
    }

    /// Stop gathering and go straight to synthesis
    pub fn synthesize_now(&mut self) {
        if !matches!(self.stage, ResearchStage::Synthesizing | ResearchStage::Done) {
            self.enter(ResearchStage::Synthesizing);
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == ResearchStage::Done
    }

    /// Every stage entered so far, in order
    pub fn transitions(&self) -> &[ResearchStage] {
        &self.transitions
    }
}
