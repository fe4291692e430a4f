//! # Research Skills
//!
//! One skill per pipeline stage. Each owns its prompt, calls the gateway at
//! most once per invocation, and absorbs model failures with a fallback.
//!
//! ## Skills
//!
//! - `QueryPlanner` - intent classification and sub-query decomposition
//! - `EvidenceRefiner` - de-duplicating merge (no model calls)
//! - `SufficiencyEvaluator` - scores accumulated evidence
//! - `ReportSynthesizer` - cited report, degraded when the model fails

pub mod prompts;

pub mod evaluator_skill;
pub mod planner_skill;
pub mod refiner_skill;
pub mod reporter_skill;

pub use evaluator_skill::SufficiencyEvaluator;
pub use planner_skill::{PlanningContext, QueryPlanner};
pub use refiner_skill::{EvidenceRefiner, MergeStats};
pub use reporter_skill::ReportSynthesizer;
