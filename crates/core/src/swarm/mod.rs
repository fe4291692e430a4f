//! # Research Orchestration
//!
//! Drives a query through the iterative research loop.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Query → Intent → Sub-queries → Retrieval (fan-out) → Refine → Sufficiency ─┐
//!            ▲                                                               │
//!            └──────────────── below threshold, budget left ◀────────────────┤
//!                                                                            ▼
//!                                                                      Report synthesis
//! ```

pub mod coordinator;
pub mod events;
pub mod pipeline;
pub mod session;

pub use coordinator::{ResearchConfig, ResearchController, MAX_SUBQUERIES_LIMIT};
pub use events::{ResearchEvent, ResearchEventKind};
pub use pipeline::{Pipeline, ResearchStage};
pub use session::ResearchSession;
