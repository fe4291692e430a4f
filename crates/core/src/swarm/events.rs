//! # Research Events
//!
//! Progress notifications streamed to observers while a session runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::ResearchStage;

/// Kind of research event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResearchEventKind {
    SessionStarted,
    /// Pipeline entered a new stage
    StageEntered,
    /// One sub-query contributed no evidence
    SubQueryFailed,
    /// PLANNING → EVALUATING cycle finished with a score
    IterationCompleted,
    ReportReady,
    SessionCancelled,
    /// Hard failure (e.g. corpus unavailable)
    SessionFailed,
}

/// An event emitted by the research controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: ResearchEventKind,
    #[serde(default)]
    pub stage: Option<ResearchStage>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ResearchEvent {
    pub fn new(kind: ResearchEventKind, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            kind,
            stage: None,
            data: None,
        }
    }

    pub fn stage_entered(session_id: Uuid, stage: ResearchStage) -> Self {
        let mut event = Self::new(ResearchEventKind::StageEntered, session_id);
        event.stage = Some(stage);
        event
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
