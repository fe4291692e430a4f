//! # Conversation Memory
//!
//! Append-only record of past question/report exchanges. Owned by the
//! caller of `research()` and handed to the synthesizer as context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::Report;

/// One completed exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub query_id: Uuid,
    pub query: String,
    pub report_id: Uuid,
    pub report: String,
}

impl ConversationTurn {
    pub fn from_report(report: &Report) -> Self {
        Self {
            query_id: report.query_id,
            query: report.query.clone(),
            report_id: report.id,
            report: report.body.clone(),
        }
    }
}

/// Ordered exchanges, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Append a finished exchange
    pub fn record(&mut self, report: &Report) {
        self.push(ConversationTurn::from_report(report));
    }

    /// The last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
