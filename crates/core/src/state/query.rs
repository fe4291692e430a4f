//! # Query State
//!
//! The user's question, its classified intent, and the sub-queries
//! derived from it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::ConversationHistory;

/// An immutable research question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub text: String,
    /// Prior turns supplied by the caller, oldest first
    #[serde(default)]
    pub history: ConversationHistory,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            history: ConversationHistory::default(),
        }
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    /// First 50 characters, for log fields
    pub fn preview(&self) -> String {
        self.text.chars().take(50).collect()
    }

    /// Lower-cased, whitespace-collapsed text used as a cache key
    pub fn normalized(&self) -> String {
        self.text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Kind of question being asked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Factual,
    Comparison,
    #[serde(alias = "summary")]
    Summarization,
    #[serde(alias = "multi-hop", alias = "multihop")]
    MultiHop,
    #[serde(alias = "explanation")]
    Other,
}

/// Unit of evidence the retriever should return
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[serde(alias = "full", alias = "summary", alias = "doc")]
    Document,
    #[serde(alias = "chunk", alias = "page")]
    Passage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[serde(alias = "simple")]
    Low,
    Medium,
    #[serde(alias = "complex")]
    High,
}

/// Classification of a query, computed once per session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intent {
    #[serde(rename = "type", alias = "intent_type")]
    pub intent_type: IntentType,
    pub granularity: Granularity,
    pub complexity: Complexity,
    #[serde(alias = "needs_multi_doc")]
    pub needs_multi_document: bool,
}

impl Intent {
    /// Used whenever classification cannot be trusted
    pub fn conservative() -> Self {
        Self {
            intent_type: IntentType::Other,
            granularity: Granularity::Document,
            complexity: Complexity::Medium,
            needs_multi_document: true,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.intent_type {
            IntentType::Factual => "factual",
            IntentType::Comparison => "comparison",
            IntentType::Summarization => "summarization",
            IntentType::MultiHop => "multi-hop",
            IntentType::Other => "other",
        };
        let granularity = match self.granularity {
            Granularity::Document => "document",
            Granularity::Passage => "passage",
        };
        let complexity = match self.complexity {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        };
        write!(
            f,
            "{} question, {} granularity, {} complexity, {}",
            kind,
            granularity,
            complexity,
            if self.needs_multi_document {
                "needs several documents"
            } else {
                "single document"
            }
        )
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::conservative()
    }
}

/// A narrower search query derived from the original question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubQuery {
    pub text: String,
    /// Iteration that produced it (0-based)
    pub iteration: u32,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, iteration: u32) -> Self {
        Self {
            text: text.into(),
            iteration,
        }
    }

    /// Case-insensitive identity used for de-duplication
    pub fn dedup_key(&self) -> String {
        self.text.trim().to_lowercase()
    }
}
