//! # Retrieval Interface
//!
//! Contracts for the document store and the evidence retriever the
//! research loop consumes. The loop never looks inside a corpus; it only
//! holds a [`CorpusHandle`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RetrievalError;
use crate::state::{EvidenceItem, Granularity, SubQuery};

/// Opaque reference to a registered set of documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusHandle(Uuid);

impl CorpusHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for CorpusHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorpusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corpus-{}", self.0)
    }
}

/// Already-extracted document text; no parsing or chunking happens here
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    pub source_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub passages: Vec<String>,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            summary: None,
            passages: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_passage(mut self, passage: impl Into<String>) -> Self {
        self.passages.push(passage.into());
        self
    }

    /// Document-level text: the summary when present, else all passages
    pub fn full_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.trim().is_empty() => summary.clone(),
            _ => self.passages.join("\n\n"),
        }
    }
}

/// Registers documents and hands back a handle to search them by
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add_documents(&self, documents: Vec<SourceDocument>) -> Result<CorpusHandle, RetrievalError>;
}

/// Ranked evidence for one sub-query.
///
/// `granularity` is a hint from intent classification; implementations
/// decide what it means for them.
#[async_trait]
pub trait EvidenceRetriever: Send + Sync {
    async fn retrieve(
        &self,
        sub_query: &SubQuery,
        corpus: &CorpusHandle,
        granularity: Granularity,
    ) -> Result<Vec<EvidenceItem>, RetrievalError>;
}
