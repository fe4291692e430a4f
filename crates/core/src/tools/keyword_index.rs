//! # Keyword Index
//!
//! In-memory reference store and retriever. Relevance is the share of query
//! terms that appear in a unit of text; passage granularity searches
//! individual passages, document granularity searches whole documents.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::retriever::{CorpusHandle, DocumentStore, EvidenceRetriever, SourceDocument};
use crate::error::RetrievalError;
use crate::state::{EvidenceItem, Granularity, SubQuery};

/// Lower-cased terms with surrounding punctuation stripped
fn terms(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// |query ∩ unit| / |query|
fn keyword_relevance(query_terms: &HashSet<String>, text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let unit_terms = terms(text);
    let hits = query_terms.iter().filter(|t| unit_terms.contains(*t)).count();
    hits as f32 / query_terms.len() as f32
}

#[derive(Debug)]
pub struct KeywordIndex {
    corpora: RwLock<HashMap<CorpusHandle, Vec<SourceDocument>>>,
    top_k: usize,
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self {
            corpora: RwLock::new(HashMap::new()),
            top_k: 10,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn document_count(&self, corpus: &CorpusHandle) -> Option<usize> {
        self.corpora.read().await.get(corpus).map(Vec::len)
    }

    /// Forget a corpus; later retrievals against it fail as unavailable
    pub async fn remove(&self, corpus: &CorpusHandle) -> bool {
        self.corpora.write().await.remove(corpus).is_some()
    }

    fn units(doc: &SourceDocument, granularity: Granularity) -> Vec<String> {
        match granularity {
            Granularity::Passage if !doc.passages.is_empty() => doc.passages.clone(),
            _ => vec![doc.full_text()],
        }
    }
}

#[async_trait]
impl DocumentStore for KeywordIndex {
    async fn add_documents(&self, documents: Vec<SourceDocument>) -> Result<CorpusHandle, RetrievalError> {
        let handle = CorpusHandle::new();
        tracing::info!(corpus = %handle, documents = documents.len(), "Registered corpus");
        self.corpora.write().await.insert(handle, documents);
        Ok(handle)
    }
}

#[async_trait]
impl EvidenceRetriever for KeywordIndex {
    async fn retrieve(
        &self,
        sub_query: &SubQuery,
        corpus: &CorpusHandle,
        granularity: Granularity,
    ) -> Result<Vec<EvidenceItem>, RetrievalError> {
        let corpora = self.corpora.read().await;
        let documents = corpora
            .get(corpus)
            .ok_or_else(|| RetrievalError::CorpusUnavailable(format!("unknown {}", corpus)))?;

        let query_terms = terms(&sub_query.text);
        let mut scored: Vec<EvidenceItem> = documents
            .iter()
            .flat_map(|doc| {
                Self::units(doc, granularity)
                    .into_iter()
                    .map(move |unit| (doc.source_id.clone(), unit))
            })
            .filter_map(|(source_id, unit)| {
                let relevance = keyword_relevance(&query_terms, &unit);
                (relevance > 0.0).then(|| EvidenceItem::new(source_id, unit, relevance, granularity))
            })
            .collect();

        // Stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        scored.truncate(self.top_k);
        Ok(scored)
    }
}
