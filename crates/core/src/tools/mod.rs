//! # Retrieval Tools
//!
//! Deterministic collaborators of the research loop.
//!
//! ## Modules
//!
//! - `retriever` - `DocumentStore` / `EvidenceRetriever` contracts and document types
//! - `keyword_index` - in-memory keyword-overlap implementation of both

pub mod keyword_index;
pub mod retriever;

pub use keyword_index::KeywordIndex;
pub use retriever::{CorpusHandle, DocumentStore, EvidenceRetriever, SourceDocument};
