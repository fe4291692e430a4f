//! # DocResearch Core
//!
//! Iterative document research: a query is planned into sub-queries,
//! evidence is retrieved from a document collection, refined, scored for
//! sufficiency, and finally synthesized into a cited report.
//!
//! ## Architecture
//!
//! - `gateway/` - Language model gateway (timeouts, retries, structured output)
//! - `models` - Provider and gateway configuration
//! - `skills/` - Planner, refiner, evaluator and report synthesizer
//! - `tools/` - Document store and evidence retriever contracts
//! - `state/` - Query, evidence and report types
//! - `memory/` - Conversation history across sessions
//! - `swarm/` - Research controller and pipeline state machine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docresearch_core::memory::ConversationHistory;
//! use docresearch_core::swarm::{ResearchConfig, ResearchController};
//! use docresearch_core::tools::{DocumentStore, KeywordIndex, SourceDocument};
//! use std::sync::Arc;
//!
//! let index = Arc::new(KeywordIndex::new());
//! let corpus = index.add_documents(vec![SourceDocument::new("doc_1", "Annual report").with_passage("Revenue grew 12%.")]).await?;
//!
//! let config = ResearchConfig::default();
//! let model = config.gateway.create_model()?;
//! let controller = ResearchController::new(config, model, index, corpus)?;
//! let report = controller.research("What are the main findings?", &ConversationHistory::new()).await?;
//! ```

pub mod error;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;
pub mod tools;

pub use error::{ConfigError, GatewayError, ResearchError, RetrievalError};
