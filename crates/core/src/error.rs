//! # Error Taxonomy
//!
//! Typed errors for the research pipeline. Only [`ResearchError`] ever
//! reaches a caller of `research()`; everything else is absorbed by the
//! component that observes it.

use std::time::Duration;
use thiserror::Error;

/// Failure talking to the language-model capability
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// Network or HTTP level failure. Retried by the gateway.
    #[error("transport error: {0}")]
    Transport(String),
    /// A single attempt exceeded the configured timeout. Retried by the gateway.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    /// The model answered but its output failed structured extraction.
    /// Never retried; callers apply their own fallback.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Whether another attempt with the same payload may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Timeout(_))
    }
}

/// Failure retrieving evidence for one sub-query
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    /// The retriever could not answer this sub-query
    #[error("retrieval failed for '{sub_query}': {reason}")]
    Failed { sub_query: String, reason: String },
    /// The per-sub-query time bound elapsed
    #[error("retrieval timed out for '{sub_query}' after {after:?}")]
    Timeout { sub_query: String, after: Duration },
    /// The document store itself is gone. Fatal for the session.
    #[error("corpus unavailable: {0}")]
    CorpusUnavailable(String),
}

/// Invalid research parameters, detected before any work starts
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_iterations must be at least 1 (got {0})")]
    MaxIterations(u32),
    #[error("sufficiency_threshold must be within [0, 1] (got {0})")]
    SufficiencyThreshold(f32),
    #[error("max_subqueries_per_iteration must be within 1..={max} (got {got})")]
    MaxSubqueries { got: usize, max: usize },
    #[error("retrieval_top_k must be at least 1")]
    RetrievalTopK,
    #[error("min_relevance must be within [0, 1] (got {0})")]
    MinRelevance(f32),
    #[error("{field} must be a non-zero duration")]
    ZeroDuration { field: &'static str },
    #[error("gateway max_retries must be at least 1")]
    GatewayRetries,
    #[error("gateway temperature must be within [0, 2] (got {0})")]
    Temperature(f32),
    #[error("gateway max_tokens must be at least 1")]
    MaxTokens,
}

/// Hard failures surfaced by the research controller
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("invalid research configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("corpus store unavailable: {0}")]
    CorpusUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Transport("reset".into()).is_retryable());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::MalformedResponse("not json".into()).is_retryable());
    }

    #[test]
    fn test_config_error_converts_into_research_error() {
        let err: ResearchError = ConfigError::MaxIterations(0).into();
        assert!(matches!(err, ResearchError::Configuration(_)));
        assert!(err.to_string().contains("max_iterations"));
    }
}
