//! # Planner Skill
//!
//! Classifies a query's intent and decomposes it into sub-queries.
//! Stateless: every call is a pure function of its inputs plus the gateway.

use serde::Deserialize;
use std::collections::HashSet;

use crate::gateway::{LanguageModelGateway, PromptSpec};
use crate::skills::prompts::{self, tasks};
use crate::state::{Intent, Query, SubQuery};

/// What earlier iterations already tried, so re-planning can aim elsewhere
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    /// Iteration the new sub-queries are for (0-based)
    pub iteration: u32,
    pub asked: Vec<SubQuery>,
    pub evidence_summary: Option<String>,
}

impl PlanningContext {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn is_first(&self) -> bool {
        self.iteration == 0 && self.asked.is_empty()
    }
}

/// Decomposition output: a bare list, or an object wrapping one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecomposeResponse {
    List(Vec<String>),
    Wrapped {
        #[serde(alias = "subqueries", alias = "queries")]
        sub_queries: Vec<String>,
    },
}

impl DecomposeResponse {
    fn into_vec(self) -> Vec<String> {
        match self {
            DecomposeResponse::List(v) => v,
            DecomposeResponse::Wrapped { sub_queries } => sub_queries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlanner {
    gateway: LanguageModelGateway,
}

impl QueryPlanner {
    pub fn new(gateway: LanguageModelGateway) -> Self {
        Self { gateway }
    }

    /// Never fails: any gateway error yields [`Intent::conservative`]
    pub async fn classify_intent(&self, query: &Query) -> Intent {
        let prompt = PromptSpec::new(tasks::CLASSIFY_INTENT, format!("Question: {}", query.text))
            .with_system(prompts::INTENT)
            .with_temperature(0.0)
            .with_max_tokens(500);

        match self.gateway.complete_structured::<Intent>(&prompt).await {
            Ok(intent) => {
                tracing::debug!(intent = %intent, "Classified query");
                intent
            }
            Err(e) => {
                tracing::warn!("Intent classification fell back to conservative default: {}", e);
                Intent::conservative()
            }
        }
    }

    /// Up to `max_subqueries` distinct, non-empty sub-queries. Falls back to
    /// the original query when the model offers nothing usable.
    pub async fn decompose(
        &self,
        query: &Query,
        intent: &Intent,
        max_subqueries: usize,
        context: &PlanningContext,
    ) -> Vec<SubQuery> {
        let prompt = PromptSpec::new(
            tasks::DECOMPOSE,
            Self::decompose_message(query, intent, max_subqueries, context),
        )
        .with_system(prompts::DECOMPOSE)
        .with_temperature(0.3)
        .with_max_tokens(1000);

        let raw = match self.gateway.complete_structured::<DecomposeResponse>(&prompt).await {
            Ok(response) => response.into_vec(),
            Err(e) => {
                tracing::warn!("Decomposition failed, using the original query: {}", e);
                Vec::new()
            }
        };

        Self::sanitize(raw, query, max_subqueries, context)
    }

    fn decompose_message(
        query: &Query,
        intent: &Intent,
        max_subqueries: usize,
        context: &PlanningContext,
    ) -> String {
        let mut message = format!(
            "Question: {}\nIntent: {}\nReturn at most {} sub-queries.",
            query.text, intent, max_subqueries
        );
        if !context.is_first() {
            message.push_str(&format!(
                "\n\nThis is research round {}. The evidence so far is not sufficient.",
                context.iteration + 1
            ));
            if !context.asked.is_empty() {
                message.push_str("\nSub-queries already asked:");
                for sub in &context.asked {
                    message.push_str(&format!("\n- {}", sub.text));
                }
            }
            if let Some(summary) = &context.evidence_summary {
                message.push_str(&format!("\nEvidence gathered so far: {}", summary));
            }
        }
        message
    }

    /// Trim, drop empties and repeats (case-insensitive, including earlier
    /// rounds), cap at `max`; never returns an empty batch
    pub(crate) fn sanitize(
        raw: Vec<String>,
        query: &Query,
        max: usize,
        context: &PlanningContext,
    ) -> Vec<SubQuery> {
        let mut seen: HashSet<String> = context.asked.iter().map(SubQuery::dedup_key).collect();
        let mut out = Vec::new();

        for text in raw {
            let sub = SubQuery::new(text.trim(), context.iteration);
            if sub.text.is_empty() {
                continue;
            }
            if seen.insert(sub.dedup_key()) {
                out.push(sub);
            }
            if out.len() >= max {
                break;
            }
        }

        if out.is_empty() {
            out.push(SubQuery::new(query.text.trim(), context.iteration));
        }
        out
    }
}
