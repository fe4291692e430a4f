//! # Evaluator Skill
//!
//! Scores whether the accumulated evidence answers the original query.
//! Any doubt resolves to "insufficient" (0.0) so the loop keeps gathering
//! instead of stopping early on a bad reading.

use serde::Deserialize;

use crate::gateway::{LanguageModelGateway, PromptSpec};
use crate::skills::prompts::{self, tasks, truncate_chars};
use crate::state::{EvidenceSet, Query, SufficiencyScore};

const ITEM_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct SufficiencyResponse {
    #[serde(alias = "score")]
    sufficiency_score: f32,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SufficiencyEvaluator {
    gateway: LanguageModelGateway,
    max_items: usize,
}

impl SufficiencyEvaluator {
    pub fn new(gateway: LanguageModelGateway) -> Self {
        Self {
            gateway,
            max_items: 5,
        }
    }

    /// How many of the top-ranked items are shown to the model
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    /// Score the full accumulated set. Never fails.
    pub async fn score(&self, query: &Query, evidence: &EvidenceSet, iteration: u32) -> SufficiencyScore {
        if evidence.is_empty() {
            return SufficiencyScore::new(0.0, iteration).with_reason("no evidence gathered");
        }

        let prompt = PromptSpec::new(tasks::SCORE_SUFFICIENCY, self.message(query, evidence))
            .with_system(prompts::SUFFICIENCY)
            .with_temperature(0.0)
            .with_max_tokens(500);

        match self.gateway.complete_structured::<SufficiencyResponse>(&prompt).await {
            Ok(response) if (0.0..=1.0).contains(&response.sufficiency_score) => {
                let score = SufficiencyScore::new(response.sufficiency_score, iteration);
                match response.reason {
                    Some(reason) => score.with_reason(reason),
                    None => score,
                }
            }
            Ok(response) => {
                tracing::warn!(
                    iteration,
                    "Sufficiency score {} out of range, treating as insufficient",
                    response.sufficiency_score
                );
                SufficiencyScore::insufficient(
                    iteration,
                    format!("out-of-range score {}", response.sufficiency_score),
                )
            }
            Err(e) => {
                tracing::warn!(iteration, "Sufficiency evaluation failed, treating as insufficient: {}", e);
                SufficiencyScore::insufficient(iteration, e.to_string())
            }
        }
    }

    fn message(&self, query: &Query, evidence: &EvidenceSet) -> String {
        let blocks = evidence
            .iter()
            .take(self.max_items)
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "[{}] (source: {})\n{}",
                    i + 1,
                    item.source_id,
                    truncate_chars(&item.content, ITEM_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        format!(
            "Question: {}\n\nRetrieved evidence (top {} of {} items):\n\n{}",
            query.text,
            evidence.len().min(self.max_items),
            evidence.len(),
            blocks
        )
    }
}
