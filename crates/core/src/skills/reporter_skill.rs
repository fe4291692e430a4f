//! # Reporter Skill
//!
//! Produces the final cited report. Always returns a [`Report`]: when the
//! model cannot deliver usable text the body is a deterministic summary of
//! the sources that were gathered.

use crate::gateway::{LanguageModelGateway, PromptSpec};
use crate::memory::ConversationHistory;
use crate::skills::prompts::{self, tasks, truncate_chars};
use crate::state::{Citation, EvidenceSet, Query, Report, ReportStatus};

const ITEM_CHARS: usize = 300;
const HISTORY_TURNS: usize = 4;
const HISTORY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ReportSynthesizer {
    gateway: LanguageModelGateway,
    max_evidence: usize,
}

impl ReportSynthesizer {
    pub fn new(gateway: LanguageModelGateway) -> Self {
        Self {
            gateway,
            max_evidence: 10,
        }
    }

    /// How many of the top-ranked items are cited in the prompt
    pub fn with_max_evidence(mut self, max_evidence: usize) -> Self {
        self.max_evidence = max_evidence.max(1);
        self
    }

    pub async fn synthesize(
        &self,
        query: &Query,
        evidence: &EvidenceSet,
        history: &ConversationHistory,
    ) -> Report {
        let citations = self.citations(evidence);
        let prompt = PromptSpec::new(
            tasks::SYNTHESIZE_REPORT,
            self.message(query, evidence, history),
        )
        .with_system(prompts::REPORT)
        .with_temperature(0.3)
        .with_max_tokens(2000);

        match self.gateway.complete(&prompt).await {
            Ok(body) if !body.trim().is_empty() => Report::new(
                query,
                body.trim(),
                ReportStatus::Complete,
                citations,
                evidence.clone(),
            ),
            Ok(_) => {
                tracing::warn!("Report synthesis returned empty text, using degraded report");
                Self::fallback_report(query, evidence, ReportStatus::Degraded)
            }
            Err(e) => {
                tracing::warn!("Report synthesis failed, using degraded report: {}", e);
                Self::fallback_report(query, evidence, ReportStatus::Degraded)
            }
        }
    }

    /// Report built without the model
    pub fn fallback_report(query: &Query, evidence: &EvidenceSet, status: ReportStatus) -> Report {
        Report::new(
            query,
            Self::degraded_body(&query.text, evidence),
            status,
            Vec::new(),
            evidence.clone(),
        )
    }

    /// Deterministic text naming the query and each distinct source
    pub fn degraded_body(query: &str, evidence: &EvidenceSet) -> String {
        if evidence.is_empty() {
            return format!(
                "Unable to synthesize a report for \"{}\": no evidence was gathered from the document collection.",
                query
            );
        }

        let mut body = format!(
            "Unable to synthesize a full report for \"{}\". {} evidence items were gathered from these sources:",
            query,
            evidence.len()
        );
        for (source, count) in evidence.sources() {
            body.push_str(&format!(
                "\n- {} ({} {})",
                source,
                count,
                if count == 1 { "item" } else { "items" }
            ));
        }
        body
    }

    fn citations(&self, evidence: &EvidenceSet) -> Vec<Citation> {
        evidence
            .iter()
            .take(self.max_evidence)
            .enumerate()
            .map(|(i, item)| Citation {
                index: i + 1,
                source_id: item.source_id.clone(),
                relevance: item.relevance,
            })
            .collect()
    }

    fn message(&self, query: &Query, evidence: &EvidenceSet, history: &ConversationHistory) -> String {
        let mut message = String::new();

        let recent = history.recent(HISTORY_TURNS);
        if !recent.is_empty() {
            message.push_str("Conversation history:\n");
            for turn in recent {
                message.push_str(&format!(
                    "User: {}\nAssistant: {}\n",
                    truncate_chars(&turn.query, HISTORY_CHARS),
                    truncate_chars(&turn.report, HISTORY_CHARS)
                ));
            }
            message.push('\n');
        }

        message.push_str(&format!("Question: {}\n\nEvidence:\n", query.text));
        if evidence.is_empty() {
            message.push_str("(no evidence was found in the document collection)\n");
        }
        for (i, item) in evidence.iter().take(self.max_evidence).enumerate() {
            message.push_str(&format!(
                "\n[{}] (source: {}, relevance {:.2})\n{}\n",
                i + 1,
                item.source_id,
                item.relevance,
                truncate_chars(&item.content, ITEM_CHARS)
            ));
        }

        message.push_str(
            "\nWrite a research report answering the question. Cite evidence with its number, e.g. [1].",
        );
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::testing::ScriptedModel;
    use crate::gateway::RetryPolicy;
    use crate::memory::ConversationTurn;
    use crate::models::GatewayConfig;
    use crate::state::{EvidenceItem, Granularity};
    use std::sync::Arc;
    use uuid::Uuid;

    fn build(model: ScriptedModel) -> (ReportSynthesizer, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let gateway = LanguageModelGateway::new(model.clone(), &GatewayConfig::default())
            .with_retry_policy(RetryPolicy::immediate(2));
        (ReportSynthesizer::new(gateway), model)
    }

    fn evidence() -> EvidenceSet {
        vec![
            EvidenceItem::new("doc_1", "Revenue grew 12%.", 0.9, Granularity::Passage),
            EvidenceItem::new("doc_2", "Costs fell.", 0.7, Granularity::Passage),
            EvidenceItem::new("doc_1", "Margins widened.", 0.6, Granularity::Passage),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_complete_report_with_citations() {
        let (synth, model) = build(
            ScriptedModel::new().reply(tasks::SYNTHESIZE_REPORT, "Revenue grew 12% [1] while costs fell [2]."),
        );
        let report = synth
            .synthesize(&Query::new("How did the year go?"), &evidence(), &ConversationHistory::new())
            .await;

        assert_eq!(report.status, ReportStatus::Complete);
        assert!(report.body.contains("[1]"));
        assert_eq!(report.citations.len(), 3);
        assert_eq!(report.citations[0].index, 1);
        assert_eq!(report.citations[0].source_id, "doc_1");
        assert_eq!(report.evidence.len(), 3);

        let prompt = model.calls()[0].user_prompt();
        assert!(prompt.contains("[2] (source: doc_2"));
        assert!(!prompt.contains("Conversation history"));
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_deterministically() {
        let (synth, model) = build(
            ScriptedModel::new().fail(tasks::SYNTHESIZE_REPORT, GatewayError::Transport("down".into())),
        );
        let query = Query::new("How did the year go?");
        let first = synth.synthesize(&query, &evidence(), &ConversationHistory::new()).await;
        let second = synth.synthesize(&query, &evidence(), &ConversationHistory::new()).await;

        assert_eq!(first.status, ReportStatus::Degraded);
        assert_eq!(first.body, second.body);
        assert!(first.body.contains("How did the year go?"));
        assert!(first.body.contains("- doc_1 (2 items)"));
        assert!(first.body.contains("- doc_2 (1 item)"));
        assert_eq!(model.calls_for(tasks::SYNTHESIZE_REPORT), 4);
    }

    #[tokio::test]
    async fn test_blank_text_degrades() {
        let (synth, _) = build(ScriptedModel::new().reply(tasks::SYNTHESIZE_REPORT, "   \n"));
        let report = synth
            .synthesize(&Query::new("q"), &EvidenceSet::new(), &ConversationHistory::new())
            .await;
        assert!(report.is_degraded());
        assert!(!report.body.is_empty());
        assert!(report.body.contains("no evidence was gathered"));
    }

    #[tokio::test]
    async fn test_prompt_includes_recent_history_only() {
        let (synth, model) = build(ScriptedModel::new().reply(tasks::SYNTHESIZE_REPORT, "ok"));
        let mut history = ConversationHistory::new();
        for i in 0..6 {
            history.push(ConversationTurn {
                query_id: Uuid::new_v4(),
                query: format!("question {}", i),
                report_id: Uuid::new_v4(),
                report: "r".repeat(400),
            });
        }
        synth.synthesize(&Query::new("q"), &evidence(), &history).await;

        let prompt = model.calls()[0].user_prompt();
        assert!(!prompt.contains("question 1"));
        assert!(prompt.contains("question 2"));
        assert!(prompt.contains("question 5"));
        assert!(!prompt.contains(&"r".repeat(201)));
    }

    #[tokio::test]
    async fn test_evidence_cap() {
        let (synth, model) = build(ScriptedModel::new().reply(tasks::SYNTHESIZE_REPORT, "ok"));
        let synth = synth.with_max_evidence(2);
        let report = synth
            .synthesize(&Query::new("q"), &evidence(), &ConversationHistory::new())
            .await;
        assert_eq!(report.citations.len(), 2);
        assert!(!model.calls()[0].user_prompt().contains("[3]"));
    }
}
