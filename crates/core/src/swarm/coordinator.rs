//! # Research Coordinator
//!
//! Drives a query through the research loop, from planning to the final
//! report. Owns all per-session state and guarantees termination within
//! the configured iteration budget whatever the model says.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ConfigError, ResearchError, RetrievalError};
use crate::gateway::{LanguageModel, LanguageModelGateway};
use crate::memory::ConversationHistory;
use crate::models::GatewayConfig;
use crate::skills::{EvidenceRefiner, QueryPlanner, ReportSynthesizer, SufficiencyEvaluator};
use crate::state::{
    EvidenceItem, Granularity, Intent, IterationRecord, Query, Report, ReportStatus, SubQuery,
};
use crate::tools::{CorpusHandle, EvidenceRetriever};

use super::events::{ResearchEvent, ResearchEventKind};
use super::pipeline::ResearchStage;
use super::session::ResearchSession;

/// Upper bound for `max_subqueries_per_iteration`
pub const MAX_SUBQUERIES_LIMIT: usize = 10;

/// Configuration for the research controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// PLANNING → EVALUATING cycles before synthesis is forced (>= 1)
    pub max_iterations: u32,
    /// Score at which gathering stops, within [0, 1]
    pub sufficiency_threshold: f32,
    pub max_subqueries_per_iteration: usize,
    /// Items kept per sub-query retrieval
    pub retrieval_top_k: usize,
    /// Bound on each sub-query retrieval
    pub retrieval_timeout_ms: u64,
    /// Wall-clock budget for a whole session; synthesis starts once exceeded
    pub session_timeout_ms: Option<u64>,
    pub max_evidence_for_evaluation: usize,
    pub max_evidence_in_report: usize,
    /// Incoming evidence below this relevance is dropped (0 disables)
    pub min_relevance: f32,
    pub gateway: GatewayConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            sufficiency_threshold: 0.7,
            max_subqueries_per_iteration: 3,
            retrieval_top_k: 10,
            retrieval_timeout_ms: 30_000,
            session_timeout_ms: None,
            max_evidence_for_evaluation: 5,
            max_evidence_in_report: 10,
            min_relevance: 0.0,
            gateway: GatewayConfig::default(),
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations < 1 {
            return Err(ConfigError::MaxIterations(self.max_iterations));
        }
        if !(0.0..=1.0).contains(&self.sufficiency_threshold) {
            return Err(ConfigError::SufficiencyThreshold(self.sufficiency_threshold));
        }
        if !(1..=MAX_SUBQUERIES_LIMIT).contains(&self.max_subqueries_per_iteration) {
            return Err(ConfigError::MaxSubqueries {
                got: self.max_subqueries_per_iteration,
                max: MAX_SUBQUERIES_LIMIT,
            });
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::RetrievalTopK);
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(ConfigError::MinRelevance(self.min_relevance));
        }
        if self.retrieval_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "retrieval_timeout_ms",
            });
        }
        if self.session_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroDuration {
                field: "session_timeout_ms",
            });
        }
        self.gateway.validate()
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }
}

/// Why evidence gathering stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Synthesize,
    Cancelled,
}

/// One iteration's retrieval results, merged in sub-query order
#[derive(Debug, Default)]
struct RetrievalBatch {
    items: Vec<EvidenceItem>,
    failed: usize,
}

/// Resolves to `None` if the token fires first
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// The research controller
pub struct ResearchController {
    config: ResearchConfig,
    planner: QueryPlanner,
    refiner: EvidenceRefiner,
    evaluator: SufficiencyEvaluator,
    synthesizer: ReportSynthesizer,
    retriever: Arc<dyn EvidenceRetriever>,
    corpus: CorpusHandle,
    /// Intent per normalized query text, kept until `reset()`
    intent_cache: Mutex<HashMap<String, Intent>>,
    event_tx: Option<mpsc::Sender<ResearchEvent>>,
}

impl ResearchController {
    /// Validates `config` before anything else; an invalid configuration
    /// never reaches the model or the retriever.
    pub fn new(
        config: ResearchConfig,
        model: Arc<dyn LanguageModel>,
        retriever: Arc<dyn EvidenceRetriever>,
        corpus: CorpusHandle,
    ) -> Result<Self, ResearchError> {
        config.validate()?;

        let gateway = LanguageModelGateway::new(model, &config.gateway);
        tracing::info!(
            model = %gateway.model_name(),
            max_iterations = config.max_iterations,
            threshold = config.sufficiency_threshold,
            "Research controller ready"
        );

        Ok(Self {
            planner: QueryPlanner::new(gateway.clone()),
            refiner: EvidenceRefiner::new().with_min_relevance(config.min_relevance),
            evaluator: SufficiencyEvaluator::new(gateway.clone())
                .with_max_items(config.max_evidence_for_evaluation),
            synthesizer: ReportSynthesizer::new(gateway)
                .with_max_evidence(config.max_evidence_in_report),
            retriever,
            corpus,
            intent_cache: Mutex::new(HashMap::new()),
            event_tx: None,
            config,
        })
    }

    /// Set event channel for streaming progress
    pub fn with_event_channel(mut self, tx: mpsc::Sender<ResearchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn corpus(&self) -> CorpusHandle {
        self.corpus
    }

    /// Drop cached intents. Idempotent.
    pub fn reset(&self) {
        if let Ok(mut cache) = self.intent_cache.lock() {
            cache.clear();
        }
        tracing::debug!("Research controller caches cleared");
    }

    /// Run one research session to completion
    pub async fn research(
        &self,
        query: &str,
        history: &ConversationHistory,
    ) -> Result<Report, ResearchError> {
        self.research_with_cancellation(query, history, &CancellationToken::new())
            .await
    }

    /// Like [`ResearchController::research`], aborting cooperatively when
    /// `cancel` fires. A cancelled session still returns a report, with
    /// status `Cancelled`.
    #[tracing::instrument(skip_all, fields(query_preview = tracing::field::Empty))]
    pub async fn research_with_cancellation(
        &self,
        query: &str,
        history: &ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<Report, ResearchError> {
        let query = Query::new(query).with_history(history.clone());
        tracing::Span::current().record("query_preview", query.preview().as_str());
        let mut session = ResearchSession::new(query, self.config.max_iterations);

        self.emit(
            ResearchEvent::new(ResearchEventKind::SessionStarted, session.id).with_data(
                serde_json::json!({ "query": session.query.text, "max_iterations": self.config.max_iterations }),
            ),
        )
        .await;

        let exit = match self.gather(&mut session, cancel).await {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!(session = %session.id, "Research session failed: {}", e);
                self.emit(
                    ResearchEvent::new(ResearchEventKind::SessionFailed, session.id)
                        .with_data(serde_json::json!({ "error": e.to_string() })),
                )
                .await;
                return Err(e);
            }
        };

        if exit == Exit::Cancelled || cancel.is_cancelled() {
            return Ok(self.cancelled_report(&mut session).await);
        }

        session.pipeline.synthesize_now();
        self.emit(ResearchEvent::stage_entered(session.id, ResearchStage::Synthesizing))
            .await;

        let synthesis = self.synthesizer.synthesize(
            &session.query,
            &session.evidence,
            &session.query.history,
        );
        let report = match guarded(cancel, synthesis).await {
            Some(report) => report,
            None => return Ok(self.cancelled_report(&mut session).await),
        };

        session.pipeline.advance();
        let report = report.for_session(session.id, session.take_records());
        tracing::info!(
            session = %session.id,
            iterations = report.iterations,
            evidence = report.evidence.len(),
            status = ?report.status,
            "Research complete"
        );
        self.emit(
            ResearchEvent::new(ResearchEventKind::ReportReady, session.id).with_data(serde_json::json!({
                "report_id": report.id,
                "status": report.status,
                "iterations": report.iterations,
            })),
        )
        .await;
        Ok(report)
    }

    /// PLANNING → RETRIEVING → REFINING → EVALUATING until the score meets
    /// the threshold, the budget runs out, time runs out, or cancellation
    async fn gather(
        &self,
        session: &mut ResearchSession,
        cancel: &CancellationToken,
    ) -> Result<Exit, ResearchError> {
        loop {
            // PLANNING
            if let Some(exit) = self.checkpoint(session, cancel) {
                return Ok(exit);
            }
            self.advance(session).await;
            let intent = match session.intent {
                Some(intent) => intent,
                None => match guarded(cancel, self.intent_for(&session.query)).await {
                    Some(intent) => {
                        session.intent = Some(intent);
                        intent
                    }
                    None => return Ok(Exit::Cancelled),
                },
            };
            let context = session.planning_context();
            let decomposition = self.planner.decompose(
                &session.query,
                &intent,
                self.config.max_subqueries_per_iteration,
                &context,
            );
            let sub_queries = match guarded(cancel, decomposition).await {
                Some(sub_queries) => sub_queries,
                None => return Ok(Exit::Cancelled),
            };

            // RETRIEVING
            if let Some(exit) = self.checkpoint(session, cancel) {
                return Ok(exit);
            }
            self.advance(session).await;
            let retrieval = self.retrieve_all(session.id, &sub_queries, intent.granularity);
            let batch = match guarded(cancel, retrieval).await {
                Some(batch) => batch?,
                None => return Ok(Exit::Cancelled),
            };

            // REFINING
            if let Some(exit) = self.checkpoint(session, cancel) {
                return Ok(exit);
            }
            self.advance(session).await;
            let retrieved = batch.items.len();
            let evidence = std::mem::take(&mut session.evidence);
            let (evidence, stats) = self.refiner.merge_with_stats(evidence, batch.items);
            session.evidence = evidence;

            // EVALUATING
            if let Some(exit) = self.checkpoint(session, cancel) {
                return Ok(exit);
            }
            self.advance(session).await;
            let scoring = self
                .evaluator
                .score(&session.query, &session.evidence, session.iteration());
            let score = match guarded(cancel, scoring).await {
                Some(score) => score,
                None => return Ok(Exit::Cancelled),
            };

            tracing::info!(
                iteration = session.iteration(),
                sub_queries = sub_queries.len(),
                failed = batch.failed,
                evidence = session.evidence.len(),
                score = score.value,
                "Iteration complete"
            );
            self.emit(
                ResearchEvent::new(ResearchEventKind::IterationCompleted, session.id).with_data(
                    serde_json::json!({
                        "iteration": session.iteration(),
                        "score": score.value,
                        "evidence": session.evidence.len(),
                    }),
                ),
            )
            .await;

            let again = session
                .pipeline
                .decide(&score, self.config.sufficiency_threshold);
            session.records.push(IterationRecord {
                iteration: score.iteration,
                sub_queries,
                retrieved,
                accepted: stats.accepted(),
                failed_sub_queries: batch.failed,
                evidence_total: session.evidence.len(),
                score,
            });
            if !again {
                return Ok(Exit::Synthesize);
            }
        }
    }

    /// Stage-boundary check for cancellation and the session budget
    fn checkpoint(&self, session: &ResearchSession, cancel: &CancellationToken) -> Option<Exit> {
        if cancel.is_cancelled() {
            return Some(Exit::Cancelled);
        }
        match self.config.session_timeout() {
            Some(budget) if session.elapsed() >= budget => {
                tracing::warn!(
                    session = %session.id,
                    iteration = session.iteration(),
                    "Session time budget of {:?} exhausted, synthesizing now",
                    budget
                );
                Some(Exit::Synthesize)
            }
            _ => None,
        }
    }

    async fn advance(&self, session: &mut ResearchSession) {
        let stage = session.pipeline.advance();
        tracing::debug!(session = %session.id, stage = ?stage, "Entered stage");
        self.emit(ResearchEvent::stage_entered(session.id, stage))
            .await;
    }

    async fn intent_for(&self, query: &Query) -> Intent {
        let key = query.normalized();
        let cached = self
            .intent_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).copied());
        if let Some(intent) = cached {
            return intent;
        }

        let intent = self.planner.classify_intent(query).await;
        if let Ok(mut cache) = self.intent_cache.lock() {
            cache.insert(key, intent);
        }
        intent
    }

    /// SCATTER one task per sub-query, GATHER in sub-query order.
    /// Only an unavailable corpus is fatal.
    async fn retrieve_all(
        &self,
        session_id: Uuid,
        sub_queries: &[SubQuery],
        granularity: Granularity,
    ) -> Result<RetrievalBatch, ResearchError> {
        let timeout = self.config.retrieval_timeout();
        let mut join_set = JoinSet::new();

        for (index, sub_query) in sub_queries.iter().cloned().enumerate() {
            let retriever = self.retriever.clone();
            let corpus = self.corpus;
            join_set.spawn(async move {
                let result = match tokio::time::timeout(
                    timeout,
                    retriever.retrieve(&sub_query, &corpus, granularity),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RetrievalError::Timeout {
                        sub_query: sub_query.text.clone(),
                        after: timeout,
                    }),
                };
                (index, sub_query, result)
            });
        }

        let mut slots: Vec<Vec<EvidenceItem>> = vec![Vec::new(); sub_queries.len()];
        let mut failed = 0;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(mut items))) => {
                    items.truncate(self.config.retrieval_top_k);
                    slots[index] = items;
                }
                Ok((_, _, Err(RetrievalError::CorpusUnavailable(reason)))) => {
                    join_set.abort_all();
                    return Err(ResearchError::CorpusUnavailable(reason));
                }
                Ok((_, sub_query, Err(e))) => {
                    failed += 1;
                    tracing::warn!("Sub-query retrieval failed: {}", e);
                    self.emit(
                        ResearchEvent::new(ResearchEventKind::SubQueryFailed, session_id)
                            .with_data(serde_json::json!({
                                "sub_query": sub_query.text,
                                "error": e.to_string(),
                            })),
                    )
                    .await;
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Retrieval task panicked: {}", e);
                }
            }
        }

        if failed > 0 && failed == sub_queries.len() {
            tracing::warn!("All {} sub-query retrievals failed", failed);
        }

        Ok(RetrievalBatch {
            items: slots.into_iter().flatten().collect(),
            failed,
        })
    }

    async fn cancelled_report(&self, session: &mut ResearchSession) -> Report {
        tracing::info!(session = %session.id, iteration = session.iteration(), "Research cancelled");
        self.emit(ResearchEvent::new(ResearchEventKind::SessionCancelled, session.id))
            .await;
        ReportSynthesizer::fallback_report(&session.query, &session.evidence, ReportStatus::Cancelled)
            .for_session(session.id, session.take_records())
    }

    /// Emit an event
    async fn emit(&self, event: ResearchEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::testing::ScriptedModel;
    use crate::skills::prompts::tasks;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const INTENT_JSON: &str = r#"{"intent_type": "summary", "granularity": "chunk", "complexity": "medium", "needs_multi_doc": true}"#;

    /// Returns one item per sub-query, named after it
    #[derive(Default)]
    struct FakeRetriever {
        failing: HashSet<String>,
        delays: HashMap<String, Duration>,
        unavailable: bool,
        calls: AtomicUsize,
    }

    impl FakeRetriever {
        fn failing_on(mut self, sub_query: &str) -> Self {
            self.failing.insert(sub_query.to_string());
            self
        }

        fn slow_on(mut self, sub_query: &str, delay: Duration) -> Self {
            self.delays.insert(sub_query.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl EvidenceRetriever for FakeRetriever {
        async fn retrieve(
            &self,
            sub_query: &SubQuery,
            _corpus: &CorpusHandle,
            granularity: Granularity,
        ) -> Result<Vec<EvidenceItem>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&sub_query.text) {
                tokio::time::sleep(*delay).await;
            }
            if self.unavailable {
                return Err(RetrievalError::CorpusUnavailable("store offline".into()));
            }
            if self.failing.contains(&sub_query.text) {
                return Err(RetrievalError::Failed {
                    sub_query: sub_query.text.clone(),
                    reason: "index error".into(),
                });
            }
            Ok(vec![EvidenceItem::new(
                format!("doc_{}", sub_query.text),
                format!("evidence about {}", sub_query.text),
                0.8,
                granularity,
            )])
        }
    }

    fn config(max_iterations: u32) -> ResearchConfig {
        let mut config = ResearchConfig {
            max_iterations,
            sufficiency_threshold: 0.7,
            ..ResearchConfig::default()
        };
        config.gateway.initial_backoff_ms = 0;
        config.gateway.max_backoff_ms = 0;
        config
    }

    fn scripted(scores: &[&str]) -> ScriptedModel {
        let mut model = ScriptedModel::new()
            .reply(tasks::CLASSIFY_INTENT, INTENT_JSON)
            .reply(tasks::DECOMPOSE, r#"["alpha", "beta", "gamma"]"#)
            .reply(tasks::SYNTHESIZE_REPORT, "The findings are [1] and [2].");
        for score in scores {
            model = model.reply(
                tasks::SCORE_SUFFICIENCY,
                format!(r#"{{"sufficiency_score": {}, "reason": "test"}}"#, score),
            );
        }
        model
    }

    fn controller(
        config: ResearchConfig,
        model: Arc<ScriptedModel>,
        retriever: Arc<FakeRetriever>,
    ) -> ResearchController {
        ResearchController::new(config, model, retriever, CorpusHandle::new()).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_a_stops_when_sufficient() {
        let model = Arc::new(scripted(&["0.4", "0.8"]));
        let ctl = controller(config(3), model.clone(), Arc::new(FakeRetriever::default()));

        let report = ctl
            .research("What are the main findings?", &ConversationHistory::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(model.calls_for(tasks::SCORE_SUFFICIENCY), 2);
        assert_eq!(model.calls_for(tasks::DECOMPOSE), 2);
        assert_eq!(model.calls_for(tasks::CLASSIFY_INTENT), 1);
        assert_eq!(model.calls_for(tasks::SYNTHESIZE_REPORT), 1);
        assert_eq!(report.final_score().map(|s| s.value), Some(0.8));
    }

    #[tokio::test]
    async fn test_scenario_b_runs_to_budget() {
        let model = Arc::new(scripted(&["0.1"]));
        let ctl = controller(config(3), model.clone(), Arc::new(FakeRetriever::default()));

        let report = ctl
            .research("What are the main findings?", &ConversationHistory::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 3);
        assert_eq!(report.trace.len(), 3);
        assert_eq!(model.calls_for(tasks::SCORE_SUFFICIENCY), 3);
        assert!(!report.evidence.is_empty());
        assert_eq!(report.status, ReportStatus::Complete);
    }

    #[tokio::test]
    async fn test_scenario_c_partial_retrieval_failure() {
        let model = Arc::new(scripted(&["0.9"]));
        let retriever = Arc::new(FakeRetriever::default().failing_on("beta"));
        let ctl = controller(config(3), model, retriever.clone());

        let report = ctl
            .research("What are the main findings?", &ConversationHistory::new())
            .await
            .unwrap();

        assert_eq!(retriever.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.trace[0].failed_sub_queries, 1);
        assert_eq!(report.evidence.len(), 2);
        let sources: Vec<_> = report.evidence.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(sources, vec!["doc_alpha", "doc_gamma"]);
    }

    #[tokio::test]
    async fn test_total_retrieval_failure_keeps_iterating() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply(tasks::CLASSIFY_INTENT, INTENT_JSON)
                .reply(tasks::DECOMPOSE, r#"["alpha", "beta", "gamma"]"#)
                .reply(tasks::DECOMPOSE, r#"["delta", "epsilon", "zeta"]"#)
                .reply(tasks::SYNTHESIZE_REPORT, "Nothing was found."),
        );
        let retriever = Arc::new(
            ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]
                .into_iter()
                .fold(FakeRetriever::default(), FakeRetriever::failing_on),
        );
        let ctl = controller(config(2), model.clone(), retriever.clone());

        let report = ctl
            .research("What are the main findings?", &ConversationHistory::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 6);
        assert!(report.trace.iter().all(|r| r.failed_sub_queries == 3));
        assert!(report.trace.iter().all(|r| r.score.value == 0.0));
        assert!(report.evidence.is_empty());
        assert_eq!(model.calls_for(tasks::SCORE_SUFFICIENCY), 0);
        assert_eq!(model.calls_for(tasks::DECOMPOSE), 2);
        assert!(matches!(report.status, ReportStatus::Complete | ReportStatus::Degraded));
    }

    #[test]
    fn test_scenario_d_invalid_config_fails_fast() {
        let model = Arc::new(scripted(&["0.9"]));
        let retriever = Arc::new(FakeRetriever::default());
        let result = ResearchController::new(config(0), model.clone(), retriever.clone(), CorpusHandle::new());

        assert!(matches!(
            result,
            Err(ResearchError::Configuration(ConfigError::MaxIterations(0)))
        ));
        assert_eq!(model.total_calls(), 0);
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_validation() {
        let mut bad = config(3);
        bad.sufficiency_threshold = 1.5;
        assert!(matches!(bad.validate(), Err(ConfigError::SufficiencyThreshold(_))));

        let mut bad = config(3);
        bad.max_subqueries_per_iteration = 0;
        assert!(matches!(bad.validate(), Err(ConfigError::MaxSubqueries { .. })));

        let mut bad = config(3);
        bad.max_subqueries_per_iteration = MAX_SUBQUERIES_LIMIT + 1;
        assert!(matches!(bad.validate(), Err(ConfigError::MaxSubqueries { .. })));

        let mut bad = config(3);
        bad.session_timeout_ms = Some(0);
        assert!(matches!(bad.validate(), Err(ConfigError::ZeroDuration { .. })));

        let mut bad = config(3);
        bad.gateway.max_retries = 0;
        assert_eq!(bad.validate(), Err(ConfigError::GatewayRetries));

        assert!(ResearchConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_model_still_terminates() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply(tasks::CLASSIFY_INTENT, "??")
                .reply(tasks::DECOMPOSE, "??")
                .reply(tasks::SCORE_SUFFICIENCY, "??")
                .reply(tasks::SYNTHESIZE_REPORT, "A short answer."),
        );
        let ctl = controller(config(4), model.clone(), Arc::new(FakeRetriever::default()));

        let report = ctl.research("q", &ConversationHistory::new()).await.unwrap();

        assert_eq!(report.iterations, 4);
        assert!(report.trace.iter().all(|r| r.score.fallback && r.score.value == 0.0));
        // Decomposition fell back to the original query every round
        assert!(report.trace.iter().all(|r| r.sub_queries.len() == 1 && r.sub_queries[0].text == "q"));
    }

    #[tokio::test]
    async fn test_unreachable_model_yields_degraded_report() {
        let down = || GatewayError::Transport("connection refused".into());
        let model = Arc::new(
            ScriptedModel::new()
                .fail(tasks::CLASSIFY_INTENT, down())
                .fail(tasks::DECOMPOSE, down())
                .fail(tasks::SCORE_SUFFICIENCY, down())
                .fail(tasks::SYNTHESIZE_REPORT, down()),
        );
        let ctl = controller(config(2), model, Arc::new(FakeRetriever::default()));

        let report = ctl.research("main findings", &ConversationHistory::new()).await.unwrap();

        assert_eq!(report.status, ReportStatus::Degraded);
        assert_eq!(report.iterations, 2);
        assert!(report.body.contains("main findings"));
        assert!(report.body.contains("doc_main findings"));
    }

    #[tokio::test]
    async fn test_unavailable_corpus_is_fatal() {
        let model = Arc::new(scripted(&["0.9"]));
        let retriever = Arc::new(FakeRetriever {
            unavailable: true,
            ..FakeRetriever::default()
        });
        let ctl = controller(config(3), model.clone(), retriever);

        let err = ctl.research("q", &ConversationHistory::new()).await.unwrap_err();
        assert!(matches!(err, ResearchError::CorpusUnavailable(_)));
        assert_eq!(model.calls_for(tasks::SYNTHESIZE_REPORT), 0);
    }

    #[tokio::test]
    async fn test_evidence_order_follows_sub_query_order() {
        let model = Arc::new(scripted(&["0.9"]));
        let retriever = Arc::new(
            FakeRetriever::default()
                .slow_on("alpha", Duration::from_millis(60))
                .slow_on("beta", Duration::from_millis(30)),
        );
        let ctl = controller(config(1), model, retriever);

        let report = ctl.research("q", &ConversationHistory::new()).await.unwrap();
        let sources: Vec<_> = report.evidence.iter().map(|i| i.source_id.as_str()).collect();
        assert_eq!(sources, vec!["doc_alpha", "doc_beta", "doc_gamma"]);
    }

    #[tokio::test]
    async fn test_slow_retrieval_times_out_without_blocking_others() {
        let model = Arc::new(scripted(&["0.9"]));
        let retriever = Arc::new(FakeRetriever::default().slow_on("beta", Duration::from_secs(10)));
        let mut config = config(1);
        config.retrieval_timeout_ms = 50;
        let ctl = controller(config, model, retriever);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            ctl.research("q", &ConversationHistory::new()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(report.trace[0].failed_sub_queries, 1);
        assert_eq!(report.evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let model = Arc::new(scripted(&["0.9"]));
        let ctl = controller(config(3), model.clone(), Arc::new(FakeRetriever::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = ctl
            .research_with_cancellation("q", &ConversationHistory::new(), &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Cancelled);
        assert_eq!(report.iterations, 0);
        assert_eq!(model.total_calls(), 0);
        assert!(!report.body.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_call() {
        let model = Arc::new(
            scripted(&["0.9"]).with_task_delay(tasks::SCORE_SUFFICIENCY, Duration::from_secs(30)),
        );
        let ctl = controller(config(3), model.clone(), Arc::new(FakeRetriever::default()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            ctl.research_with_cancellation("q", &ConversationHistory::new(), &cancel),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.status, ReportStatus::Cancelled);
        assert_eq!(model.calls_for(tasks::SYNTHESIZE_REPORT), 0);
        // Evidence gathered before the cancel is still reported
        assert_eq!(report.evidence.len(), 3);
        assert!(report.body.contains("doc_alpha"));
    }

    #[tokio::test]
    async fn test_session_budget_forces_synthesis() {
        let model = Arc::new(
            scripted(&["0.1"]).with_task_delay(tasks::DECOMPOSE, Duration::from_millis(30)),
        );
        let mut config = config(3);
        config.session_timeout_ms = Some(10);
        let ctl = controller(config, model.clone(), Arc::new(FakeRetriever::default()));

        let report = ctl.research("q", &ConversationHistory::new()).await.unwrap();

        assert_eq!(report.status, ReportStatus::Complete);
        assert_eq!(report.iterations, 0);
        assert_eq!(model.calls_for(tasks::SCORE_SUFFICIENCY), 0);
        assert_eq!(model.calls_for(tasks::SYNTHESIZE_REPORT), 1);
    }

    #[tokio::test]
    async fn test_intent_is_cached_until_reset() {
        let model = Arc::new(scripted(&["0.9"]));
        let ctl = controller(config(1), model.clone(), Arc::new(FakeRetriever::default()));
        let history = ConversationHistory::new();

        ctl.research("Main findings?", &history).await.unwrap();
        ctl.research("  main FINDINGS? ", &history).await.unwrap();
        assert_eq!(model.calls_for(tasks::CLASSIFY_INTENT), 1);

        ctl.reset();
        ctl.reset();
        ctl.research("Main findings?", &history).await.unwrap();
        assert_eq!(model.calls_for(tasks::CLASSIFY_INTENT), 2);
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let model = Arc::new(scripted(&["0.9"]));
        let (tx, mut rx) = mpsc::channel(128);
        let ctl = controller(config(2), model, Arc::new(FakeRetriever::default())).with_event_channel(tx);

        let report = ctl.research("q", &ConversationHistory::new()).await.unwrap();
        drop(ctl);

        let mut kinds = Vec::new();
        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.session_id, report.session_id);
            if let Some(stage) = event.stage {
                stages.push(stage);
            }
            kinds.push(event.kind);
        }

        assert_eq!(kinds.first(), Some(&ResearchEventKind::SessionStarted));
        assert_eq!(kinds.last(), Some(&ResearchEventKind::ReportReady));
        assert!(kinds.contains(&ResearchEventKind::IterationCompleted));
        assert_eq!(
            stages,
            vec![
                ResearchStage::Planning,
                ResearchStage::Retrieving,
                ResearchStage::Refining,
                ResearchStage::Evaluating,
                ResearchStage::Synthesizing,
            ]
        );
    }

    #[tokio::test]
    async fn test_gateway_settings_reach_every_call() {
        let model = Arc::new(scripted(&["0.9"]));
        let mut config = config(1);
        config.gateway.temperature = Some(0.9);
        config.gateway.max_tokens = Some(77);
        config.gateway.system_instruction = Some("Answer in French.".into());
        let ctl = controller(config, model.clone(), Arc::new(FakeRetriever::default()));

        ctl.research("What are the main findings?", &ConversationHistory::new())
            .await
            .unwrap();

        let calls = model.calls();
        let tasks_seen: HashSet<_> = calls.iter().map(|c| c.task).collect();
        assert_eq!(tasks_seen.len(), 4);
        for call in &calls {
            assert_eq!(call.temperature, 0.9, "{}", call.task);
            assert_eq!(call.max_tokens, 77, "{}", call.task);
            let system = call.system_prompt().unwrap_or_default();
            assert!(system.starts_with("Answer in French.\n\n"), "{}", call.task);
        }
    }

    #[tokio::test]
    async fn test_history_reaches_synthesis() {
        let model = Arc::new(scripted(&["0.9"]));
        let ctl = controller(config(1), model.clone(), Arc::new(FakeRetriever::default()));

        let mut history = ConversationHistory::new();
        let first = ctl.research("What did the report say?", &history).await.unwrap();
        history.record(&first);
        assert_eq!(history.recent(1)[0].query_id, first.query_id);

        ctl.research("And about costs?", &history).await.unwrap();
        let synth_calls: Vec<_> = model
            .calls()
            .into_iter()
            .filter(|c| c.task == tasks::SYNTHESIZE_REPORT)
            .collect();
        assert!(!synth_calls[0].user_prompt().contains("Conversation history"));
        assert!(synth_calls[1].user_prompt().contains("User: What did the report say?"));
    }
}
