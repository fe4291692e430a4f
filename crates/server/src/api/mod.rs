//! # Research API
//!
//! HTTP endpoints for registering documents, running research and
//! streaming progress.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use docresearch_core::error::ResearchError;
use docresearch_core::memory::ConversationHistory;
use docresearch_core::models::LlmProvider;
use docresearch_core::state::{Report, ReportStatus};
use docresearch_core::tools::{DocumentStore, SourceDocument};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use utoipa::{OpenApi, ToSchema};

use crate::{PersistedConfig, SharedState};

// === API Types ===

#[derive(Serialize, ToSchema)]
pub struct ApiResponse {
    success: bool,
    message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    initialized: bool,
    document_count: usize,
    conversation_turns: usize,
    running: bool,
    model: String,
}

/// One already-extracted document
#[derive(Deserialize, ToSchema)]
pub struct DocumentInput {
    source_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    passages: Vec<String>,
}

impl From<DocumentInput> for SourceDocument {
    fn from(input: DocumentInput) -> Self {
        let mut doc = SourceDocument::new(input.source_id, input.title);
        doc.summary = input.summary;
        doc.passages = input.passages;
        doc
    }
}

#[derive(Deserialize, ToSchema)]
pub struct DocumentsRequest {
    documents: Vec<DocumentInput>,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentsResponse {
    corpus_id: String,
    document_count: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct ResearchRequest {
    query: String,
}

#[derive(Serialize, ToSchema)]
pub struct CitationResponse {
    index: usize,
    source_id: String,
    relevance: f32,
}

#[derive(Serialize, ToSchema)]
pub struct ResearchResponse {
    report_id: String,
    session_id: String,
    query: String,
    report: String,
    /// complete, degraded or cancelled
    status: String,
    iterations: u32,
    evidence_count: usize,
    citations: Vec<CitationResponse>,
}

impl From<&Report> for ResearchResponse {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id.to_string(),
            session_id: report.session_id.to_string(),
            query: report.query.clone(),
            report: report.body.clone(),
            status: report.status.as_str().to_string(),
            iterations: report.iterations,
            evidence_count: report.evidence.len(),
            citations: report
                .citations
                .iter()
                .map(|c| CitationResponse {
                    index: c.index,
                    source_id: c.source_id.clone(),
                    relevance: c.relevance,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProviderInfo {
    id: String,
    name: String,
    default_model: String,
    supports_base_url: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ProvidersResponse {
    providers: Vec<ProviderInfo>,
}

type ApiError = (StatusCode, Json<ApiResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.into(),
        }),
    )
}

// === OpenAPI ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "DocResearch API",
        version = "1.0.0",
        description = "Iterative research over a registered document collection"
    ),
    paths(
        health,
        get_status,
        register_documents,
        research,
        cancel_research,
        reset,
        get_providers
    ),
    components(
        schemas(
            ApiResponse,
            HealthResponse,
            StatusResponse,
            DocumentInput,
            DocumentsRequest,
            DocumentsResponse,
            ResearchRequest,
            ResearchResponse,
            CitationResponse,
            ProviderInfo,
            ProvidersResponse,
            PersistedConfig
        )
    ),
    tags(
        (name = "research", description = "Research sessions"),
        (name = "documents", description = "Document collection"),
        (name = "system", description = "Health and discovery")
    )
)]
struct ApiDoc;

pub fn router() -> Router<SharedState> {
    let v1 = Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/documents", post(register_documents))
        .route("/research", post(research))
        .route("/research/cancel", post(cancel_research))
        .route("/reset", post(reset))
        .route("/events", get(events))
        .route("/providers", get(get_providers))
        .route("/openapi.json", get(serve_openapi));

    Router::new().nest("/api/v1", v1)
}

// === API Handlers ===

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Current corpus and session status
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "research",
    responses(
        (status = 200, description = "Current status", body = StatusResponse)
    )
)]
async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let session = state.session.read().await;
    Json(StatusResponse {
        initialized: session.corpus.is_some(),
        document_count: session.document_count,
        conversation_turns: session.history.len(),
        running: session.running.is_some(),
        model: state.model.name(),
    })
}

/// Register documents, replacing the current collection
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body = DocumentsRequest,
    responses(
        (status = 200, description = "Collection registered", body = DocumentsResponse),
        (status = 400, description = "No documents given", body = ApiResponse),
        (status = 409, description = "Research in progress", body = ApiResponse)
    )
)]
async fn register_documents(
    State(state): State<SharedState>,
    Json(req): Json<DocumentsRequest>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    if req.documents.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No documents given"));
    }
    let documents: Vec<SourceDocument> = req.documents.into_iter().map(Into::into).collect();
    let document_count = documents.len();

    let mut session = state.session.write().await;
    if session.running.is_some() {
        return Err(api_error(
            StatusCode::CONFLICT,
            "Cannot replace documents while research is running",
        ));
    }

    let corpus = state
        .index
        .add_documents(documents)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let controller = state
        .controller_for(corpus)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if let Some(previous) = session.corpus.replace(corpus) {
        state.index.remove(&previous).await;
    }
    session.controller = Some(Arc::new(controller));
    session.document_count = document_count;

    tracing::info!(corpus = %corpus, documents = document_count, "Document collection replaced");
    Ok(Json(DocumentsResponse {
        corpus_id: corpus.to_string(),
        document_count,
    }))
}

/// Run one research session and return its report
#[utoipa::path(
    post,
    path = "/api/v1/research",
    tag = "research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Report produced", body = ResearchResponse),
        (status = 400, description = "Empty query or no documents", body = ApiResponse),
        (status = 409, description = "Research already running", body = ApiResponse),
        (status = 503, description = "Document collection unavailable", body = ApiResponse)
    )
)]
async fn research(
    State(state): State<SharedState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Query must not be empty"));
    }

    let (controller, history, active) = {
        let mut session = state.session.write().await;
        let Some(controller) = session.controller.clone() else {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "No documents registered; POST /api/v1/documents first",
            ));
        };
        if session.running.is_some() {
            return Err(api_error(
                StatusCode::CONFLICT,
                "A research session is already running",
            ));
        }
        (controller, session.history.clone(), session.begin_research())
    };

    // A dropped request cancels the run; the task below still releases the session
    let disconnect = active.cancel.clone().drop_guard();
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let result = controller
            .research_with_cancellation(&query, &history, &active.cancel)
            .await;
        let mut session = task_state.session.write().await;
        if session.finish_research(active.id) {
            if let Ok(report) = &result {
                if report.status != ReportStatus::Cancelled {
                    session.history.record(report);
                }
            }
        }
        result
    });
    let joined = task.await;
    disconnect.disarm();

    match joined {
        Ok(Ok(report)) => Ok(Json(ResearchResponse::from(&report))),
        Ok(Err(ResearchError::CorpusUnavailable(reason))) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Document collection unavailable: {}", reason),
        )),
        Ok(Err(e)) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        Err(e) => {
            tracing::warn!("Research task failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Cancel the running research session
#[utoipa::path(
    post,
    path = "/api/v1/research/cancel",
    tag = "research",
    responses(
        (status = 200, description = "Whether a session was cancelled", body = ApiResponse)
    )
)]
async fn cancel_research(State(state): State<SharedState>) -> Json<ApiResponse> {
    let session = state.session.read().await;
    match &session.running {
        Some(active) => {
            active.cancel.cancel();
            Json(ApiResponse {
                success: true,
                message: "Cancellation requested".to_string(),
            })
        }
        None => Json(ApiResponse {
            success: false,
            message: "No research in progress".to_string(),
        }),
    }
}

/// Drop the document collection, conversation history and cached intents
#[utoipa::path(
    post,
    path = "/api/v1/reset",
    tag = "research",
    responses(
        (status = 200, description = "State cleared", body = ApiResponse)
    )
)]
async fn reset(State(state): State<SharedState>) -> Json<ApiResponse> {
    let mut session = state.session.write().await;
    if let Some(active) = session.running.take() {
        active.cancel.cancel();
    }
    if let Some(controller) = session.controller.take() {
        controller.reset();
    }
    if let Some(corpus) = session.corpus.take() {
        state.index.remove(&corpus).await;
    }
    session.document_count = 0;
    session.history = ConversationHistory::new();

    tracing::info!("Research state reset");
    Json(ApiResponse {
        success: true,
        message: "Reset complete".to_string(),
    })
}

/// Supported language-model providers
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    tag = "system",
    responses(
        (status = 200, description = "Supported providers", body = ProvidersResponse)
    )
)]
async fn get_providers() -> Json<ProvidersResponse> {
    let providers = LlmProvider::all()
        .into_iter()
        .map(|p| ProviderInfo {
            id: p.id().to_string(),
            name: p.display_name().to_string(),
            default_model: p.default_model().to_string(),
            supports_base_url: p.supports_base_url(),
        })
        .collect();
    Json(ProvidersResponse { providers })
}

/// SSE endpoint for research events with heartbeat
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        match tokio::time::timeout(Duration::from_secs(15), rx.recv()).await {
            Ok(Ok(event)) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Some((Ok(Event::default().data(json)), rx))
            }
            Ok(Err(RecvError::Lagged(skipped))) => Some((
                Ok(Event::default().comment(format!("skipped {} events", skipped))),
                rx,
            )),
            Ok(Err(RecvError::Closed)) => None,
            Err(_) => Some((Ok(Event::default().comment("heartbeat")), rx)),
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    ([(header::CONTENT_TYPE, "application/json")], spec)
}
