//! OpenAI-compatible chat completions backend.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{CompletionRequest, LanguageModel};
use crate::error::GatewayError;
use crate::models::GatewayConfig;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// POSTs to a `/v1/chat/completions` style endpoint
#[derive(Debug, Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpChatModel {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("docresearch/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            timeout,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let endpoint = config
            .model
            .base_url
            .clone()
            .context("HTTP provider requires base_url")?;
        let mut model = Self::new(endpoint, config.model.model.clone(), config.timeout())?;
        if let Some(var) = &config.model.api_key_env {
            model.api_key = Some(
                std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))?,
            );
        }
        Ok(model)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl LanguageModel for HttpChatModel {
    fn name(&self) -> String {
        format!("{} @ {}", self.model, self.endpoint)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
        });

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(GatewayError::Transport(format!("HTTP {}: {}", status, detail)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("invalid completion body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::MalformedResponse("completion had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            task: "test",
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 100,
        }
    }

    fn model(server: &MockServer) -> HttpChatModel {
        HttpChatModel::new(
            format!("{}/v1/chat/completions", server.uri()),
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hello"}],
                "max_tokens": 100
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .mount(&server)
            .await;

        let text = model(&server).complete(&request()).await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let text = model(&server)
            .with_api_key("secret")
            .complete(&request())
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = model(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref msg) if msg.contains("503")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = model(&server).complete(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let mut config = GatewayConfig::default();
        config.model.base_url = None;
        assert!(HttpChatModel::from_config(&config).is_err());
        assert!(HttpChatModel::from_config(&GatewayConfig::default()).is_ok());
    }
}
