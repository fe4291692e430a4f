//! # Language Model Gateway
//!
//! Single choke point for every model call the pipeline makes. Skills hand
//! the gateway a [`PromptSpec`]; the gateway applies sampling defaults, a
//! per-attempt timeout, and bounded retries, then either returns the raw
//! text or extracts a typed value from it.
//!
//! Backends implement [`LanguageModel`]:
//!
//! - [`HttpChatModel`] - any OpenAI-compatible chat completions endpoint
//! - [`ProviderModel`] - hosted providers through radkit

pub mod extract;
mod http;
mod provider;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::GatewayError;
use crate::models::GatewayConfig;

pub use extract::parse_structured;
pub use http::HttpChatModel;
pub use provider::ProviderModel;
pub use retry::RetryPolicy;

/// Used when neither the configuration nor the task sets a temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
/// Used when neither the configuration nor the task sets an output limit
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Fully resolved request handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Which pipeline task issued the call; for logs and test routing
    pub task: &'static str,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Non-system messages joined into one block
    pub fn user_prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A text-completion capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> String;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

/// What a skill wants to ask, before gateway defaults are applied
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub task: &'static str,
    pub system: Option<String>,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl PromptSpec {
    pub fn new(task: &'static str, user: impl Into<String>) -> Self {
        Self {
            task,
            system: None,
            user: user.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Stateless wrapper applying timeout, retry, and extraction to a backend.
/// Cheap to clone; safe to share across concurrent tasks.
#[derive(Clone)]
pub struct LanguageModelGateway {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    retry: RetryPolicy,
    temperature: Option<f32>,
    top_p: f32,
    max_tokens: Option<u32>,
    system_instruction: Option<String>,
}

impl std::fmt::Debug for LanguageModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModelGateway")
            .field("model", &self.model.name())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl LanguageModelGateway {
    pub fn new(model: Arc<dyn LanguageModel>, config: &GatewayConfig) -> Self {
        Self {
            model,
            timeout: config.timeout(),
            retry: config.retry_policy(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            system_instruction: config.system_instruction.clone(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    /// Configured values win over the task's own; the configured system
    /// instruction is prepended to the task's system prompt.
    fn build_request(&self, prompt: &PromptSpec) -> CompletionRequest {
        let system = match (self.system_instruction.as_deref(), prompt.system.as_deref()) {
            (Some(instruction), Some(task)) => Some(format!("{}\n\n{}", instruction, task)),
            (Some(instruction), None) => Some(instruction.to_string()),
            (None, task) => task.map(str::to_string),
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt.user.clone()));
        CompletionRequest {
            task: prompt.task,
            messages,
            temperature: self
                .temperature
                .or(prompt.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            top_p: self.top_p,
            max_tokens: self
                .max_tokens
                .or(prompt.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    /// Raw completion text. Transport failures and timeouts are retried up
    /// to the policy's attempt limit; the last error is returned.
    #[tracing::instrument(skip(self, prompt), fields(task = prompt.task))]
    pub async fn complete(&self, prompt: &PromptSpec) -> Result<String, GatewayError> {
        let request = self.build_request(prompt);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.model.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(self.timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "Model call failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Completion parsed into `T`. Extraction failures are not retried.
    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        prompt: &PromptSpec,
    ) -> Result<T, GatewayError> {
        let text = self.complete(prompt).await?;
        parse_structured(&text)
    }
}
