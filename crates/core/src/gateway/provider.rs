//! Hosted-provider backend built on radkit's `LlmFunction`.

use async_trait::async_trait;
use radkit::errors::AgentError;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, LanguageModel};
use crate::error::GatewayError;
use crate::models::ModelConfig;

/// Runs an `LlmFunction` against whichever provider the config names.
/// Handles the provider matching once in a central place.
macro_rules! run_llm_function {
    ($config:expr, $sampling:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let (temperature, max_tokens) = $sampling;
        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Http => Err(anyhow::anyhow!(
                "the http provider is served by HttpChatModel"
            )),
            LlmProvider::Anthropic => {
                let llm = AnthropicLlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenAI => {
                let mut llm = OpenAILlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                if let Some(base_url) = &config.base_url {
                    llm = llm.with_base_url(base_url);
                }
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Gemini => {
                let llm = GeminiLlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::OpenRouter => {
                let llm = OpenRouterLlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::Grok => {
                let llm = GrokLlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
            LlmProvider::DeepSeek => {
                let llm = DeepSeekLlm::from_env(&config.model)?
                    .with_temperature(temperature)
                    .with_max_tokens(max_tokens);
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt)
                    .run($input)
                    .await
                    .map_err(Into::into)
            }
        };
        result
    }};
}

/// Plain-text envelope; JSON extraction happens downstream in the gateway
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ModelReply {
    /// The complete answer, verbatim, including any JSON the prompt asked for
    pub text: String,
}

const DEFAULT_SYSTEM: &str = "You are a careful research assistant. Follow the user's output format exactly.";

/// Anthropic, OpenAI, Gemini, OpenRouter, Grok, or DeepSeek via radkit
#[derive(Debug, Clone)]
pub struct ProviderModel {
    config: ModelConfig,
}

impl ProviderModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn run(&self, request: &CompletionRequest) -> anyhow::Result<ModelReply> {
        let system = request.system_prompt().unwrap_or(DEFAULT_SYSTEM).to_string();
        let sampling = (request.temperature, request.max_tokens);
        run_llm_function!(&self.config, sampling, ModelReply, system, request.user_prompt())
    }
}

/// Reply-shape problems are content errors and must not be retried
fn classify(error: anyhow::Error) -> GatewayError {
    match error.downcast_ref::<AgentError>() {
        Some(AgentError::Serialization { .. } | AgentError::Validation { .. }) => {
            GatewayError::MalformedResponse(error.to_string())
        }
        _ => GatewayError::Transport(error.to_string()),
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    fn name(&self) -> String {
        format!("{} ({})", self.config.model, self.config.provider.display_name())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.run(request).await.map(|reply| reply.text).map_err(classify)
    }
}
