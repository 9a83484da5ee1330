//! Abstraction over the planner's LLM collaborator. The concrete provider
//! integration (auth, transport, model selection) lives outside this crate;
//! `plan()` only needs something that can answer these two questions.

use async_trait::async_trait;
use zace_core::{AppError, ProviderErrorKind};

/// Raw response from one LLM invocation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Whatever text the provider returned, structured or not.
    pub text: String,
    /// Whether the provider actually honored the schema transport (as
    /// opposed to returning free-form text that happens to parse).
    pub transport_structured: bool,
}

/// Planner-facing LLM operations (§4.3).
#[async_trait]
pub trait PlannerLlmClient: Send + Sync {
    /// Invoke with a response-format hint carrying `schema`. Implementations
    /// classify provider rejections via [`ProviderErrorKind`] so the pipeline
    /// can route `invalid_message_shape` / `response_format_unsupported`.
    async fn complete_with_schema(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<LlmResponse, AppError>;

    /// Invoke without a schema hint; free-form completion.
    async fn complete_free_form(&self, prompt: &str) -> Result<LlmResponse, AppError>;
}

/// A client that always reports the schema transport unsupported, falling
/// every call through to prompt mode. Useful for integration tests of the
/// fallback pipeline and as a placeholder until a real provider is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptOnlyClient;

#[async_trait]
impl PlannerLlmClient for PromptOnlyClient {
    async fn complete_with_schema(
        &self,
        _prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<LlmResponse, AppError> {
        Err(AppError::provider(
            ProviderErrorKind::ResponseFormatUnsupported,
            "schema transport not supported by this client",
        ))
    }

    async fn complete_free_form(&self, _prompt: &str) -> Result<LlmResponse, AppError> {
        Ok(LlmResponse {
            text: String::new(),
            transport_structured: false,
        })
    }
}
