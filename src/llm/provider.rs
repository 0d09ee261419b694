use async_trait::async_trait;

use crate::errors::PilotResult;
use crate::llm::types::ChatMessage;

/// Everything the decision service needs for one step.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Current composited frame.
    pub image_png: Vec<u8>,
    /// System prompt and prior turns, oldest first.
    pub context: Vec<ChatMessage>,
    /// JSON schema the reply must satisfy.
    pub response_schema: serde_json::Value,
}

/// Vision model boundary. Implementations return the raw JSON content of
/// the reply; validation happens in the caller.
#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Identifier (matches the config.toml provider key).
    fn name(&self) -> &str;

    async fn infer(&self, request: InferenceRequest) -> PilotResult<String>;
}
