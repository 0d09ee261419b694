use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{PilotError, PilotResult};
use crate::llm::prompt;
use crate::llm::provider::{DecisionService, InferenceRequest};
use crate::llm::sse_parser::SseAccumulator;
use crate::llm::types::CallConfig;

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, call: CallConfig) -> Self {
        Self {
            id,
            api_base,
            api_key,
            call,
            client: reqwest::Client::new(),
        }
    }

    /// Chat-completions body with the screenshot as the final user turn and a
    /// strict JSON-schema response format.
    pub fn build_body(&self, request: &InferenceRequest) -> serde_json::Value {
        let mut messages = request.context.clone();
        messages.push(prompt::user_turn(&request.image_png));
        serde_json::json!({
            "model": self.call.model,
            "messages": messages,
            "stream": self.call.stream,
            "temperature": self.call.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "agent_response",
                    "strict": true,
                    "schema": request.response_schema,
                },
            },
        })
    }
}

#[async_trait]
impl DecisionService for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn infer(&self, request: InferenceRequest) -> PilotResult<String> {
        let body = self.build_body(&request);

        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            stream = self.call.stream,
            messages = request.context.len() + 1,
            "sending inference request"
        );
        tracing::debug!(body = %sanitize_for_log(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::DecisionService(format!("{status}: {err_body}")));
        }

        let content = if self.call.stream {
            self.handle_stream(response).await?
        } else {
            self.handle_json(response).await?
        };

        if content.trim().is_empty() {
            return Err(PilotError::DecisionService("No response content".into()));
        }
        Ok(content)
    }
}

impl OpenAiCompatibleProvider {
    /// Accumulate an SSE stream into the full reply content.
    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<String> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = SseAccumulator::new();

        while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            acc.feed(&String::from_utf8_lossy(&bytes));
            if acc.done {
                break;
            }
        }
        // Flush a final line that arrived without a trailing newline.
        acc.feed("\n");

        tracing::info!(
            content_len = acc.content.len(),
            reasoning_len = acc.reasoning.len(),
            "inference stream complete"
        );
        Ok(acc.content)
    }

    async fn handle_json(&self, response: reqwest::Response) -> PilotResult<String> {
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        tracing::info!(content_len = content.len(), "inference response received");
        Ok(content)
    }
}

/// Serialize a request body for logging with image payloads replaced.
pub fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            // content can be a string or an array of parts; only parts carry images.
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) != Some("image_url") {
                    continue;
                }
                if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                    *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
