// Kilo Engine — Anthropic Provider
// Messages-API dialect. Thinking and temperature are mutually exclusive
// here by provider contract — the gateway guarantees the request never
// carries both, and this adapter enforces it again by construction.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;
use zeroize::Zeroizing;

use super::{summarize_thinking, CircuitBreaker, LlmProvider, ProviderRequest};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{LlmResponse, LlmToolCall, Role};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
/// Capability flag required when thinking and tools ride together.
const THINKING_TOOLS_BETA: &str = "interleaved-thinking-2025-05-14";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    /// Zeroed from RAM on drop.
    api_key: Zeroizing<String>,
    circuit: CircuitBreaker,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key: Zeroizing::new(api_key),
            circuit: CircuitBreaker::new(5, 60),
        }
    }

    fn build_body(request: &ProviderRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect(),
            );
        }

        match request.thinking_budget {
            Some(budget) => {
                // Thinking set → no temperature, ever.
                body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
            }
            None => {
                if let Some(temperature) = request.temperature {
                    body["temperature"] = json!(temperature);
                }
            }
        }
        body
    }

    fn parse_response(model: &str, value: &Value, latency_ms: u64) -> LlmResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut thinking_blocks: Vec<String> = Vec::new();

        if let Some(blocks) = value["content"].as_array() {
            for block in blocks {
                match block["type"].as_str().unwrap_or_default() {
                    "text" => {
                        content.push_str(block["text"].as_str().unwrap_or_default());
                    }
                    "tool_use" => tool_calls.push(LlmToolCall {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].clone(),
                    }),
                    "thinking" => {
                        if let Some(text) = block["thinking"].as_str() {
                            thinking_blocks.push(text.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        LlmResponse {
            content,
            tool_calls,
            model: value["model"].as_str().unwrap_or(model).to_string(),
            provider: "anthropic".into(),
            prompt_tokens: value["usage"]["input_tokens"].as_u64().unwrap_or(0),
            completion_tokens: value["usage"]["output_tokens"].as_u64().unwrap_or(0),
            latency_ms,
            thinking_summary: summarize_thinking(&thinking_blocks),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty() && self.circuit.is_closed()
    }

    async fn complete(&self, request: &ProviderRequest) -> EngineResult<LlmResponse> {
        let body = Self::build_body(request);
        let url = format!("{}/v1/messages", self.base_url);

        let mut req = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        if request.thinking_budget.is_some() && request.thinking_with_tools {
            req = req.header("anthropic-beta", THINKING_TOOLS_BETA);
        }

        info!("[anthropic] {} → {}", request.model, url);
        let started = Instant::now();
        let resp = req.json(&body).send().await.map_err(|e| {
            self.circuit.record_failure();
            if e.is_timeout() {
                EngineError::LlmTimeout { seconds: request.timeout.as_secs() }
            } else {
                EngineError::llm("anthropic", &request.model, e.to_string())
            }
        })?;

        let status = resp.status();
        let value: Value = resp.json().await.map_err(|e| {
            self.circuit.record_failure();
            EngineError::llm("anthropic", &request.model, format!("bad response body: {}", e))
        })?;

        if !status.is_success() {
            self.circuit.record_failure();
            let detail = value["error"]["message"]
                .as_str()
                .unwrap_or("request failed")
                .to_string();
            warn!("[anthropic] HTTP {}: {}", status, detail);
            return Err(EngineError::llm(
                "anthropic",
                &request.model,
                format!("HTTP {}: {}", status.as_u16(), detail),
            ));
        }

        self.circuit.record_success();
        Ok(Self::parse_response(
            &request.model,
            &value,
            started.elapsed().as_millis() as u64,
        ))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
