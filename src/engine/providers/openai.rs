// Kilo Engine — OpenAI Provider
// Chat-completions dialect. Serves as the fallback family: the gateway
// strips thinking before a request ever reaches here, so this adapter
// carries no extended-reasoning mapping at all.

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;
use zeroize::Zeroizing;

use super::{CircuitBreaker, LlmProvider, ProviderRequest};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{LlmResponse, LlmToolCall, Role};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Zeroizing<String>,
    circuit: CircuitBreaker,
}

impl OpenAiProvider {
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
        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        for m in &request.messages {
            messages.push(json!({
                "role": match m.role {
                    Role::Assistant => "assistant",
                    Role::System => "system",
                    Role::User => "user",
                },
                "content": m.content,
            }));
        }

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }

    fn parse_response(model: &str, value: &Value, latency_ms: u64) -> LlmResponse {
        let message = &value["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or_default().to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or_default();
                // Arguments arrive as a JSON-encoded string.
                let arguments = call["function"]["arguments"]
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or(Value::Null);
                tool_calls.push(LlmToolCall { name: name.to_string(), arguments });
            }
        }

        LlmResponse {
            content,
            tool_calls,
            model: value["model"].as_str().unwrap_or(model).to_string(),
            provider: "openai".into(),
            prompt_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            latency_ms,
            thinking_summary: None,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty() && self.circuit.is_closed()
    }

    async fn complete(&self, request: &ProviderRequest) -> EngineResult<LlmResponse> {
        let body = Self::build_body(request);
        let url = format!("{}/v1/chat/completions", self.base_url);

        info!("[openai] {} → {}", request.model, url);
        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .timeout(request.timeout)
            .header("authorization", format!("Bearer {}", self.api_key.as_str()))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.circuit.record_failure();
                if e.is_timeout() {
                    EngineError::LlmTimeout { seconds: request.timeout.as_secs() }
                } else {
                    EngineError::llm("openai", &request.model, e.to_string())
                }
            })?;

        let status = resp.status();
        let value: Value = resp.json().await.map_err(|e| {
            self.circuit.record_failure();
            EngineError::llm("openai", &request.model, format!("bad response body: {}", e))
        })?;

        if !status.is_success() {
            self.circuit.record_failure();
            let detail = value["error"]["message"]
                .as_str()
                .unwrap_or("request failed")
                .to_string();
            warn!("[openai] HTTP {}: {}", status, detail);
            return Err(EngineError::llm(
                "openai",
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{ChatMessage, ToolSpec};
    use std::time::Duration;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".into(),
            system: "You are Kilo.".into(),
            messages: vec![ChatMessage::user("hello")],
            tools: vec![ToolSpec {
                name: "call_api".into(),
                description: "Call an API".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            max_tokens: 1024,
            temperature: Some(0.3),
            thinking_budget: None,
            thinking_with_tools: false,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn system_message_leads() {
        let body = OpenAiProvider::build_body(&request());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn tools_wrapped_as_functions() {
        let body = OpenAiProvider::build_body(&request());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "call_api");
    }

    #[test]
    fn parses_tool_call_argument_strings() {
        let value = serde_json::json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "function": {
                            "name": "call_api",
                            "arguments": "{\"endpoint\":\"/v1/designs\",\"method\":\"GET\"}"
                        }
                    }]
                }
            }],
            "usage": {"prompt_tokens": 80, "completion_tokens": 12}
        });
        let resp = OpenAiProvider::parse_response("gpt-4o-mini", &value, 100);
        assert_eq!(resp.tool_calls[0].arguments["endpoint"], "/v1/designs");
        assert_eq!(resp.provider, "openai");
        assert!(resp.thinking_summary.is_none());
    }
}
