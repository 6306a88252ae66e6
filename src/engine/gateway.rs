// Kilo Engine — LLM Gateway
// Task-routed provider selection with graceful degradation: each task
// type maps to a primary (and optional fallback) provider+model pair
// plus a thinking config. The fallback path always drops thinking and
// the route's max-tokens override — fallbacks cross provider families,
// so only the lowest common denominator rides along.
//
// `TrackedGateway` decorates the gateway port with fire-and-forget usage
// recording; the attribution context travels with each call, never in a
// shared field.

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::atoms::constants::{
    LLM_DEFAULT_MAX_TOKENS, LLM_THINKING_TIMEOUT, LLM_TIMEOUT,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::{ChatGateway, UsageStore};
use crate::atoms::types::{
    Attribution, LlmRequest, LlmResponse, TaskType, ThinkingConfig, UsageRecord,
};
use crate::engine::pricing::{calculate_cost, model_price, provider_for_model};
use crate::engine::providers::{LlmProvider, ProviderRequest};

// ── Routes ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ProviderBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

#[derive(Clone)]
pub struct Route {
    pub primary: ProviderBinding,
    pub fallback: Option<ProviderBinding>,
    pub thinking: ThinkingConfig,
    /// Route-level max tokens; requests may still override downward.
    pub max_tokens: Option<u32>,
}

/// The standard routing table over a primary/fallback provider pair:
/// cheap models for simple QA, the workhorse for skill execution and
/// doc extraction, extended thinking for complex reasoning and
/// data analysis, a taller token ceiling for skill generation.
pub fn standard_routes(
    primary: ProviderBinding,
    fallback: Option<ProviderBinding>,
) -> Vec<(TaskType, Route)> {
    let route = |thinking: ThinkingConfig, max_tokens: Option<u32>| Route {
        primary: primary.clone(),
        fallback: fallback.clone(),
        thinking,
        max_tokens,
    };
    vec![
        (TaskType::SimpleQa, route(ThinkingConfig::Off, Some(1024))),
        (TaskType::SkillExecution, route(ThinkingConfig::Off, None)),
        (TaskType::SkillGeneration, route(ThinkingConfig::Off, Some(4096))),
        (
            TaskType::ComplexReasoning,
            route(ThinkingConfig::Extended { budget_tokens: 8192 }, Some(4096)),
        ),
        (
            TaskType::DataAnalysis,
            route(ThinkingConfig::Extended { budget_tokens: 4096 }, Some(4096)),
        ),
        (TaskType::DocExtraction, route(ThinkingConfig::Off, Some(4096))),
    ]
}

// ── Gateway ─────────────────────────────────────────────────────────────

pub struct LlmGateway {
    routes: Vec<(TaskType, Route)>,
}

impl LlmGateway {
    /// Build a gateway from a routing table. The first entry doubles as
    /// the last-resort default for unrouted tasks.
    pub fn new(routes: Vec<(TaskType, Route)>) -> EngineResult<Self> {
        if routes.is_empty() {
            return Err(EngineError::Config("gateway needs at least one route".into()));
        }
        Ok(Self { routes })
    }

    fn route_for(&self, task: TaskType) -> &Route {
        self.routes
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, r)| r)
            .unwrap_or(&self.routes[0].1)
    }

    fn primary_request(route: &Route, request: &LlmRequest) -> ProviderRequest {
        let thinking_budget = match route.thinking {
            ThinkingConfig::Extended { budget_tokens } => Some(budget_tokens),
            ThinkingConfig::Off => None,
        };
        let thinking = thinking_budget.is_some();
        ProviderRequest {
            model: route.primary.model.clone(),
            system: request.system.clone(),
            messages: request.messages.clone(),
            tools: request.tools.clone(),
            max_tokens: request
                .max_tokens
                .or(route.max_tokens)
                .unwrap_or(LLM_DEFAULT_MAX_TOKENS),
            // Thinking and temperature are mutually exclusive on the
            // primary request.
            temperature: if thinking { None } else { request.temperature },
            thinking_budget,
            thinking_with_tools: thinking && !request.tools.is_empty(),
            timeout: if thinking { LLM_THINKING_TIMEOUT } else { LLM_TIMEOUT },
        }
    }

    fn fallback_request(binding: &ProviderBinding, request: &LlmRequest) -> ProviderRequest {
        ProviderRequest {
            model: binding.model.clone(),
            system: request.system.clone(),
            messages: request.messages.clone(),
            tools: request.tools.clone(),
            // Graceful degradation: default token ceiling, no thinking.
            max_tokens: LLM_DEFAULT_MAX_TOKENS,
            temperature: request.temperature,
            thinking_budget: None,
            thinking_with_tools: false,
            timeout: LLM_TIMEOUT,
        }
    }

    /// Route and execute one completion: primary if available, fallback
    /// on any primary error, `llm_all_providers_failed` when both are
    /// exhausted.
    pub async fn complete_task(&self, request: &LlmRequest) -> EngineResult<LlmResponse> {
        let route = self.route_for(request.task_type);

        if route.primary.provider.is_available() {
            let provider_request = Self::primary_request(route, request);
            match route.primary.provider.complete(&provider_request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        "[gateway] primary {} failed for {}: {} — trying fallback",
                        route.primary.provider.name(),
                        request.task_type.as_str(),
                        e
                    );
                }
            }
        } else {
            warn!(
                "[gateway] primary {} unavailable for {}",
                route.primary.provider.name(),
                request.task_type.as_str()
            );
        }

        if let Some(fallback) = &route.fallback {
            if fallback.provider.is_available() {
                let provider_request = Self::fallback_request(fallback, request);
                match fallback.provider.complete(&provider_request).await {
                    Ok(response) => return Ok(response),
                    Err(e) => {
                        warn!(
                            "[gateway] fallback {} failed for {}: {}",
                            fallback.provider.name(),
                            request.task_type.as_str(),
                            e
                        );
                    }
                }
            }
        }

        Err(EngineError::AllProvidersFailed {
            task: request.task_type.as_str().to_string(),
        })
    }
}

#[async_trait]
impl ChatGateway for LlmGateway {
    async fn complete(
        &self,
        request: LlmRequest,
        _attribution: &Attribution,
    ) -> EngineResult<LlmResponse> {
        self.complete_task(&request).await
    }
}

// ── Tracked decorator ───────────────────────────────────────────────────

pub struct TrackedGateway {
    inner: Arc<dyn ChatGateway>,
    usage: Arc<dyn UsageStore>,
}

impl TrackedGateway {
    pub fn new(inner: Arc<dyn ChatGateway>, usage: Arc<dyn UsageStore>) -> Self {
        Self { inner, usage }
    }
}

#[async_trait]
impl ChatGateway for TrackedGateway {
    async fn complete(
        &self,
        request: LlmRequest,
        attribution: &Attribution,
    ) -> EngineResult<LlmResponse> {
        let task_type = request.task_type;
        let response = self.inner.complete(request, attribution).await?;

        // Fire-and-forget: recording never extends the message's latency
        // and never surfaces a failure.
        let usage = Arc::clone(&self.usage);
        let attribution = attribution.clone();
        let record = UsageRecord {
            user_id: attribution.user_id,
            bot_id: attribution.bot_id,
            session_id: attribution.session_id,
            message_id: attribution.message_id,
            provider: if response.provider.is_empty() {
                provider_for_model(&response.model).to_string()
            } else {
                response.provider.clone()
            },
            model: response.model.clone(),
            task_type,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            cost_usd: calculate_cost(
                response.prompt_tokens,
                response.completion_tokens,
                &model_price(&response.model),
            ),
            latency_ms: response.latency_ms,
            created_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = usage.record(record).await {
                warn!("[tracked-gateway] usage recording failed: {}", e);
            } else {
                info!("[tracked-gateway] usage recorded");
            }
        });

        Ok(response)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
