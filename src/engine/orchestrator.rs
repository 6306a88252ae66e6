// Kilo Engine — Orchestrator
// Drives one message through the pipeline and emits deferred side
// effects. Contains no business logic beyond sequencing: clarification
// follow-up, learning detection, matching (built-ins short-circuit the
// LLM), selective context loading, prompt composition, the gateway call,
// tool-call interpretation, post-processing, and memory extraction.
//
// Side effects are collected, never executed — the caller owns durable
// writes. A failed side-effect consumer is never this module's problem;
// a failed gateway call is surfaced as-is.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::atoms::constants::{DATA_PREVIEW_ROWS, DISMISSAL_WINDOW_DAYS};
use crate::atoms::error::EngineResult;
use crate::atoms::traits::{ChatGateway, DataLoader};
use crate::atoms::types::*;
use crate::engine::builtins::BuiltinRegistry;
use crate::engine::learning::{
    clarification_response, detect_learning_intent, extract_clarification_capability,
    interpret_clarification_reply, ClarificationReply,
};
use crate::engine::matcher::match_skills;
use crate::engine::memory::extract_facts;
use crate::engine::postprocess::post_process;
use crate::engine::prompts::{
    compose_general_prompt, compose_skill_prompt, GeneralPromptInputs, SkillPromptInputs,
};
use crate::engine::proposer::propose;
use crate::engine::research::ResearchFlow;
use crate::engine::sql_guard::SqlSandbox;
use crate::engine::tool_http::{auth_header, HttpToolExecutor, OutboundRequest};
use crate::engine::vault::CredentialVault;

pub struct Orchestrator {
    loader: Arc<dyn DataLoader>,
    gateway: Arc<dyn ChatGateway>,
    builtins: BuiltinRegistry,
    research: Arc<ResearchFlow>,
    sandbox: Arc<SqlSandbox>,
    vault: Arc<CredentialVault>,
    http: Arc<HttpToolExecutor>,
}

impl Orchestrator {
    pub fn new(
        loader: Arc<dyn DataLoader>,
        gateway: Arc<dyn ChatGateway>,
        research: Arc<ResearchFlow>,
        sandbox: Arc<SqlSandbox>,
        vault: Arc<CredentialVault>,
    ) -> Self {
        Self {
            loader,
            gateway,
            builtins: BuiltinRegistry::new(),
            research,
            sandbox,
            vault,
            http: Arc::new(HttpToolExecutor::new()),
        }
    }

    /// Process one user message for a bot session.
    pub async fn process(
        &self,
        message: &str,
        bot_id: Uuid,
        session_id: Uuid,
        user_id: &str,
    ) -> EngineResult<ProcessOutcome> {
        self.process_at(message, bot_id, session_id, user_id, Utc::now()).await
    }

    /// `process` with an explicit clock, for deterministic tests and
    /// scheduled invocations.
    pub async fn process_at(
        &self,
        message: &str,
        bot_id: Uuid,
        session_id: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ProcessOutcome> {
        let attribution = Attribution {
            user_id: user_id.to_string(),
            bot_id: Some(bot_id),
            session_id: Some(session_id),
            message_id: None,
        };

        // Bot config and active skills load concurrently (cache-first in
        // the loader).
        let (bot, skills) = tokio::try_join!(
            self.loader.bot_config(bot_id),
            self.loader.active_skills(bot_id),
        )?;

        let mut effects: Vec<SideEffect> = Vec::new();

        // Clarification follow-up from the previous assistant turn.
        if let Some(last) = self.loader.last_assistant_message(session_id).await? {
            if let Some(capability) = extract_clarification_capability(&last.content) {
                match interpret_clarification_reply(&capability, message) {
                    ClarificationReply::Proceed { search_query } => {
                        let reply = self
                            .run_learning(&capability, &search_query, &attribution, &mut effects)
                            .await?;
                        self.extract_memory(message, &mut effects);
                        self.emit_analytics("learning", &mut effects);
                        return Ok(ProcessOutcome { reply, side_effects: effects });
                    }
                    ClarificationReply::Aborted => {
                        info!("[orchestrator] clarification declined, continuing normally");
                    }
                }
            }
        }

        // Learning intent on the raw text.
        if let Some(intent) = detect_learning_intent(message) {
            if intent.confidence >= 0.7 {
                let query = format!("{} API", intent.capability);
                let reply = self
                    .run_learning(&intent.capability, &query, &attribution, &mut effects)
                    .await?;
                self.extract_memory(message, &mut effects);
                self.emit_analytics("learning", &mut effects);
                return Ok(ProcessOutcome { reply, side_effects: effects });
            }
            if intent.confidence >= 0.5 {
                let reply = AgentReply::text(clarification_response(&intent.capability));
                self.extract_memory(message, &mut effects);
                self.emit_analytics("clarification", &mut effects);
                return Ok(ProcessOutcome { reply, side_effects: effects });
            }
        }

        // Match against the union of built-ins and the bot's skills.
        let mut pool = self.builtins.definitions();
        pool.extend(skills.iter().cloned());

        let reply = match match_skills(message, &pool) {
            Some(matched) if matched.skill.is_builtin() => {
                // Built-in handler answers directly; the LLM never runs.
                match self.builtins.handle(&matched.skill.id, message, now) {
                    Some(handled) => {
                        self.emit_analytics("builtin", &mut effects);
                        AgentReply {
                            content: handled.content,
                            skill_id: Some(handled.skill_id),
                            structured_card: None,
                            suggested_actions: handled.suggested_actions,
                            thinking_summary: None,
                        }
                    }
                    None => {
                        warn!("[orchestrator] builtin '{}' has no handler", matched.skill.id);
                        self.emit_analytics("general", &mut effects);
                        self.run_general(message, &bot, &skills, session_id, &attribution)
                            .await?
                    }
                }
            }
            Some(matched) => {
                self.emit_analytics("skill", &mut effects);
                self.run_skill(message, &bot, matched, session_id, &attribution, &mut effects)
                    .await?
            }
            None => {
                // No skill matched: proposer first, general chat second.
                let dismissals = self
                    .loader
                    .recent_dismissals(bot_id, DISMISSAL_WINDOW_DAYS)
                    .await
                    .unwrap_or_default();
                match propose(message, &dismissals, now) {
                    Some(outline) => {
                        self.emit_analytics("proposal", &mut effects);
                        let reply = AgentReply::text(format_proposal(&outline));
                        effects.push(SideEffect::SkillProposal { proposal: outline });
                        reply
                    }
                    None => {
                        self.emit_analytics("general", &mut effects);
                        self.run_general(message, &bot, &skills, session_id, &attribution)
                            .await?
                    }
                }
            }
        };

        self.extract_memory(message, &mut effects);
        Ok(ProcessOutcome { reply, side_effects: effects })
    }

    // ── Learning path ───────────────────────────────────────────────────

    async fn run_learning(
        &self,
        capability: &str,
        query: &str,
        attribution: &Attribution,
        effects: &mut Vec<SideEffect>,
    ) -> EngineResult<AgentReply> {
        info!("[orchestrator] learning flow for '{}' (query: {})", capability, query);
        let outcome = self.research.run(capability, query, attribution).await?;
        effects.push(SideEffect::LearningProposal {
            service: outcome.service.clone(),
            endpoint_count: outcome.api_info.endpoints.len(),
            skill_count: outcome.skills.len(),
        });
        Ok(AgentReply::text(outcome.summary()))
    }

    // ── Skill path ──────────────────────────────────────────────────────

    async fn run_skill(
        &self,
        message: &str,
        bot: &Bot,
        matched: SkillMatch,
        session_id: Uuid,
        attribution: &Attribution,
        effects: &mut Vec<SideEffect>,
    ) -> EngineResult<AgentReply> {
        let skill = &matched.skill;
        let ctx = &matched.context;

        let tools = if skill.required_integrations.is_empty() {
            Vec::new()
        } else {
            self.loader
                .tools_for(skill.bot_id, &skill.required_integrations)
                .await?
        };

        // Selective context loading: one parallel fan-out over exactly
        // what the match requires.
        let (history, memory, rag, preview, schemas) = tokio::join!(
            async {
                if ctx.needs_conversation_history && ctx.history_depth > 0 {
                    self.loader
                        .conversation_history(session_id, ctx.history_depth)
                        .await
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
            async {
                if ctx.needs_memory {
                    self.loader.memory_facts(skill.bot_id, 20).await.unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
            async {
                if ctx.needs_rag {
                    self.loader
                        .rag_chunks(skill.bot_id, message, 5)
                        .await
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
            async {
                match (&skill.data_table, ctx.needs_skill_data) {
                    (Some(table), true) => self
                        .loader
                        .skill_data_preview(&bot.schema_name, table, DATA_PREVIEW_ROWS)
                        .await
                        .ok(),
                    _ => None,
                }
            },
            async {
                if ctx.needs_skill_data && !skill.readable_tables.is_empty() {
                    self.loader
                        .table_schemas(&bot.schema_name, &skill.readable_tables)
                        .await
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
        );

        let composed = compose_skill_prompt(&SkillPromptInputs {
            bot,
            skill,
            table_schemas: &schemas,
            data_preview: preview.as_ref(),
            memory: &memory,
            rag_chunks: &rag,
            tools: &tools,
            history: &history,
            user_message: message,
        });

        let mut messages = composed.messages;
        let request = LlmRequest {
            task_type: matched.task_type,
            system: composed.system.clone(),
            messages: messages.clone(),
            tools: composed.tools.clone(),
            max_tokens: None,
            temperature: None,
        };
        let mut response = self.gateway.complete(request, attribution).await?;

        // Interpret tool calls. Reads (API, SQL) feed their result back
        // for one more turn; writes and schedules only emit effects.
        let mut needs_second_turn = false;
        for call in response.tool_calls.clone() {
            match call.name.as_str() {
                "call_api" => {
                    let observation = self.execute_api_call(&call, &tools, effects).await;
                    messages.push(ChatMessage::assistant(observation));
                    needs_second_turn = true;
                }
                "query_skill_data" => {
                    let observation = self.execute_query(&call, skill, bot).await;
                    messages.push(ChatMessage::assistant(observation));
                    needs_second_turn = true;
                }
                _ => interpret_write_call(&call, skill, effects),
            }
        }

        if needs_second_turn {
            let request = LlmRequest {
                task_type: matched.task_type,
                system: composed.system,
                messages,
                tools: composed.tools,
                max_tokens: None,
                temperature: None,
            };
            response = self.gateway.complete(request, attribution).await?;
            // Writes proposed after seeing the data still become effects;
            // further reads are not executed this message.
            for call in &response.tool_calls {
                interpret_write_call(call, skill, effects);
            }
        }

        let processed = post_process(&response.content, Some(skill));
        Ok(AgentReply {
            content: processed.content,
            skill_id: Some(skill.id.clone()),
            structured_card: processed.structured_card,
            suggested_actions: processed.suggested_actions,
            thinking_summary: response.thinking_summary,
        })
    }

    /// Execute a declared-endpoint API call. Failures become a
    /// status-0 side effect plus a null observation — the model still
    /// gets a final turn to explain.
    async fn execute_api_call(
        &self,
        call: &LlmToolCall,
        tools: &[ToolRegistryEntry],
        effects: &mut Vec<SideEffect>,
    ) -> String {
        let tool_name = call.arguments["tool"].as_str().unwrap_or_default().to_string();
        let endpoint_path = call.arguments["endpoint"].as_str().unwrap_or_default().to_string();
        let method = call.arguments["method"].as_str().unwrap_or("GET").to_string();

        let outcome = async {
            let entry = tools
                .iter()
                .find(|t| t.name == tool_name && t.active)
                .ok_or_else(|| crate::EngineError::ToolNotFound(tool_name.clone()))?;
            let endpoint = entry.find_endpoint(&endpoint_path, &method).ok_or_else(|| {
                crate::EngineError::tool(
                    &tool_name,
                    format!("endpoint {} {} is not declared", method, endpoint_path),
                )
            })?;

            let mut headers = Vec::new();
            if let Some(blob) = &entry.auth_blob {
                let secret = self.vault.decrypt(blob)?;
                headers.push(auth_header(entry.auth_kind, &secret));
            }

            self.http
                .execute(OutboundRequest {
                    tool_name: tool_name.clone(),
                    url: format!("{}{}", entry.base_url, endpoint.path),
                    method: endpoint.method.clone(),
                    headers,
                    body: call.arguments.get("body").cloned(),
                    timeout: None,
                })
                .await
        }
        .await;

        match outcome {
            Ok(resp) => {
                effects.push(SideEffect::ApiCall {
                    tool_name,
                    endpoint: endpoint_path.clone(),
                    status: resp.status,
                    latency_ms: resp.latency_ms,
                });
                let mut body = resp.body.to_string();
                if body.chars().count() > 4000 {
                    body = body.chars().take(4000).collect();
                }
                format!(
                    "[api result] {} → HTTP {}{}: {}",
                    endpoint_path,
                    resp.status,
                    if resp.truncated { " (truncated)" } else { "" },
                    body
                )
            }
            Err(e) => {
                warn!("[orchestrator] api call failed: {}", e);
                effects.push(SideEffect::ApiCall {
                    tool_name,
                    endpoint: endpoint_path.clone(),
                    status: 0,
                    latency_ms: 0,
                });
                format!("[api result] {} → null (call failed)", endpoint_path)
            }
        }
    }

    async fn execute_query(&self, call: &LlmToolCall, skill: &SkillDefinition, bot: &Bot) -> String {
        let sql = call.arguments["sql"].as_str().unwrap_or_default();
        match self
            .sandbox
            .query(sql, &skill.readable_tables, &bot.schema_name)
            .await
        {
            Ok(result) => format!(
                "[query result] {} rows{}: {}",
                result.rows.len(),
                if result.truncated { " (truncated)" } else { "" },
                serde_json::to_string(&result.rows).unwrap_or_default()
            ),
            Err(e) => format!("[query result] rejected: {}", e),
        }
    }

    // ── General path ────────────────────────────────────────────────────

    async fn run_general(
        &self,
        message: &str,
        bot: &Bot,
        skills: &[SkillDefinition],
        session_id: Uuid,
        attribution: &Attribution,
    ) -> EngineResult<AgentReply> {
        let (history, memory) = tokio::join!(
            async {
                self.loader
                    .conversation_history(session_id, 5)
                    .await
                    .unwrap_or_default()
            },
            async { self.loader.memory_facts(bot.id, 20).await.unwrap_or_default() },
        );

        let composed = compose_general_prompt(&GeneralPromptInputs {
            bot,
            skills,
            memory: &memory,
            history: &history,
            user_message: message,
        });
        let response = self
            .gateway
            .complete(
                LlmRequest {
                    task_type: TaskType::SimpleQa,
                    system: composed.system,
                    messages: composed.messages,
                    tools: composed.tools,
                    max_tokens: None,
                    temperature: None,
                },
                attribution,
            )
            .await?;

        let processed = post_process(&response.content, None);
        Ok(AgentReply {
            content: processed.content,
            skill_id: None,
            structured_card: None,
            suggested_actions: processed.suggested_actions,
            thinking_summary: response.thinking_summary,
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn extract_memory(&self, message: &str, effects: &mut Vec<SideEffect>) {
        let facts = extract_facts(message);
        if !facts.is_empty() {
            effects.push(SideEffect::MemoryWrite { facts });
        }
    }

    fn emit_analytics(&self, route: &str, effects: &mut Vec<SideEffect>) {
        effects.push(SideEffect::AnalyticsEvent {
            name: "message_processed".into(),
            properties: json!({ "route": route }),
        });
    }
}

/// Writes and schedules are emitted, never executed inline.
fn interpret_write_call(call: &LlmToolCall, skill: &SkillDefinition, effects: &mut Vec<SideEffect>) {
    match call.name.as_str() {
        "insert_skill_data" => {
            if let Some(table) = &skill.data_table {
                effects.push(SideEffect::SkillDataWrite {
                    table: table.clone(),
                    op: DataOp::Insert,
                    data: call.arguments["data"].clone(),
                });
            }
        }
        "update_skill_data" => {
            if let Some(table) = &skill.data_table {
                effects.push(SideEffect::SkillDataWrite {
                    table: table.clone(),
                    op: DataOp::Update,
                    data: json!({
                        "id": call.arguments["id"],
                        "set": call.arguments["data"],
                    }),
                });
            }
        }
        "schedule_notification" => {
            effects.push(SideEffect::ScheduleNotification {
                message: call.arguments["message"].as_str().unwrap_or_default().to_string(),
                at: call.arguments["at"].as_str().unwrap_or_default().to_string(),
                recurring: call.arguments["recurring"].as_str().map(str::to_string),
            });
        }
        _ => {}
    }
}

fn format_proposal(outline: &ProposedSkillOutline) -> String {
    let mut out = format!(
        "It sounds like this comes up regularly. Want me to set up **{}**?\n{}\n",
        outline.name, outline.description
    );
    if let Some(schedule) = &outline.schedule {
        out.push_str(&format!("It would run on the schedule `{}`.\n", schedule));
    }
    if !outline.fields.is_empty() {
        let fields: Vec<&str> = outline.fields.iter().map(|f| f.name.as_str()).collect();
        out.push_str(&format!("I'd store: {}.\n", fields.join(", ")));
    }
    out.push_str("Just say yes and I'll create it.");
    out
}
