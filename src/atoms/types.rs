// ── Kilo Atoms: Pure Data Types ─────────────────────────────────────────
// All plain struct/enum definitions with no logic beyond small accessors.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::atoms::constants::BUILTIN_SKILL_PREFIX;

// ── Bot ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    /// Free-text personality; superseded by `soul` when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soul: Option<Soul>,
    /// Dedicated namespaced schema: `bot_<first8hex>` of the bot id.
    pub schema_name: String,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// Derive the namespaced schema name from a bot id.
    pub fn schema_name_for(id: &Uuid) -> String {
        let hex = id.simple().to_string();
        format!("bot_{}", &hex[..8])
    }
}

/// Five-layer structured personality. Empty layers are omitted when the
/// prompt composer renders the Soul.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Soul {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub style: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub decision_framework: Vec<String>,
}

impl Soul {
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
            && self.values.is_empty()
            && self.style.is_empty()
            && self.rules.is_empty()
            && self.decision_framework.is_empty()
    }
}

// ── Skills ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Text,
    StructuredCard,
    Notification,
    Action,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillProvenance {
    System,
    UserConversation,
    AutoProposed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// UUID string for persisted skills; `builtin-*` for built-ins.
    pub id: String,
    pub bot_id: Uuid,
    pub name: String,
    pub description: String,
    /// ≥2 patterns, pairwise non-identical after normalization.
    pub trigger_patterns: Vec<String>,
    pub behavior_prompt: String,
    /// JSON-Schema describing the skill's data row shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// 5-field cron expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Table owned by this skill inside the bot's schema. When set, the
    /// table physically exists (createSkillTable ran in the same flow).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_table: Option<String>,
    /// Tables this skill may read (its own plus any shared with it).
    #[serde(default)]
    pub readable_tables: Vec<String>,
    /// DDL snapshot produced when the data table was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_ddl: Option<String>,
    /// Names of tool-registry entries this skill calls.
    #[serde(default)]
    pub required_integrations: Vec<String>,
    pub created_by: SkillProvenance,
    /// Monotonically increasing on every update.
    pub version: u32,
    pub performance_score: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SkillDefinition {
    pub fn is_builtin(&self) -> bool {
        self.id.starts_with(BUILTIN_SKILL_PREFIX)
    }
}

// ── Tool registry ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    ApiKey,
    Bearer,
    Oauth2,
    CustomHeader,
}

impl Default for AuthKind {
    fn default() -> Self {
        Self::Bearer
    }
}

/// Wire format for stored credentials: all lowercase hex. IV is 24 hex
/// chars (12 bytes), tag is 32 hex chars (16 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub iv: String,
    #[serde(rename = "authTag")]
    pub auth_tag: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEndpoint {
    pub path: String,
    /// Uppercase HTTP method.
    pub method: String,
    pub description: String,
    /// JSON-Schema for the endpoint's parameters.
    #[serde(default)]
    pub parameters: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

/// Per-bot external API binding. The encrypted auth blob never leaves the
/// runtime — API-layer projections strip it (see `api::ToolEntryView`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryEntry {
    pub id: Uuid,
    pub bot_id: Uuid,
    /// Unique per bot.
    pub name: String,
    pub base_url: String,
    pub auth_kind: AuthKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_blob: Option<EncryptedBlob>,
    pub endpoints: Vec<ToolEndpoint>,
    pub active: bool,
    /// Free-text auth setup notes captured during learning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_instructions: Option<String>,
}

impl ToolRegistryEntry {
    /// Find a declared endpoint by exact `(path, method)` — the only
    /// lookup the orchestrator is allowed to use for `call_api`.
    pub fn find_endpoint(&self, path: &str, method: &str) -> Option<&ToolEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.path == path && e.method.eq_ignore_ascii_case(method))
    }
}

// ── Messages ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded content (no data: prefix).
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub bot_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Weak reference to the responding skill; cleared on skill deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// The `skill_id` value safe to persist as a foreign key. Built-in
    /// ids (`builtin-*`) are not UUIDs, so they persist as NULL; the API
    /// response still carries the builtin id.
    pub fn persistable_skill_id(&self) -> Option<&str> {
        self.skill_id
            .as_deref()
            .filter(|id| !id.starts_with(BUILTIN_SKILL_PREFIX))
    }
}

// ── Memory ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    UserStated,
    Inferred,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFact {
    pub key: String,
    pub value: String,
    pub source: FactSource,
    /// In [0, 1].
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

// ── LLM task routing ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    SimpleQa,
    SkillExecution,
    SkillGeneration,
    ComplexReasoning,
    DataAnalysis,
    DocExtraction,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleQa => "simple_qa",
            Self::SkillExecution => "skill_execution",
            Self::SkillGeneration => "skill_generation",
            Self::ComplexReasoning => "complex_reasoning",
            Self::DataAnalysis => "data_analysis",
            Self::DocExtraction => "doc_extraction",
        }
    }
}

/// Extended-thinking configuration. Mutually exclusive with temperature
/// on the primary request; stripped entirely on fallback requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Off,
    Extended { budget_tokens: u32 },
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self::Off
    }
}

impl ThinkingConfig {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Extended { .. })
    }
}

// ── LLM wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A tool offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema for the tool's arguments.
    pub parameters: Value,
}

/// A tool invocation returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmToolCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub task_type: TaskType,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    /// None → route-level max tokens apply.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<LlmToolCall>,
    /// The model that actually responded.
    pub model: String,
    pub provider: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64,
    /// Opaque display text, ≤500 chars; never fed back into prompts.
    pub thinking_summary: Option<String>,
}

/// Per-call cost attribution. Passed alongside each `complete` call —
/// never stored in a shared field — so concurrent in-flight requests
/// cannot see each other's contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attribution {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
}

// ── Usage ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub task_type: TaskType,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Computed at insert; immutable thereafter.
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    /// USD per million input tokens.
    pub input_cost_per_m: f64,
    /// USD per million output tokens.
    pub output_cost_per_m: f64,
}

// ── Side effects ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOp {
    Insert,
    Update,
    Delete,
}

/// Work the caller must perform asynchronously after the message returns.
/// Emitted, never executed, by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    MemoryWrite {
        facts: Vec<MemoryFact>,
    },
    SkillDataWrite {
        table: String,
        op: DataOp,
        data: Value,
    },
    ScheduleNotification {
        message: String,
        at: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        recurring: Option<String>,
    },
    SkillProposal {
        proposal: ProposedSkillOutline,
    },
    AnalyticsEvent {
        name: String,
        properties: Value,
    },
    ApiCall {
        tool_name: String,
        endpoint: String,
        /// 0 when the request never produced a response.
        status: u16,
        latency_ms: u64,
    },
    LearningProposal {
        service: String,
        endpoint_count: usize,
        skill_count: usize,
    },
}

// ── Skill proposals ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedField {
    pub name: String,
    pub required: bool,
}

/// Structured proposal produced by the Skill Proposer from repeatability
/// signals in an unmatched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedSkillOutline {
    pub name: String,
    pub description: String,
    pub trigger_patterns: Vec<String>,
    #[serde(default)]
    pub fields: Vec<ProposedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub confidence: f64,
}

/// A user's past "no thanks" to a proposal, used for suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalDismissal {
    pub proposal_name: String,
    pub dismissed_at: DateTime<Utc>,
}

// ── Matching ────────────────────────────────────────────────────────────

/// What the matched skill declares it needs loaded before prompting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextRequirements {
    pub needs_conversation_history: bool,
    pub history_depth: u32,
    pub needs_memory: bool,
    pub needs_rag: bool,
    pub needs_skill_data: bool,
}

#[derive(Debug, Clone)]
pub struct SkillMatch {
    pub skill: SkillDefinition,
    pub score: f64,
    /// True when the fast score cleared the definitive threshold.
    pub definitive: bool,
    pub context: ContextRequirements,
    pub task_type: TaskType,
}

// ── Context-load results ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablePreview {
    pub rows: Vec<Value>,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
}

// ── Pipeline outcome ────────────────────────────────────────────────────

/// The post-processed, user-facing reply for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    /// Responding skill id, including `builtin-*` ids (those persist as
    /// NULL on the message row but surface here).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    /// Parsed ```json fence for `structured_card` skills; None when the
    /// fence is missing or malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_card: Option<Value>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_summary: Option<String>,
}

impl AgentReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            skill_id: None,
            structured_card: None,
            suggested_actions: Vec::new(),
            thinking_summary: None,
        }
    }
}

/// What `Orchestrator::process` returns: the reply plus every deferred
/// side effect emitted along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub reply: AgentReply,
    pub side_effects: Vec<SideEffect>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_name_uses_first_eight_hex() {
        let id = Uuid::parse_str("a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d").unwrap();
        assert_eq!(Bot::schema_name_for(&id), "bot_a1b2c3d4");
    }

    #[test]
    fn builtin_skill_ids_are_not_persistable() {
        let msg = StoredMessage {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            role: Role::Assistant,
            content: "It's **9:00 AM**".into(),
            attachments: vec![],
            skill_id: Some("builtin-time".into()),
            created_at: Utc::now(),
        };
        assert_eq!(msg.persistable_skill_id(), None);

        let mut user_skill = msg.clone();
        user_skill.skill_id = Some("4f9e2d52-0000-4000-8000-000000000000".into());
        assert!(user_skill.persistable_skill_id().is_some());
    }

    #[test]
    fn side_effect_serializes_tagged() {
        let eff = SideEffect::ApiCall {
            tool_name: "stripe".into(),
            endpoint: "/v1/charges".into(),
            status: 200,
            latency_ms: 412,
        };
        let v = serde_json::to_value(&eff).unwrap();
        assert_eq!(v["kind"], "api_call");
        assert_eq!(v["status"], 200);
    }

    #[test]
    fn thinking_config_tagged_roundtrip() {
        let t = ThinkingConfig::Extended { budget_tokens: 4096 };
        let v = serde_json::to_value(t).unwrap();
        assert_eq!(v["mode"], "extended");
        let back: ThinkingConfig = serde_json::from_value(v).unwrap();
        assert!(back.is_enabled());
    }

    #[test]
    fn encrypted_blob_wire_field_names() {
        let blob = EncryptedBlob {
            iv: "00".repeat(12),
            auth_tag: "11".repeat(16),
            ciphertext: "ab".into(),
        };
        let v = serde_json::to_value(&blob).unwrap();
        assert!(v.get("authTag").is_some());
        assert!(v.get("auth_tag").is_none());
    }
}
