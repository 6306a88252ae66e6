// ── Kilo Atoms: Error Types ─────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Every variant carries a stable machine code (`code()`) and maps to
//     an HTTP status (`http_status()`); the API layer renders both.
//   • No variant carries secret material (API keys, credential plaintext)
//     in its message.
//   • Cache and usage-tracking failures are swallowed at their call
//     sites; everything else propagates to the request handler.

use thiserror::Error;

// ── Primary error enum ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Durable-store failure surfaced through a repository port.
    #[error("Database error: {0}")]
    Database(String),

    /// Creating or altering a bot's namespaced schema failed.
    #[error("Schema creation error: {0}")]
    SchemaCreation(String),

    /// Skill validation failure, annotated with the failing stage and
    /// per-field issues.
    #[error("Skill validation failed at stage {stage}: {issue_count} issue(s)")]
    SkillValidation { stage: String, issue_count: usize },

    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    /// The bot's tier cap (5/25/∞) is exhausted.
    #[error("Skill limit exceeded: {limit} skills allowed on this tier")]
    SkillLimitExceeded { limit: usize },

    /// Provider-level LLM failure (non-secret detail only).
    #[error("LLM error: {provider}/{model}: {message}")]
    Llm {
        provider: String,
        model: String,
        message: String,
    },

    #[error("LLM request timed out after {seconds}s")]
    LlmTimeout { seconds: u64 },

    /// Primary and fallback both failed or were unavailable.
    #[error("All LLM providers failed for task '{task}'")]
    AllProvidersFailed { task: String },

    #[error("Bot not found: {0}")]
    BotNotFound(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Usage tracking error: {0}")]
    UsageTracking(String),

    #[error("Cache error: {0}")]
    Cache(String),

    /// Vault failure: bad master key, malformed blob, or tag mismatch.
    /// Deliberately coarse — decrypt failures must not reveal which part
    /// of the blob was wrong.
    #[error("Credential error: {0}")]
    Credential(String),

    /// External tool (HTTP API) execution failure.
    #[error("Tool error: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Web research failure, annotated with the failing stage
    /// (search | fetch | analyze | propose).
    #[error("Web research failed at stage {stage}: {message}")]
    WebResearch { stage: String, message: String },

    /// Rejected by the sandboxed SQL validator.
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

// ── Machine codes & HTTP mapping ────────────────────────────────────────

impl EngineError {
    /// Stable machine code rendered in the API error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::SchemaCreation(_) => "schema_creation",
            Self::SkillValidation { .. } => "skill_validation",
            Self::SkillNotFound(_) => "skill_not_found",
            Self::SkillLimitExceeded { .. } => "skill_limit_exceeded",
            Self::Llm { .. } => "llm",
            Self::LlmTimeout { .. } => "llm_timeout",
            Self::AllProvidersFailed { .. } => "llm_all_providers_failed",
            Self::BotNotFound(_) => "bot_not_found",
            Self::AuthRequired => "auth_required",
            Self::NotAuthorized(_) => "not_authorized",
            Self::UsageTracking(_) => "usage_tracking",
            Self::Cache(_) => "cache",
            Self::Credential(_) => "credential",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::WebResearch { .. } => "web_research",
            Self::QueryRejected(_) => "query_rejected",
            Self::Config(_) => "config",
            Self::Serialization(_) | Self::Network(_) => "internal",
        }
    }

    /// HTTP status the API layer responds with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::SkillValidation { .. } | Self::QueryRejected(_) => 400,
            Self::AuthRequired => 401,
            Self::NotAuthorized(_) => 403,
            Self::BotNotFound(_) | Self::SkillNotFound(_) | Self::ToolNotFound(_) => 404,
            Self::SkillLimitExceeded { .. } => 409,
            Self::LlmTimeout { .. } => 504,
            Self::Llm { .. } | Self::AllProvidersFailed { .. } | Self::WebResearch { .. } => 502,
            _ => 500,
        }
    }

    /// Convenience constructor for tool failures.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for provider failures.
    pub fn llm(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Llm {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for research-stage failures.
    pub fn research(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WebResearch {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

// ── Convenience alias ───────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::Cache("x".into()).code(), "cache");
        assert_eq!(EngineError::Credential("x".into()).code(), "credential");
        assert_eq!(
            EngineError::AllProvidersFailed { task: "simple_qa".into() }.code(),
            "llm_all_providers_failed"
        );
        assert_eq!(
            EngineError::research("fetch", "boom").code(),
            "web_research"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(EngineError::BotNotFound("b".into()).http_status(), 404);
        assert_eq!(EngineError::AuthRequired.http_status(), 401);
        assert_eq!(
            EngineError::SkillValidation { stage: "schema".into(), issue_count: 1 }.http_status(),
            400
        );
        assert_eq!(
            EngineError::SkillLimitExceeded { limit: 5 }.http_status(),
            409
        );
        assert_eq!(EngineError::LlmTimeout { seconds: 30 }.http_status(), 504);
        assert_eq!(EngineError::Database("d".into()).http_status(), 500);
    }

    #[test]
    fn messages_never_include_secret_fields() {
        // Credential errors stay coarse: the message is caller-supplied
        // context, not blob contents.
        let e = EngineError::Credential("decryption failed".into());
        assert_eq!(e.to_string(), "Credential error: decryption failed");
    }
}
