// Kilo Engine — HTTP interface contract.
// The envelopes and projections the host's route layer exposes. No
// server lives here — routing, auth middleware, and body parsing belong
// to the host application — but everything observable on the wire
// (field names, redaction, error envelope, status mapping) is pinned by
// these types so every host agrees.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::atoms::error::EngineError;
use crate::atoms::types::{AgentReply, Attachment, AuthKind, Soul, ToolRegistryEntry};
use crate::engine::usage::BreakdownGroup;

/// CLI exit codes: normal shutdown and startup failure.
pub const EXIT_OK: i32 = 0;
pub const EXIT_STARTUP_FAILURE: i32 = 1;

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub bot_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ChatRequest {
    /// Assign a fresh session id when the client did not send one.
    pub fn resolve_session_id(&self) -> Uuid {
        self.session_id.unwrap_or_else(Uuid::new_v4)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: Uuid,
    pub response: AgentReply,
}

// ── Bots & skills ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBotRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub soul: Option<Soul>,
}

/// Draft skill payload shared by create, update, and the validate-only
/// endpoint (which runs validation without persisting).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDraftRequest {
    pub name: String,
    pub description: String,
    pub trigger_patterns: Vec<String>,
    pub behavior_prompt: String,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub required_integrations: Vec<String>,
}

// ── Tool registry (redacted projection) ─────────────────────────────────

/// What GET/POST/PATCH tool responses expose. The encrypted auth blob
/// never crosses the API boundary — only whether one exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEntryView {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    pub auth_kind: AuthKind,
    pub has_credentials: bool,
    pub endpoint_count: usize,
    pub active: bool,
}

impl From<&ToolRegistryEntry> for ToolEntryView {
    fn from(entry: &ToolRegistryEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
            base_url: entry.base_url.clone(),
            auth_kind: entry.auth_kind,
            has_credentials: entry.auth_blob.is_some(),
            endpoint_count: entry.endpoints.len(),
            active: entry.active,
        }
    }
}

// ── Usage ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummaryQuery {
    pub user_id: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBreakdownQuery {
    pub user_id: String,
    pub group_by: BreakdownGroup,
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Map an engine error to its HTTP status and wire envelope. Internal
/// variants are flattened to a generic message — detail stays in logs.
pub fn error_response(error: &EngineError) -> (u16, ErrorEnvelope) {
    let status = error.http_status();
    let message = if status == 500 {
        log::error!("[api] internal error: {}", error);
        "Internal error".to_string()
    } else {
        error.to_string()
    };
    (
        status,
        ErrorEnvelope {
            error: ErrorBody {
                code: error.code().to_uppercase(),
                message,
            },
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub fn health() -> HealthResponse {
    HealthResponse { status: "ok" }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::ToolEndpoint;

    #[test]
    fn chat_request_assigns_session() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"botId":"6b9f6d35-7d5e-4b6e-9a64-2b8f31c5d8a1","userId":"u1","content":"hi"}"#,
        )
        .unwrap();
        assert!(request.session_id.is_none());
        let a = request.resolve_session_id();
        let b = request.resolve_session_id();
        assert_ne!(a, b);

        let with_session: ChatRequest = serde_json::from_str(
            r#"{"botId":"6b9f6d35-7d5e-4b6e-9a64-2b8f31c5d8a1","userId":"u1",
                "sessionId":"0d4a5c33-93e2-4b8e-8e47-0d0a3b8f2f10","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(
            with_session.resolve_session_id().to_string(),
            "0d4a5c33-93e2-4b8e-8e47-0d0a3b8f2f10"
        );
    }

    #[test]
    fn tool_view_redacts_auth_blob() {
        let entry = ToolRegistryEntry {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            name: "stripe".into(),
            base_url: "https://api.stripe.com".into(),
            auth_kind: AuthKind::Bearer,
            auth_blob: Some(crate::atoms::types::EncryptedBlob {
                iv: "00".repeat(12),
                auth_tag: "11".repeat(16),
                ciphertext: "deadbeef".into(),
            }),
            endpoints: vec![ToolEndpoint {
                path: "/v1/charges".into(),
                method: "GET".into(),
                description: "List charges".into(),
                parameters: serde_json::json!({}),
                response_schema: None,
            }],
            active: true,
            auth_instructions: None,
        };
        let view = ToolEntryView::from(&entry);
        let wire = serde_json::to_string(&view).unwrap();
        assert!(!wire.contains("deadbeef"));
        assert!(!wire.contains("ciphertext"));
        assert!(wire.contains("\"hasCredentials\":true"));
        assert!(wire.contains("\"endpointCount\":1"));
    }

    #[test]
    fn error_envelope_shape() {
        let (status, envelope) = error_response(&EngineError::BotNotFound("b-1".into()));
        assert_eq!(status, 404);
        assert_eq!(envelope.error.code, "BOT_NOT_FOUND");
        assert!(envelope.error.message.contains("b-1"));
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let (status, envelope) =
            error_response(&EngineError::Database("password=hunter2 refused".into()));
        assert_eq!(status, 500);
        assert_eq!(envelope.error.message, "Internal error");
        assert!(!envelope.error.message.contains("hunter2"));
    }

    #[test]
    fn exit_codes() {
        assert_eq!(EXIT_OK, 0);
        assert_eq!(EXIT_STARTUP_FAILURE, 1);
    }
}
