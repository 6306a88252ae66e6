// ── Kilo Atoms: Port Traits ─────────────────────────────────────────────
// The narrow abstractions the pipeline depends on. The orchestrator sees
// exactly two: a chat gateway (one method) and a data loader (the seven
// selective-load fetchers plus tools and the proposer/clarification
// lookups). The rest are infrastructure ports the engine components wrap
// with their own policy (timeouts, validation, write-through).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::atoms::error::EngineResult;
use crate::atoms::types::*;

// ── Chat gateway port ───────────────────────────────────────────────────

/// The one-method LLM port the orchestrator calls. `TrackedGateway`
/// decorates it with usage recording; tests substitute scripted fakes.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(
        &self,
        request: LlmRequest,
        attribution: &Attribution,
    ) -> EngineResult<LlmResponse>;
}

// ── Data loader port ────────────────────────────────────────────────────

/// Read-side repository contract for everything the pipeline loads.
/// Implementations are expected to be cache-first where the cache service
/// applies (bot config, active skills, table schemas).
#[async_trait]
pub trait DataLoader: Send + Sync {
    async fn bot_config(&self, bot_id: Uuid) -> EngineResult<Bot>;

    async fn active_skills(&self, bot_id: Uuid) -> EngineResult<Vec<SkillDefinition>>;

    /// Most recent `depth` turns, returned chronologically.
    async fn conversation_history(
        &self,
        session_id: Uuid,
        depth: u32,
    ) -> EngineResult<Vec<StoredMessage>>;

    async fn memory_facts(&self, bot_id: Uuid, limit: u32) -> EngineResult<Vec<MemoryFact>>;

    /// Retrieval chunks for knowledge/document questions.
    async fn rag_chunks(
        &self,
        bot_id: Uuid,
        query: &str,
        limit: u32,
    ) -> EngineResult<Vec<String>>;

    /// Up to `limit` rows plus the total count for the prompt snapshot.
    async fn skill_data_preview(
        &self,
        schema: &str,
        table: &str,
        limit: u32,
    ) -> EngineResult<TablePreview>;

    async fn table_schemas(
        &self,
        schema: &str,
        tables: &[String],
    ) -> EngineResult<Vec<TableSchema>>;

    /// Active tool entries whose names appear in `integrations`.
    async fn tools_for(
        &self,
        bot_id: Uuid,
        integrations: &[String],
    ) -> EngineResult<Vec<ToolRegistryEntry>>;

    /// Proposal dismissals within the suppression window.
    async fn recent_dismissals(
        &self,
        bot_id: Uuid,
        within_days: i64,
    ) -> EngineResult<Vec<ProposalDismissal>>;

    /// The previous assistant turn, for clarification-marker follow-up.
    async fn last_assistant_message(
        &self,
        session_id: Uuid,
    ) -> EngineResult<Option<StoredMessage>>;
}

// ── Bot store port ──────────────────────────────────────────────────────

/// Write-side lifecycle contract for bots. Both operations are single
/// transactions: a bot row never exists without its schema, and a
/// schema never outlives its row.
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Create the bot row and its namespaced schema atomically.
    async fn create_bot(&self, bot: &Bot) -> EngineResult<()>;

    /// Drop the bot's schema (cascade) and delete the row atomically.
    /// Messages referencing the bot's skills have their skill ids
    /// nulled by the cascade rules.
    async fn delete_bot(&self, bot_id: Uuid) -> EngineResult<()>;
}

// ── SQL backend port ────────────────────────────────────────────────────

/// Execution port under the sandboxed SQL executor and schema generator.
/// The engine owns validation, rewriting and timeouts; the backend owns
/// the wire. `search_path` is applied transaction-locally by the
/// implementation.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Run an already-validated read-only query.
    async fn query(&self, search_path: &str, sql: &str) -> EngineResult<Vec<Value>>;

    /// Run a single parameterized write statement. Returns rows affected.
    async fn execute(
        &self,
        search_path: &str,
        sql: &str,
        params: Vec<Value>,
    ) -> EngineResult<u64>;

    /// Run DDL (CREATE TABLE / ALTER TABLE / CREATE INDEX).
    async fn execute_ddl(&self, ddl: &str) -> EngineResult<()>;

    async fn table_exists(&self, schema: &str, table: &str) -> EngineResult<bool>;
}

// ── Cache backend port ──────────────────────────────────────────────────

/// Raw key-value backend. The cache service wraps every call in the
/// 100 ms ceiling; backends should not add their own policy.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> EngineResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> EngineResult<()>;

    /// Delete all given keys in one call, atomically with respect to the
    /// invalidation (a reader sees all keys present or all gone).
    async fn delete(&self, keys: &[String]) -> EngineResult<()>;
}

// ── Usage store port ────────────────────────────────────────────────────

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Insert one record; `cost_usd` is already computed and immutable.
    async fn record(&self, record: UsageRecord) -> EngineResult<()>;

    async fn records_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<Vec<UsageRecord>>;
}
