// Kilo Engine — Sandboxed SQL Executor
// Guards every LLM-proposed read against skill data. Validation rules run
// in order and reject before anything touches the backend: SELECT/WITH
// only, forbidden-keyword scan, multi-statement defense, table allow-list,
// LIMIT injection. Execution is bounded by a 5 s timeout and a 1000-row
// truncation. Writes never pass through the parser — the insert/update
// helpers build parameterized statements against the caller-declared
// table only.

use log::{info, warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::LazyLock;

use crate::atoms::constants::{SQL_QUERY_TIMEOUT, SQL_ROW_CAP};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::SqlBackend;
use crate::engine::schema_gen::sanitize_identifier;

// ── Validation ──────────────────────────────────────────────────────────

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|create|truncate|grant|revoke|into|set)\b",
    )
    .expect("forbidden-keyword regex")
});

static TABLE_REFS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+("?[a-z_][\w$]*"?(?:\."?[a-z_][\w$]*"?)?)"#)
        .expect("table-ref regex")
});

static HAS_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\s+\d+").expect("limit regex"));

/// Validate and rewrite an LLM-proposed read query. Returns the query to
/// execute (with LIMIT appended when absent).
pub fn validate_read_query(
    sql: &str,
    allowed_tables: &[String],
    bot_schema: &str,
) -> EngineResult<String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let upper = trimmed.to_uppercase();

    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(EngineError::QueryRejected(
            "only SELECT or WITH queries are allowed".into(),
        ));
    }

    if let Some(m) = FORBIDDEN.find(trimmed) {
        return Err(EngineError::QueryRejected(format!(
            "forbidden keyword '{}'",
            m.as_str().to_uppercase()
        )));
    }

    // Multi-statement defense: a terminator followed by anything else.
    if let Some(idx) = trimmed.find(';') {
        if trimmed[idx + 1..].chars().any(|c| !c.is_whitespace()) {
            return Err(EngineError::QueryRejected(
                "multiple statements are not allowed".into(),
            ));
        }
    }

    for cap in TABLE_REFS.captures_iter(trimmed) {
        let reference = cap[1].replace('"', "");
        let allowed = match reference.split_once('.') {
            // Schema-qualified: must target the bot's own schema.
            Some((schema, _table)) => schema.eq_ignore_ascii_case(bot_schema),
            None => allowed_tables
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&reference)),
        };
        if !allowed {
            return Err(EngineError::QueryRejected(format!(
                "table '{}' is not readable by this skill",
                reference
            )));
        }
    }

    let mut rewritten = trimmed.to_string();
    if !HAS_LIMIT.is_match(&rewritten) {
        rewritten = format!("{} LIMIT {}", rewritten, SQL_ROW_CAP);
    }
    Ok(rewritten)
}

// ── Executor ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SkillQueryResult {
    pub rows: Vec<Value>,
    /// True when the backend returned more rows than the cap.
    pub truncated: bool,
}

pub struct SqlSandbox {
    backend: Arc<dyn SqlBackend>,
}

impl SqlSandbox {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    /// Validate and run a read against skill data. The bot's schema is
    /// the transaction-local search path; the query is bounded by the
    /// 5 s ceiling and truncated at 1000 rows.
    pub async fn query(
        &self,
        sql: &str,
        allowed_tables: &[String],
        bot_schema: &str,
    ) -> EngineResult<SkillQueryResult> {
        let rewritten = validate_read_query(sql, allowed_tables, bot_schema)?;
        info!("[sql-guard] running query against {}", bot_schema);

        let rows = tokio::time::timeout(
            SQL_QUERY_TIMEOUT,
            self.backend.query(bot_schema, &rewritten),
        )
        .await
        .map_err(|_| {
            warn!("[sql-guard] query timed out after {:?}", SQL_QUERY_TIMEOUT);
            EngineError::QueryRejected("query timed out".into())
        })??;

        let truncated = rows.len() > SQL_ROW_CAP;
        let rows = if truncated {
            rows.into_iter().take(SQL_ROW_CAP).collect()
        } else {
            rows
        };
        Ok(SkillQueryResult { rows, truncated })
    }

    /// Insert a column-value map into the caller-declared table. Bypasses
    /// the read parser entirely — identifiers are sanitized, values are
    /// bound as parameters.
    pub async fn insert_row(
        &self,
        bot_schema: &str,
        table: &str,
        skill_id: &str,
        data: &Map<String, Value>,
    ) -> EngineResult<u64> {
        let table = sanitize_identifier(table);
        let mut columns = vec!["skill_id".to_string()];
        let mut params: Vec<Value> = vec![Value::String(skill_id.to_string())];
        for (key, value) in data {
            let col = sanitize_identifier(key);
            if col == "id" || col == "skill_id" || col == "created_at" || col == "updated_at" {
                continue;
            }
            columns.push(col);
            params.push(value.clone());
        }
        let placeholders: Vec<String> =
            (1..=params.len()).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO \"{}\".\"{}\" ({}) VALUES ({})",
            sanitize_identifier(bot_schema),
            table,
            columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        self.backend.execute(bot_schema, &sql, params).await
    }

    /// Update a row by id in the caller-declared table.
    pub async fn update_row(
        &self,
        bot_schema: &str,
        table: &str,
        row_id: &str,
        data: &Map<String, Value>,
    ) -> EngineResult<u64> {
        let table = sanitize_identifier(table);
        let mut assignments: Vec<String> = Vec::new();
        let mut params: Vec<Value> = vec![Value::String(row_id.to_string())];
        for (key, value) in data {
            let col = sanitize_identifier(key);
            if col == "id" || col == "skill_id" || col == "created_at" {
                continue;
            }
            params.push(value.clone());
            assignments.push(format!("\"{}\" = ${}", col, params.len()));
        }
        if assignments.is_empty() {
            return Err(EngineError::QueryRejected("no columns to update".into()));
        }
        assignments.push("\"updated_at\" = now()".into());
        let sql = format!(
            "UPDATE \"{}\".\"{}\" SET {} WHERE id = $1",
            sanitize_identifier(bot_schema),
            table,
            assignments.join(", ")
        );
        self.backend.execute(bot_schema, &sql, params).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
