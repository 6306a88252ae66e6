// Kilo Engine — Schema Generator
// Turns a skill's JSON-Schema into a relational table inside the owning
// bot's namespaced schema. Identifier hygiene is absolute: every name
// that reaches DDL has passed sanitize_identifier, and columns are only
// ever added, never dropped.

use log::info;
use serde_json::Value;
use std::sync::Arc;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::SqlBackend;
use crate::atoms::types::ColumnSchema;

/// SQL reserved words that force a `col_` prefix on sanitized identifiers.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "case", "cast", "check",
    "column", "constraint", "create", "cross", "current_date", "current_time",
    "default", "delete", "desc", "distinct", "do", "drop", "else", "end",
    "except", "exists", "false", "for", "foreign", "from", "full", "grant",
    "group", "having", "in", "index", "inner", "insert", "intersect", "into",
    "is", "join", "left", "like", "limit", "natural", "not", "null", "offset",
    "on", "or", "order", "outer", "primary", "references", "returning",
    "right", "select", "set", "table", "then", "to", "true", "union",
    "unique", "update", "user", "using", "values", "when", "where", "with",
];

/// Common trailing words stripped from skill names before pluralizing.
const NAME_SUFFIXES: &[&str] = &["_tracker", "_log", "_manager", "_builder", "_planner"];

const MAX_IDENTIFIER_LEN: usize = 63;
const MAX_COLLISION_SUFFIX: u32 = 100;

// ── Output ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeneratedTable {
    pub table: String,
    pub ddl: String,
    pub columns: Vec<ColumnSchema>,
}

// ── Identifier hygiene ──────────────────────────────────────────────────

/// Sanitize an arbitrary string into a safe SQL identifier: lowercase,
/// non-[a-z0-9_] replaced with `_`, repeats collapsed, underscores
/// trimmed; `col_`-prefixed when reserved or not letter-initial;
/// truncated to 63 chars.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.to_lowercase().chars() {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            c
        } else {
            '_'
        };
        if mapped == '_' {
            if !last_underscore {
                out.push('_');
            }
            last_underscore = true;
        } else {
            out.push(mapped);
            last_underscore = false;
        }
    }
    let mut ident = out.trim_matches('_').to_string();

    let needs_prefix = ident.is_empty()
        || !ident.chars().next().map(|c| c.is_ascii_lowercase()).unwrap_or(false)
        || RESERVED_WORDS.contains(&ident.as_str());
    if needs_prefix {
        ident = format!("col_{}", ident);
    }
    ident.truncate(MAX_IDENTIFIER_LEN);
    ident.trim_end_matches('_').to_string()
}

/// Resolve a skill name into a base table name: sanitize, strip the
/// common role suffixes, pluralize.
pub fn table_base_name(skill_name: &str) -> String {
    let mut name = sanitize_identifier(skill_name);
    for suffix in NAME_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            if !stripped.is_empty() {
                name = stripped.to_string();
            }
            break;
        }
    }
    if !name.ends_with('s') {
        name.push('s');
    }
    name
}

// ── Column mapping ──────────────────────────────────────────────────────

/// Map one JSON-Schema property to a SQL type plus an optional CHECK
/// constraint body.
fn map_property(name: &str, prop: &Value) -> (String, Option<String>) {
    let prop_type = prop.get("type").and_then(Value::as_str).unwrap_or("string");
    match prop_type {
        "string" => {
            if let Some(values) = prop.get("enum").and_then(Value::as_array) {
                let quoted: Vec<String> = values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect();
                let check = format!("CHECK (\"{}\" IN ({}))", name, quoted.join(", "));
                return ("TEXT".into(), Some(check));
            }
            match prop.get("format").and_then(Value::as_str) {
                Some("date") => ("DATE".into(), None),
                Some("date-time") => ("TIMESTAMPTZ".into(), None),
                _ => ("TEXT".into(), None),
            }
        }
        "integer" => ("INTEGER".into(), None),
        "number" => ("DOUBLE PRECISION".into(), None),
        "boolean" => ("BOOLEAN".into(), None),
        "array" | "object" => ("JSONB".into(), None),
        _ => ("TEXT".into(), None),
    }
}

fn is_indexable(sql_type: &str) -> bool {
    sql_type != "JSONB"
}

fn is_temporal(sql_type: &str) -> bool {
    sql_type == "DATE" || sql_type == "TIMESTAMPTZ"
}

// ── DDL assembly ────────────────────────────────────────────────────────

/// Build the CREATE TABLE + index DDL for a skill table. Pure: no I/O.
pub fn build_table_ddl(
    schema_name: &str,
    table: &str,
    input_schema: &Value,
) -> EngineResult<(String, Vec<ColumnSchema>)> {
    let props = input_schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            EngineError::SchemaCreation("input schema has no properties object".into())
        })?;
    let required: Vec<&str> = input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let schema_ident = sanitize_identifier(schema_name);
    let mut columns = vec![
        ColumnSchema { name: "id".into(), sql_type: "UUID".into(), not_null: true },
        ColumnSchema { name: "created_at".into(), sql_type: "TIMESTAMPTZ".into(), not_null: true },
        ColumnSchema { name: "updated_at".into(), sql_type: "TIMESTAMPTZ".into(), not_null: true },
        ColumnSchema { name: "skill_id".into(), sql_type: "UUID".into(), not_null: true },
    ];
    let mut lines = vec![
        "    id UUID PRIMARY KEY DEFAULT gen_random_uuid()".to_string(),
        "    created_at TIMESTAMPTZ NOT NULL DEFAULT now()".to_string(),
        "    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()".to_string(),
        "    skill_id UUID NOT NULL".to_string(),
    ];
    let mut indexed: Vec<String> = Vec::new();

    for (raw_name, prop) in props {
        let col = sanitize_identifier(raw_name);
        if columns.iter().any(|c| c.name == col) {
            continue; // sanitization collision with an audit column
        }
        let (sql_type, check) = map_property(&col, prop);
        let not_null = required.contains(&raw_name.as_str());

        let mut line = format!("    \"{}\" {}", col, sql_type);
        if not_null {
            line.push_str(" NOT NULL");
        }
        if let Some(check) = check {
            line.push(' ');
            line.push_str(&check);
        }
        lines.push(line);

        if is_indexable(&sql_type) && (not_null || is_temporal(&sql_type)) {
            indexed.push(col.clone());
        }
        columns.push(ColumnSchema { name: col, sql_type, not_null });
    }

    let mut ddl = format!(
        "CREATE TABLE \"{}\".\"{}\" (\n{}\n);",
        schema_ident,
        table,
        lines.join(",\n")
    );
    for col in &indexed {
        ddl.push_str(&format!(
            "\nCREATE INDEX \"idx_{}_{}\" ON \"{}\".\"{}\" (\"{}\");",
            table, col, schema_ident, table, col
        ));
    }
    Ok((ddl, columns))
}

// ── Generator ───────────────────────────────────────────────────────────

pub struct SchemaGenerator {
    backend: Arc<dyn SqlBackend>,
}

impl SchemaGenerator {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }

    /// Create the skill's data table inside the bot's schema, resolving
    /// name collisions with `_2`..`_100` suffixes.
    pub async fn create_skill_table(
        &self,
        schema_name: &str,
        skill_name: &str,
        skill_id: &str,
        input_schema: &Value,
    ) -> EngineResult<GeneratedTable> {
        let base = table_base_name(skill_name);
        let table = self.resolve_collision(schema_name, &base).await?;
        let (ddl, columns) = build_table_ddl(schema_name, &table, input_schema)?;

        self.backend.execute_ddl(&ddl).await.map_err(|e| {
            EngineError::SchemaCreation(format!("creating {}.{}: {}", schema_name, table, e))
        })?;
        info!(
            "[schema-gen] created {}.{} for skill {} ({} columns)",
            schema_name,
            table,
            skill_id,
            columns.len()
        );
        Ok(GeneratedTable { table, ddl, columns })
    }

    /// Add one column to an existing skill table. Columns are never
    /// dropped — schema evolution is append-only.
    pub async fn add_column(
        &self,
        schema_name: &str,
        table: &str,
        column_name: &str,
        prop: &Value,
    ) -> EngineResult<ColumnSchema> {
        let col = sanitize_identifier(column_name);
        let (sql_type, check) = map_property(&col, prop);
        let mut ddl = format!(
            "ALTER TABLE \"{}\".\"{}\" ADD COLUMN \"{}\" {}",
            sanitize_identifier(schema_name),
            sanitize_identifier(table),
            col,
            sql_type
        );
        if let Some(check) = check {
            ddl.push(' ');
            ddl.push_str(&check);
        }
        ddl.push(';');

        self.backend.execute_ddl(&ddl).await.map_err(|e| {
            EngineError::SchemaCreation(format!("adding {}.{}: {}", table, col, e))
        })?;
        Ok(ColumnSchema { name: col, sql_type, not_null: false })
    }

    async fn resolve_collision(&self, schema: &str, base: &str) -> EngineResult<String> {
        if !self.backend.table_exists(schema, base).await? {
            return Ok(base.to_string());
        }
        for n in 2..=MAX_COLLISION_SUFFIX {
            let candidate = format!("{}_{}", base, n);
            if !self.backend.table_exists(schema, &candidate).await? {
                return Ok(candidate);
            }
        }
        Err(EngineError::SchemaCreation(format!(
            "no free table name for '{}' in schema {}",
            base, schema
        )))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_basics() {
        assert_eq!(sanitize_identifier("Total Amount"), "total_amount");
        assert_eq!(sanitize_identifier("weird--name!!"), "weird_name");
        assert_eq!(sanitize_identifier("__padded__"), "padded");
    }

    #[test]
    fn sanitize_reserved_and_leading_digit() {
        assert_eq!(sanitize_identifier("select"), "col_select");
        assert_eq!(sanitize_identifier("user"), "col_user");
        assert_eq!(sanitize_identifier("2fast"), "col_2fast");
    }

    #[test]
    fn sanitize_truncates_to_63() {
        let long = "x".repeat(100);
        assert_eq!(sanitize_identifier(&long).len(), 63);
    }

    #[test]
    fn table_name_strips_suffix_and_pluralizes() {
        assert_eq!(table_base_name("Expense Tracker"), "expenses");
        assert_eq!(table_base_name("Workout Log"), "workouts");
        assert_eq!(table_base_name("Trip Planner"), "trips");
        assert_eq!(table_base_name("Habit"), "habits");
        // Already plural-looking names are left alone.
        assert_eq!(table_base_name("Notes"), "notes");
    }

    #[test]
    fn ddl_maps_types_and_audit_columns() {
        let schema = json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number" },
                "count": { "type": "integer" },
                "done": { "type": "boolean" },
                "when_at": { "type": "string", "format": "date-time" },
                "day": { "type": "string", "format": "date" },
                "tags": { "type": "array" },
                "note": { "type": "string" }
            },
            "required": ["amount"]
        });
        let (ddl, columns) = build_table_ddl("bot_a1b2c3d4", "expenses", &schema).unwrap();

        assert!(ddl.contains("CREATE TABLE \"bot_a1b2c3d4\".\"expenses\""));
        assert!(ddl.contains("id UUID PRIMARY KEY DEFAULT gen_random_uuid()"));
        assert!(ddl.contains("\"amount\" DOUBLE PRECISION NOT NULL"));
        assert!(ddl.contains("\"count\" INTEGER"));
        assert!(ddl.contains("\"done\" BOOLEAN"));
        assert!(ddl.contains("\"when_at\" TIMESTAMPTZ"));
        assert!(ddl.contains("\"day\" DATE"));
        assert!(ddl.contains("\"tags\" JSONB"));
        // 4 audit + 7 mapped
        assert_eq!(columns.len(), 11);
    }

    #[test]
    fn ddl_enum_becomes_check() {
        let schema = json!({
            "properties": {
                "mood": { "type": "string", "enum": ["good", "bad", "it's ok"] }
            }
        });
        let (ddl, _) = build_table_ddl("bot_x", "moods", &schema).unwrap();
        assert!(ddl.contains("CHECK (\"mood\" IN ('good', 'bad', 'it''s ok'))"));
    }

    #[test]
    fn indexes_for_required_and_temporal_scalars_only() {
        let schema = json!({
            "properties": {
                "amount": { "type": "number" },
                "logged_at": { "type": "string", "format": "date-time" },
                "meta": { "type": "object" }
            },
            "required": ["amount", "meta"]
        });
        let (ddl, _) = build_table_ddl("bot_x", "entries", &schema).unwrap();
        assert!(ddl.contains("idx_entries_amount"));
        assert!(ddl.contains("idx_entries_logged_at"));
        // JSONB never gets a b-tree index, required or not.
        assert!(!ddl.contains("idx_entries_meta"));
    }

    #[test]
    fn missing_properties_errors() {
        assert!(build_table_ddl("bot_x", "t", &json!({"type": "object"})).is_err());
    }
}
