// Kilo Engine — Built-in Skill Registry
// Three system skills backed by in-process handlers: time/date, date
// math, and random generation. A built-in match short-circuits the LLM
// entirely — the handler produces the final response. Identifiers carry
// the fixed `builtin-` prefix and are never persisted as skill foreign
// keys.

mod clock;
mod date_math;
mod random;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::atoms::types::{OutputFormat, SkillDefinition, SkillProvenance};

pub const TIME_SKILL_ID: &str = "builtin-time";
pub const DATE_MATH_SKILL_ID: &str = "builtin-date-math";
pub const RANDOM_SKILL_ID: &str = "builtin-random";

#[derive(Debug, Clone)]
pub struct BuiltinResponse {
    pub content: String,
    pub skill_id: String,
    pub suggested_actions: Vec<String>,
}

/// Read-only after construction; shared process-wide.
#[derive(Default)]
pub struct BuiltinRegistry;

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Built-in definitions in matcher-compatible shape, so one matching
    /// pass covers the union of built-in and bot-owned skills.
    pub fn definitions(&self) -> Vec<SkillDefinition> {
        vec![
            builtin_definition(
                TIME_SKILL_ID,
                "Time & Date",
                "Tell the current time or date in any city or timezone",
                &[
                    "what time is it",
                    "current time in",
                    "what day is it",
                    "what is today's date",
                    "time in",
                ],
            ),
            builtin_definition(
                DATE_MATH_SKILL_ID,
                "Date Math",
                "Count days until holidays and dates, resolve relative dates",
                &[
                    "how many days until",
                    "days until",
                    "days between",
                    "days ago",
                    "days from now",
                    "when is next",
                ],
            ),
            builtin_definition(
                RANDOM_SKILL_ID,
                "Random",
                "Generate UUIDs, random numbers, and passwords",
                &[
                    "random number between",
                    "pick a random number",
                    "generate a password",
                    "generate a uuid",
                ],
            ),
        ]
    }

    /// Dispatch a matched built-in. Returns None for unknown ids so the
    /// orchestrator can fall through rather than fail.
    pub fn handle(
        &self,
        skill_id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Option<BuiltinResponse> {
        match skill_id {
            TIME_SKILL_ID => Some(clock::handle(message, now)),
            DATE_MATH_SKILL_ID => Some(date_math::handle(message, now)),
            RANDOM_SKILL_ID => Some(random::handle(message)),
            _ => None,
        }
    }

}

fn builtin_definition(
    id: &str,
    name: &str,
    description: &str,
    patterns: &[&str],
) -> SkillDefinition {
    let now = Utc::now();
    SkillDefinition {
        id: id.to_string(),
        bot_id: Uuid::nil(),
        name: name.to_string(),
        description: description.to_string(),
        trigger_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        behavior_prompt: String::new(),
        input_schema: None,
        output_format: OutputFormat::Text,
        schedule: None,
        data_table: None,
        readable_tables: vec![],
        generated_ddl: None,
        required_integrations: vec![],
        created_by: SkillProvenance::System,
        version: 1,
        performance_score: 1.0,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::matcher::match_skills;

    #[test]
    fn definitions_carry_builtin_prefix() {
        let registry = BuiltinRegistry::new();
        for def in registry.definitions() {
            assert!(def.id.starts_with("builtin-"));
            assert!(def.is_builtin());
            assert!(def.trigger_patterns.len() >= 2);
        }
    }

    #[test]
    fn matcher_routes_to_time_builtin() {
        let registry = BuiltinRegistry::new();
        let defs = registry.definitions();
        let m = match_skills("what time is it in Tokyo?", &defs).unwrap();
        assert_eq!(m.skill.id, TIME_SKILL_ID);
    }

    #[test]
    fn matcher_routes_to_date_math() {
        let registry = BuiltinRegistry::new();
        let defs = registry.definitions();
        let m = match_skills("how many days until Christmas?", &defs).unwrap();
        assert_eq!(m.skill.id, DATE_MATH_SKILL_ID);
    }

    #[test]
    fn unknown_id_returns_none() {
        let registry = BuiltinRegistry::new();
        assert!(registry.handle("builtin-nope", "hi", Utc::now()).is_none());
    }
}
