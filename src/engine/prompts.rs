// Kilo Engine — Prompt Composer
// Pure assembly: already-loaded inputs in, {system, messages, tools} out.
// No I/O, no clocks, no randomness — the same inputs always compose the
// same prompt. Section order in the skill prompt is fixed and load-
// bearing (identity → soul → skill → data → memory → rag → integrations
// → constraints).

use serde_json::json;

use crate::atoms::types::*;

#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

pub struct SkillPromptInputs<'a> {
    pub bot: &'a Bot,
    pub skill: &'a SkillDefinition,
    pub table_schemas: &'a [TableSchema],
    pub data_preview: Option<&'a TablePreview>,
    pub memory: &'a [MemoryFact],
    pub rag_chunks: &'a [String],
    pub tools: &'a [ToolRegistryEntry],
    pub history: &'a [StoredMessage],
    pub user_message: &'a str,
}

pub struct GeneralPromptInputs<'a> {
    pub bot: &'a Bot,
    pub skills: &'a [SkillDefinition],
    pub memory: &'a [MemoryFact],
    pub history: &'a [StoredMessage],
    pub user_message: &'a str,
}

// ── Skill prompt ────────────────────────────────────────────────────────

pub fn compose_skill_prompt(inputs: &SkillPromptInputs) -> ComposedPrompt {
    let mut sections: Vec<String> = Vec::new();

    sections.push(identity_section(inputs.bot));
    if let Some(soul) = &inputs.bot.soul {
        if let Some(rendered) = render_soul(soul) {
            sections.push(rendered);
        }
    }

    sections.push(format!(
        "## Active Skill: {}\n{}\n\nBehavior:\n{}",
        inputs.skill.name, inputs.skill.description, inputs.skill.behavior_prompt
    ));

    if !inputs.table_schemas.is_empty() {
        let mut section = String::from("## Data Tables\n");
        for table in inputs.table_schemas {
            section.push_str(&format!("### {}\n", table.table));
            for column in &table.columns {
                section.push_str(&format!(
                    "- {} {}{}\n",
                    column.name,
                    column.sql_type,
                    if column.not_null { " NOT NULL" } else { "" }
                ));
            }
        }
        sections.push(section.trim_end().to_string());
    }

    if let Some(preview) = inputs.data_preview {
        let mut section = format!(
            "## Current Data ({} rows total, showing up to {})\n",
            preview.total_count,
            preview.rows.len()
        );
        for row in &preview.rows {
            section.push_str(&format!("- {}\n", row));
        }
        sections.push(section.trim_end().to_string());
    }

    if !inputs.memory.is_empty() {
        sections.push(memory_section(inputs.memory));
    }

    if !inputs.rag_chunks.is_empty() {
        let mut section = String::from("## Knowledge\n");
        for chunk in inputs.rag_chunks {
            section.push_str(&format!("{}\n---\n", chunk));
        }
        sections.push(section.trim_end().to_string());
    }

    if !inputs.tools.is_empty() {
        let mut section = String::from("## API Integrations\n");
        for tool in inputs.tools {
            section.push_str(&format!("### {} — {}\n", tool.name, tool.base_url));
            for endpoint in &tool.endpoints {
                section.push_str(&format!(
                    "- {} {} — {}\n",
                    endpoint.method, endpoint.path, endpoint.description
                ));
            }
        }
        sections.push(section.trim_end().to_string());
    }

    sections.push(
        "## Constraints\n\
         - Keep responses concise.\n\
         - Use query_skill_data to read stored data; never guess at stored values.\n\
         - Use insert_skill_data to store new entries.\n\
         - Never fabricate data, API responses, or schedule confirmations."
            .to_string(),
    );

    ComposedPrompt {
        system: sections.join("\n\n"),
        messages: build_messages(inputs.history, inputs.user_message),
        tools: synthesize_tools(inputs.skill, inputs.tools),
    }
}

// ── General (no-skill) prompt ───────────────────────────────────────────

pub fn compose_general_prompt(inputs: &GeneralPromptInputs) -> ComposedPrompt {
    let mut sections: Vec<String> = Vec::new();

    sections.push(identity_section(inputs.bot));
    match &inputs.bot.soul {
        Some(soul) if !soul.is_empty() => {
            if let Some(rendered) = render_soul(soul) {
                sections.push(rendered);
            }
        }
        _ => {
            // Fallback personality block when no Soul is configured.
            sections.push(
                "## Context\nYou are helpful, direct, and warm. Answer from what you \
                 know about the user; say so plainly when you don't know something."
                    .to_string(),
            );
        }
    }

    sections.push(
        "## Capabilities\n\
         - Answer questions and hold open-ended conversation.\n\
         - Run the user's saved skills when a request matches one.\n\
         - Propose new skills for repeatable needs.\n\
         - Learn new API integrations on request."
            .to_string(),
    );

    if !inputs.skills.is_empty() {
        let mut section = String::from("## Your Skills\n");
        for skill in inputs.skills.iter().filter(|s| s.active) {
            section.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }
        sections.push(section.trim_end().to_string());
    }

    if !inputs.memory.is_empty() {
        sections.push(memory_section(inputs.memory));
    }

    ComposedPrompt {
        system: sections.join("\n\n"),
        messages: build_messages(inputs.history, inputs.user_message),
        tools: vec![schedule_notification_tool()],
    }
}

// ── Sections ────────────────────────────────────────────────────────────

fn identity_section(bot: &Bot) -> String {
    match &bot.personality {
        Some(personality) if !personality.is_empty() => {
            format!("You are {}, a personal assistant.\n{}", bot.name, personality)
        }
        _ => format!("You are {}, a personal assistant.", bot.name),
    }
}

/// Render the five Soul layers in fixed order, omitting empty ones.
fn render_soul(soul: &Soul) -> Option<String> {
    if soul.is_empty() {
        return None;
    }
    let mut out = String::from("## Soul\n");
    let layers: [(&str, &Vec<String>); 5] = [
        ("Traits", &soul.traits),
        ("Values", &soul.values),
        ("Style", &soul.style),
        ("Rules", &soul.rules),
        ("Decision Framework", &soul.decision_framework),
    ];
    for (label, entries) in layers {
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n", label));
        for entry in entries {
            out.push_str(&format!("- {}\n", entry));
        }
    }
    Some(out.trim_end().to_string())
}

fn memory_section(memory: &[MemoryFact]) -> String {
    let mut section = String::from("## What You Know About The User\n");
    for fact in memory {
        section.push_str(&format!("- {}: {}\n", fact.key, fact.value));
    }
    section.trim_end().to_string()
}

fn build_messages(history: &[StoredMessage], user_message: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();
    messages.push(ChatMessage::user(user_message));
    messages
}

// ── Tool synthesis ──────────────────────────────────────────────────────

fn synthesize_tools(skill: &SkillDefinition, api_tools: &[ToolRegistryEntry]) -> Vec<ToolSpec> {
    let mut tools = Vec::new();

    if !skill.readable_tables.is_empty() {
        tools.push(ToolSpec {
            name: "query_skill_data".into(),
            description: format!(
                "Run a read-only SQL query against: {}",
                skill.readable_tables.join(", ")
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "A SELECT statement" }
                },
                "required": ["sql"]
            }),
        });
    }

    if skill.data_table.is_some() {
        tools.push(ToolSpec {
            name: "insert_skill_data".into(),
            description: "Store a new row in this skill's data table".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "data": { "type": "object", "description": "Column-value map" }
                },
                "required": ["data"]
            }),
        });
        tools.push(ToolSpec {
            name: "update_skill_data".into(),
            description: "Update an existing row by id".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "data": { "type": "object", "description": "Column-value map" }
                },
                "required": ["id", "data"]
            }),
        });
    }

    tools.push(schedule_notification_tool());

    if !api_tools.is_empty() {
        // One call_api tool; the endpoint catalog rides in the
        // description so the model's choices stay bounded.
        let tool_names: Vec<&str> = api_tools.iter().map(|t| t.name.as_str()).collect();
        let mut catalog = String::from("Call a declared endpoint of a connected API. Catalog:\n");
        let mut methods: Vec<String> = Vec::new();
        for tool in api_tools {
            for endpoint in &tool.endpoints {
                catalog.push_str(&format!(
                    "- {}: {} {} — {}\n",
                    tool.name, endpoint.method, endpoint.path, endpoint.description
                ));
                if !methods.contains(&endpoint.method) {
                    methods.push(endpoint.method.clone());
                }
            }
        }
        tools.push(ToolSpec {
            name: "call_api".into(),
            description: catalog.trim_end().to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tool": { "type": "string", "enum": tool_names },
                    "endpoint": { "type": "string", "description": "Declared endpoint path" },
                    "method": { "type": "string", "enum": methods },
                    "body": { "type": "object" }
                },
                "required": ["tool", "endpoint", "method"]
            }),
        });
    }

    tools
}

fn schedule_notification_tool() -> ToolSpec {
    ToolSpec {
        name: "schedule_notification".into(),
        description: "Schedule a notification to the user".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
                "at": { "type": "string", "description": "ISO-8601 time or cron expression" },
                "recurring": { "type": "string", "description": "Cron expression for repeats" }
            },
            "required": ["message", "at"]
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn bot(soul: Option<Soul>) -> Bot {
        let id = Uuid::new_v4();
        Bot {
            id,
            user_id: "u1".into(),
            name: "Kilo".into(),
            personality: Some("Friendly and precise.".into()),
            soul,
            schema_name: Bot::schema_name_for(&id),
            created_at: Utc::now(),
        }
    }

    fn skill() -> SkillDefinition {
        SkillDefinition {
            id: Uuid::new_v4().to_string(),
            bot_id: Uuid::new_v4(),
            name: "Expense Tracker".into(),
            description: "Track expenses".into(),
            trigger_patterns: vec!["track expense".into(), "log expense".into()],
            behavior_prompt: "Record each expense and confirm it.".into(),
            input_schema: None,
            output_format: OutputFormat::Text,
            schedule: None,
            data_table: Some("expenses".into()),
            readable_tables: vec!["expenses".into()],
            generated_ddl: None,
            required_integrations: vec![],
            created_by: SkillProvenance::UserConversation,
            version: 1,
            performance_score: 0.0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn api_tool() -> ToolRegistryEntry {
        ToolRegistryEntry {
            id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            name: "stripe".into(),
            base_url: "https://api.stripe.com".into(),
            auth_kind: AuthKind::Bearer,
            auth_blob: None,
            endpoints: vec![ToolEndpoint {
                path: "/v1/charges".into(),
                method: "GET".into(),
                description: "List charges".into(),
                parameters: json!({}),
                response_schema: None,
            }],
            active: true,
            auth_instructions: None,
        }
    }

    fn inputs<'a>(
        bot: &'a Bot,
        skill: &'a SkillDefinition,
        tools: &'a [ToolRegistryEntry],
    ) -> SkillPromptInputs<'a> {
        SkillPromptInputs {
            bot,
            skill,
            table_schemas: &[],
            data_preview: None,
            memory: &[],
            rag_chunks: &[],
            tools,
            history: &[],
            user_message: "log a $12 lunch",
        }
    }

    #[test]
    fn section_order_is_fixed() {
        let soul = Soul {
            traits: vec!["curious".into()],
            values: vec![],
            style: vec!["brief".into()],
            rules: vec![],
            decision_framework: vec![],
        };
        let bot = bot(Some(soul));
        let skill = skill();
        let tools = [api_tool()];
        let prompt = compose_skill_prompt(&inputs(&bot, &skill, &tools));

        let identity = prompt.system.find("You are Kilo").unwrap();
        let soul_at = prompt.system.find("## Soul").unwrap();
        let skill_at = prompt.system.find("## Active Skill").unwrap();
        let api_at = prompt.system.find("## API Integrations").unwrap();
        let constraints_at = prompt.system.find("## Constraints").unwrap();
        assert!(identity < soul_at && soul_at < skill_at && skill_at < api_at);
        assert!(api_at < constraints_at);
        // Empty soul layers are omitted entirely.
        assert!(!prompt.system.contains("### Values"));
        assert!(prompt.system.contains("### Traits"));
    }

    #[test]
    fn messages_are_history_then_user_turn() {
        let bot = bot(None);
        let skill = skill();
        let history = vec![
            StoredMessage {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                bot_id: bot.id,
                role: Role::User,
                content: "hi".into(),
                attachments: vec![],
                skill_id: None,
                created_at: Utc::now(),
            },
            StoredMessage {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                bot_id: bot.id,
                role: Role::Assistant,
                content: "hello!".into(),
                attachments: vec![],
                skill_id: None,
                created_at: Utc::now(),
            },
        ];
        let mut input = inputs(&bot, &skill, &[]);
        input.history = &history;
        let prompt = compose_skill_prompt(&input);
        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages[0].content, "hi");
        assert_eq!(prompt.messages[1].role, Role::Assistant);
        assert_eq!(prompt.messages[2].content, "log a $12 lunch");
    }

    #[test]
    fn tool_synthesis_for_data_skill() {
        let bot = bot(None);
        let skill = skill();
        let prompt = compose_skill_prompt(&inputs(&bot, &skill, &[]));
        let names: Vec<&str> = prompt.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "query_skill_data",
                "insert_skill_data",
                "update_skill_data",
                "schedule_notification"
            ]
        );
    }

    #[test]
    fn call_api_embeds_catalog_and_enums() {
        let bot = bot(None);
        let skill = skill();
        let tools = [api_tool()];
        let prompt = compose_skill_prompt(&inputs(&bot, &skill, &tools));
        let call_api = prompt.tools.iter().find(|t| t.name == "call_api").unwrap();
        assert!(call_api.description.contains("GET /v1/charges"));
        assert_eq!(call_api.parameters["properties"]["tool"]["enum"][0], "stripe");
        assert_eq!(call_api.parameters["properties"]["method"]["enum"][0], "GET");
    }

    #[test]
    fn skill_without_data_table_gets_no_write_tools() {
        let bot = bot(None);
        let mut s = skill();
        s.data_table = None;
        s.readable_tables = vec![];
        let prompt = compose_skill_prompt(&inputs(&bot, &s, &[]));
        let names: Vec<&str> = prompt.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["schedule_notification"]);
    }

    #[test]
    fn general_prompt_lists_skills_and_fallback_block() {
        let bot = bot(None);
        let skills = vec![skill()];
        let prompt = compose_general_prompt(&GeneralPromptInputs {
            bot: &bot,
            skills: &skills,
            memory: &[],
            history: &[],
            user_message: "hello there",
        });
        assert!(prompt.system.contains("## Capabilities"));
        assert!(prompt.system.contains("Expense Tracker: Track expenses"));
        assert!(prompt.system.contains("## Context"));
        assert_eq!(prompt.tools.len(), 1);
    }

    #[test]
    fn data_preview_and_memory_render() {
        let bot = bot(None);
        let skill = skill();
        let preview = TablePreview {
            rows: vec![json!({"amount": 12.5, "note": "lunch"})],
            total_count: 41,
        };
        let memory = vec![MemoryFact {
            key: "name".into(),
            value: "Maya".into(),
            source: FactSource::UserStated,
            confidence: 0.95,
            created_at: Utc::now(),
        }];
        let mut input = inputs(&bot, &skill, &[]);
        input.data_preview = Some(&preview);
        input.memory = &memory;
        let prompt = compose_skill_prompt(&input);
        assert!(prompt.system.contains("41 rows total"));
        assert!(prompt.system.contains("name: Maya"));
    }
}
