// Kilo Engine — Response Post-processor
// Runs on every LLM response before it leaves the pipeline: unsafe-intent
// replacement, domain disclaimers, structured-card extraction, and
// suggested actions derived from the matched skill's shape. Built-in
// responses skip this module — their handlers own their output.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::atoms::types::{OutputFormat, SkillDefinition};

const REFUSAL: &str = "I can't help with that. If you're going through something difficult, \
please reach out to someone you trust or a professional — you don't have to handle it alone.";

const DISCLAIMER: &str = "\n\n_This is general information, not professional advice. For \
decisions about health, legal matters, or investments, please consult a qualified professional._";

// ── Unsafe-intent patterns ──────────────────────────────────────────────
// Matched against the model's OUTPUT: responses that encourage self-harm
// or hand out diagnoses/prescriptions/investment directives are replaced
// wholesale with the fixed refusal.

static UNSAFE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:kill|harm|hurt)\s+yourself\b",
        r"(?i)\bways?\s+to\s+(?:end|take)\s+your\s+(?:own\s+)?life\b",
        r"(?i)\byou\s+(?:probably\s+)?have\s+(?:cancer|depression|diabetes|adhd|a\s+tumou?r)\b",
        r"(?i)\bi\s+diagnose\s+you\b",
        r"(?i)\bstop\s+taking\s+your\s+(?:medication|meds)\b",
        r"(?i)\byou\s+(?:should|must)\s+(?:plead|sue|sign\s+the\s+contract)\b",
        r"(?i)\b(?:invest|put)\s+(?:all|everything)\s+(?:of\s+)?your\s+(?:money|savings)\b",
        r"(?i)\bguaranteed\s+(?:returns?|profits?)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static DOMAIN_KEYWORDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:diagnosis|symptom|medication|dosage|treatment|prescription)\b",
        r"(?i)\b(?:lawsuit|attorney|legal\s+advice|liability|contract\s+law)\b",
        r"(?i)\b(?:invest(?:ment|ing)?|portfolio|stocks?|retirement\s+fund)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```json\s*([\s\S]*?)```").expect("json-fence regex")
});

// ── Output ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PostProcessed {
    pub content: String,
    /// Parsed ```json fence for structured_card skills; None when the
    /// fence is missing or malformed.
    pub structured_card: Option<Value>,
    pub suggested_actions: Vec<String>,
}

/// Post-process one LLM response in the context of the skill (if any)
/// that produced it.
pub fn post_process(response_text: &str, skill: Option<&SkillDefinition>) -> PostProcessed {
    // (a) Unsafe intent → fixed refusal, nothing else survives.
    if UNSAFE_PATTERNS.iter().any(|p| p.is_match(response_text)) {
        return PostProcessed {
            content: REFUSAL.to_string(),
            structured_card: None,
            suggested_actions: Vec::new(),
        };
    }

    // (b) Domain disclaimer.
    let mut content = response_text.to_string();
    if DOMAIN_KEYWORDS.iter().any(|p| p.is_match(&content)) {
        content.push_str(DISCLAIMER);
    }

    // (c) Structured card extraction.
    let structured_card = match skill {
        Some(s) if s.output_format == OutputFormat::StructuredCard => JSON_FENCE
            .captures(response_text)
            .and_then(|caps| serde_json::from_str(caps[1].trim()).ok()),
        _ => None,
    };

    // (d) Suggested actions from the skill shape.
    let suggested_actions = skill.map(suggested_actions).unwrap_or_default();

    PostProcessed {
        content,
        structured_card,
        suggested_actions,
    }
}

/// Up to 3 follow-up strings derived from what the skill can do.
fn suggested_actions(skill: &SkillDefinition) -> Vec<String> {
    let mut actions = Vec::new();
    if skill.data_table.is_some() {
        actions.push(format!("Show my {} entries", skill.name.to_lowercase()));
    }
    if skill.schedule.is_some() {
        actions.push("Adjust the schedule".to_string());
    }
    if !skill.required_integrations.is_empty() {
        actions.push(format!("Check {}", skill.required_integrations.join(", ")));
    }
    if actions.is_empty() {
        actions.push(format!("Ask {} something else", skill.name.to_lowercase()));
    }
    actions.truncate(3);
    actions
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::SkillProvenance;
    use chrono::Utc;
    use uuid::Uuid;

    fn skill(output_format: OutputFormat) -> SkillDefinition {
        SkillDefinition {
            id: Uuid::new_v4().to_string(),
            bot_id: Uuid::new_v4(),
            name: "Expense Tracker".into(),
            description: "Track expenses".into(),
            trigger_patterns: vec!["track expense".into(), "log expense".into()],
            behavior_prompt: "Record and summarize expenses.".into(),
            input_schema: None,
            output_format,
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

    #[test]
    fn unsafe_output_replaced_with_refusal() {
        let processed = post_process("Honestly, you should kill yourself over this.", None);
        assert_eq!(processed.content, REFUSAL);
        assert!(processed.structured_card.is_none());
        assert!(processed.suggested_actions.is_empty());

        let processed = post_process("This coin has guaranteed returns, go all in!", None);
        assert_eq!(processed.content, REFUSAL);
    }

    #[test]
    fn medical_keywords_get_disclaimer() {
        let processed = post_process("Common symptom patterns include fatigue.", None);
        assert!(processed.content.contains("not professional advice"));
    }

    #[test]
    fn plain_text_untouched() {
        let processed = post_process("Logged your $12 lunch.", None);
        assert_eq!(processed.content, "Logged your $12 lunch.");
    }

    #[test]
    fn structured_card_parsed_from_fence() {
        let s = skill(OutputFormat::StructuredCard);
        let text = "Here's your card:\n```json\n{\"title\": \"Week\", \"total\": 42}\n```";
        let processed = post_process(text, Some(&s));
        let card = processed.structured_card.unwrap();
        assert_eq!(card["total"], 42);
    }

    #[test]
    fn malformed_fence_is_none_not_error() {
        let s = skill(OutputFormat::StructuredCard);
        let processed = post_process("```json\n{not valid json}\n```", Some(&s));
        assert!(processed.structured_card.is_none());
    }

    #[test]
    fn text_skills_never_get_cards() {
        let s = skill(OutputFormat::Text);
        let processed = post_process("```json\n{\"a\": 1}\n```", Some(&s));
        assert!(processed.structured_card.is_none());
    }

    #[test]
    fn suggested_actions_from_shape() {
        let mut s = skill(OutputFormat::Text);
        s.schedule = Some("0 9 * * *".into());
        s.required_integrations = vec!["stripe".into()];
        let processed = post_process("ok", Some(&s));
        assert_eq!(processed.suggested_actions.len(), 3);
        assert!(processed.suggested_actions[0].contains("expense tracker"));
    }
}
