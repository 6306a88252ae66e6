// Kilo Engine — Skill Matcher
// Phase 1 is a tokenized keyword scorer: lowercase, strip punctuation,
// drop one-char tokens and stop words, then score each (skill, pattern)
// pair as 0.7·recall + 0.3·precision. A pattern is only eligible when
// every one of its content tokens appears in the message — the recall
// gate that keeps single-word coincidences from driving a match. Phase 2
// turns the best score into a definitive or tentative match (the slot
// between 0.4 and 0.7 is reserved for a future classifier pass).
//
// A match carries the context requirements and model preference derived
// from the skill's shape, so the orchestrator can fan out exactly the
// loads the prompt needs.

use std::collections::HashSet;

use crate::atoms::constants::{
    MATCH_DEFINITIVE, MATCH_FLOOR, MAX_PATTERN_SCORING_TOKENS, STOP_WORDS, HISTORY_DEPTH,
};
use crate::atoms::types::{ContextRequirements, SkillDefinition, SkillMatch, TaskType};

// ── Tokenizing ──────────────────────────────────────────────────────────

/// Content tokens: lowercased alphanumeric runs, length >1, stop words
/// removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Pattern tokens capped for scoring, preserving first occurrence order.
/// Very long multi-clause patterns score over their first 12 content
/// tokens so recall stays meaningful.
fn pattern_tokens(pattern: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    pattern
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .take(MAX_PATTERN_SCORING_TOKENS)
        .map(str::to_string)
        .collect()
}

// ── Phase 1: fast match ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FastScore {
    skill_index: usize,
    score: f64,
}

/// Score every active (skill, pattern) pair and keep the best above the
/// floor. Patterns with any content token missing from the message never
/// score at all.
fn best_fast_match(message_tokens: &HashSet<String>, skills: &[SkillDefinition]) -> Option<FastScore> {
    if message_tokens.is_empty() {
        return None;
    }
    let mut best: Option<FastScore> = None;

    for (index, skill) in skills.iter().enumerate() {
        if !skill.active {
            continue;
        }
        for pattern in &skill.trigger_patterns {
            let tokens = pattern_tokens(pattern);
            if tokens.is_empty() {
                continue;
            }
            // Recall gate: every content token must appear in the message.
            let overlap = tokens.iter().filter(|t| message_tokens.contains(*t)).count();
            if overlap < tokens.len() {
                continue;
            }

            let recall = overlap as f64 / tokens.len() as f64;
            let precision = overlap as f64 / message_tokens.len() as f64;
            let score = 0.7 * recall + 0.3 * precision;
            if score < MATCH_FLOOR {
                continue;
            }
            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(FastScore { skill_index: index, score });
            }
        }
    }
    best
}

// ── Phase 2: dispatch ───────────────────────────────────────────────────

/// Match a message against the union of built-in and bot-owned skills.
/// Returns the winning skill with its context requirements, or None when
/// nothing clears the floor.
pub fn match_skills(message: &str, skills: &[SkillDefinition]) -> Option<SkillMatch> {
    let message_tokens = tokenize(message);
    let fast = best_fast_match(&message_tokens, skills)?;
    let skill = skills[fast.skill_index].clone();
    let context = context_requirements(&skill);
    let task_type = model_preference(&skill);

    Some(SkillMatch {
        definitive: fast.score >= MATCH_DEFINITIVE,
        score: fast.score,
        context,
        task_type,
        skill,
    })
}

// ── Context derivation ──────────────────────────────────────────────────

/// Words in a description or trigger that suggest the skill answers by
/// querying its stored rows.
const QUERY_HINTS: &[&str] = &[
    "show", "list", "how many", "how much", "total", "summary", "report",
    "average", "history", "so far",
];

/// Derive what the matched skill needs loaded before prompting.
pub fn context_requirements(skill: &SkillDefinition) -> ContextRequirements {
    let scheduled = skill.schedule.is_some();
    let behavior = skill.behavior_prompt.to_lowercase();
    let needs_rag = ["knowledge", "document", "uploaded"]
        .iter()
        .any(|k| behavior.contains(k));

    let mut hint_text = skill.description.to_lowercase();
    for pattern in &skill.trigger_patterns {
        hint_text.push(' ');
        hint_text.push_str(&pattern.to_lowercase());
    }
    let query_suggested = QUERY_HINTS.iter().any(|h| hint_text.contains(h));

    ContextRequirements {
        needs_conversation_history: !scheduled,
        history_depth: if scheduled { 0 } else { HISTORY_DEPTH },
        // Skills with their own table keep state there, not in memory.
        needs_memory: skill.data_table.is_none(),
        needs_rag,
        needs_skill_data: !skill.readable_tables.is_empty() || query_suggested,
    }
}

/// Pick the LLM task route for a matched skill.
pub fn model_preference(skill: &SkillDefinition) -> TaskType {
    if skill.readable_tables.len() > 1 {
        TaskType::DataAnalysis
    } else if skill.schedule.is_some() {
        TaskType::SimpleQa
    } else {
        TaskType::SkillExecution
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
