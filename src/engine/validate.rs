// Kilo Engine — Skill Validator
// Two stages, run in order with short-circuit on failure:
//   1. structural — field limits, prompt-injection scan, cron sanity;
//   2. trigger overlap — Jaccard similarity against existing skills.
// Warnings from stage 1 survive into the final report either way.
// Report fields use the wire names the API exposes (camelCase fields,
// snake_case rules).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::atoms::constants::*;
use crate::atoms::types::SkillDefinition;

// ── Report types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Schema,
    TriggerOverlap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOption {
    KeepBoth,
    Merge,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConflict {
    #[serde(rename = "newPattern")]
    pub new_pattern: String,
    #[serde(rename = "existingSkill")]
    pub existing_skill: String,
    #[serde(rename = "existingPattern")]
    pub existing_pattern: String,
    pub similarity: f64,
    #[serde(rename = "resolutionOptions")]
    pub resolution_options: Vec<ResolutionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// The stage that failed, when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<ValidationStage>,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
    pub conflicts: Vec<TriggerConflict>,
}

// ── Tier caps ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    Free,
    Pro,
    Unlimited,
}

/// Enforce the per-tier active-skill cap before a create is attempted.
pub fn check_skill_limit(
    tier: AccountTier,
    active_count: usize,
) -> Result<(), crate::EngineError> {
    let limit = match tier {
        AccountTier::Free => SKILL_LIMIT_FREE,
        AccountTier::Pro => SKILL_LIMIT_PRO,
        AccountTier::Unlimited => return Ok(()),
    };
    if active_count >= limit {
        return Err(crate::EngineError::SkillLimitExceeded { limit });
    }
    Ok(())
}

// ── Prompt-injection patterns ───────────────────────────────────────────

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s+(all\s+)?previous\s+instructions",
        r"(?i)you\s+are\s+now\s+",
        r"(?i)forget\s+your\s+system\s+prompt",
        r"(?i)disregard\s+all\s+",
        r"(?i)override\s+safety",
        r"(?i)new\s+instructions?\s*:",
        r"(?i)bypass\s+(safety|content|guard)",
        r"(?i)pretend\s+(you\s+are|to\s+be)\s+",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

// ── Tokenizing / Jaccard (shared with the proposer) ─────────────────────

/// Lowercased alphanumeric tokens longer than 2 chars.
pub fn overlap_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

// ── Validator ───────────────────────────────────────────────────────────

/// Validate a draft skill against structural rules, then against the
/// bot's active skills for trigger overlap.
pub fn validate_skill(
    draft: &SkillDefinition,
    existing: &[SkillDefinition],
) -> ValidationReport {
    let mut warnings = Vec::new();
    let issues = structural_issues(draft, &mut warnings);
    if !issues.is_empty() {
        return ValidationReport {
            valid: false,
            stage: Some(ValidationStage::Schema),
            issues,
            warnings,
            conflicts: Vec::new(),
        };
    }

    let conflicts = trigger_conflicts(draft, existing);
    ValidationReport {
        valid: conflicts.is_empty(),
        stage: if conflicts.is_empty() {
            None
        } else {
            Some(ValidationStage::TriggerOverlap)
        },
        issues: Vec::new(),
        warnings,
        conflicts,
    }
}

// ── Stage 1: structural ─────────────────────────────────────────────────

fn structural_issues(
    draft: &SkillDefinition,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut issue = |field: &str, rule: &str, message: String| {
        issues.push(ValidationIssue {
            field: field.into(),
            rule: rule.into(),
            message,
        });
    };

    if draft.name.trim().is_empty() {
        issue("name", "required", "skill name must not be empty".into());
    } else if draft.name.chars().count() > MAX_SKILL_NAME_CHARS {
        issue(
            "name",
            "max_length",
            format!("skill name exceeds {} chars", MAX_SKILL_NAME_CHARS),
        );
    }

    if draft.trigger_patterns.len() < MIN_TRIGGER_PATTERNS {
        issue(
            "triggerPatterns",
            "min_count",
            format!("at least {} trigger patterns required", MIN_TRIGGER_PATTERNS),
        );
    }
    for pattern in &draft.trigger_patterns {
        if pattern.chars().count() > MAX_TRIGGER_PATTERN_CHARS {
            issue(
                "triggerPatterns",
                "max_length",
                format!("trigger pattern exceeds {} chars", MAX_TRIGGER_PATTERN_CHARS),
            );
            break;
        }
    }
    let mut normalized: HashSet<String> = HashSet::new();
    for pattern in &draft.trigger_patterns {
        if !normalized.insert(pattern.trim().to_lowercase()) {
            issue(
                "triggerPatterns",
                "duplicate",
                format!("duplicate trigger pattern '{}'", pattern.trim()),
            );
            break;
        }
    }
    if draft.trigger_patterns.len() == MIN_TRIGGER_PATTERNS {
        warnings.push(ValidationWarning {
            field: "triggerPatterns".into(),
            message: "fewer than 3 trigger patterns weakens matching".into(),
        });
    }

    if draft.behavior_prompt.trim().is_empty() {
        issue("behaviorPrompt", "required", "behavior prompt must not be empty".into());
    } else {
        if draft.behavior_prompt.chars().count() > MAX_BEHAVIOR_PROMPT_CHARS {
            issue(
                "behaviorPrompt",
                "max_length",
                format!("behavior prompt exceeds {} chars", MAX_BEHAVIOR_PROMPT_CHARS),
            );
        }
        if INJECTION_PATTERNS
            .iter()
            .any(|p| p.is_match(&draft.behavior_prompt))
        {
            issue(
                "behaviorPrompt",
                "injection_detected",
                "behavior prompt contains a prompt-injection pattern".into(),
            );
        }
        if draft.behavior_prompt.chars().count() < 50 {
            warnings.push(ValidationWarning {
                field: "behaviorPrompt".into(),
                message: "behavior prompts under 50 chars rarely carry enough guidance".into(),
            });
        }
    }

    if let Some(schema) = &draft.input_schema {
        match schema.get("properties").and_then(|p| p.as_object()) {
            Some(props) => {
                if props.len() > MAX_INPUT_SCHEMA_PROPERTIES {
                    issue(
                        "inputSchema",
                        "max_properties",
                        format!("input schema exceeds {} properties", MAX_INPUT_SCHEMA_PROPERTIES),
                    );
                }
                for (name, prop) in props {
                    if prop.get("type").and_then(|t| t.as_str()).is_none() {
                        issue(
                            "inputSchema",
                            "missing_type",
                            format!("property '{}' has no type", name),
                        );
                        break;
                    }
                }
            }
            None => issue(
                "inputSchema",
                "missing_properties",
                "input schema must carry a properties object".into(),
            ),
        }
    }

    if let Some(schedule) = &draft.schedule {
        match estimate_cron_interval_minutes(schedule) {
            None => issue(
                "schedule",
                "invalid_cron",
                format!("'{}' is not a valid 5-field cron expression", schedule),
            ),
            Some(interval) if interval < MIN_SCHEDULE_INTERVAL_MINUTES => issue(
                "schedule",
                "interval_too_short",
                format!(
                    "estimated interval {} min is under the {} min floor",
                    interval, MIN_SCHEDULE_INTERVAL_MINUTES
                ),
            ),
            Some(_) => {}
        }
    }

    issues
}

// ── Cron parsing ────────────────────────────────────────────────────────

/// Validate a 5-field cron expression and estimate its minimum firing
/// interval in minutes. Returns None when the expression is malformed.
pub fn estimate_cron_interval_minutes(expr: &str) -> Option<u32> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return None;
    }
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];
    for (field, (lo, hi)) in fields.iter().zip(ranges) {
        if !cron_field_valid(field, lo, hi) {
            return None;
        }
    }

    let minute = fields[0];
    let hour = fields[1];

    // Minute field dominates the estimate.
    if let Some(step) = minute.strip_prefix("*/") {
        return step.parse::<u32>().ok().filter(|s| *s > 0);
    }
    if minute == "*" {
        return Some(1);
    }
    // Fixed minute list: the gap between entries within one hour, or the
    // hourly/daily cadence when a single minute is listed.
    let minutes: Vec<u32> = minute
        .split(',')
        .filter_map(|p| p.split('-').next().and_then(|v| v.parse().ok()))
        .collect();
    if minutes.len() > 1 {
        let mut sorted = minutes.clone();
        sorted.sort_unstable();
        let mut min_gap = 60 - (sorted[sorted.len() - 1] - sorted[0]);
        for pair in sorted.windows(2) {
            min_gap = min_gap.min(pair[1] - pair[0]);
        }
        return Some(min_gap);
    }
    if hour == "*" {
        Some(60)
    } else if let Some(step) = hour.strip_prefix("*/") {
        step.parse::<u32>().ok().map(|s| s.max(1) * 60)
    } else {
        Some(24 * 60)
    }
}

fn cron_field_valid(field: &str, lo: u32, hi: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        return step.parse::<u32>().map(|s| s > 0).unwrap_or(false);
    }
    field.split(',').all(|part| {
        let mut bounds = part.splitn(2, '-');
        let first = bounds.next().and_then(|v| v.parse::<u32>().ok());
        let second = bounds.next().map(|v| v.parse::<u32>().ok());
        match (first, second) {
            (Some(a), None) => a >= lo && a <= hi,
            (Some(a), Some(Some(b))) => a >= lo && b <= hi && a <= b,
            _ => false,
        }
    })
}

// ── Stage 2: trigger overlap ────────────────────────────────────────────

fn trigger_conflicts(
    draft: &SkillDefinition,
    existing: &[SkillDefinition],
) -> Vec<TriggerConflict> {
    let mut conflicts = Vec::new();
    for new_pattern in &draft.trigger_patterns {
        let new_tokens = overlap_tokens(new_pattern);
        for skill in existing.iter().filter(|s| s.active && s.id != draft.id) {
            for old_pattern in &skill.trigger_patterns {
                let similarity = jaccard(&new_tokens, &overlap_tokens(old_pattern));
                if similarity >= TRIGGER_OVERLAP_THRESHOLD {
                    conflicts.push(TriggerConflict {
                        new_pattern: new_pattern.clone(),
                        existing_skill: skill.name.clone(),
                        existing_pattern: old_pattern.clone(),
                        similarity,
                        resolution_options: vec![
                            ResolutionOption::KeepBoth,
                            ResolutionOption::Merge,
                            ResolutionOption::Replace,
                        ],
                    });
                }
            }
        }
    }
    conflicts
}

// ── Tests ───────────────────────────────────────────────────────────────
